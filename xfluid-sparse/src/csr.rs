//! CSR utilities used around the linear solve.
use nalgebra::{DVector, RealField};
use nalgebra_sparse::CsrMatrix;

/// Replaces the rows flagged in `mask` by identity rows.
///
/// Every flagged row must have its diagonal in the sparsity pattern.
pub fn apply_identity_rows<T: RealField + Copy>(matrix: &mut CsrMatrix<T>, mask: &[bool]) {
    assert_eq!(mask.len(), matrix.nrows());
    for (i, mut row) in matrix.row_iter_mut().enumerate() {
        if mask[i] {
            let (cols, values) = row.cols_and_values_mut();
            let mut found_diagonal = false;
            for (&j, v) in cols.iter().zip(values.iter_mut()) {
                if j == i {
                    *v = T::one();
                    found_diagonal = true;
                } else {
                    *v = T::zero();
                }
            }
            assert!(found_diagonal, "Row {} has no diagonal entry in its sparsity pattern", i);
        }
    }
}

/// Zeros the entries of `vector` flagged in `mask`.
pub fn zero_masked_entries<T: RealField + Copy>(vector: &mut DVector<T>, mask: &[bool]) {
    assert_eq!(mask.len(), vector.len());
    for (v, &m) in vector.iter_mut().zip(mask) {
        if m {
            *v = T::zero();
        }
    }
}

/// Max norm of the entries of each row.
pub fn row_inf_norms<T: RealField + Copy>(matrix: &CsrMatrix<T>) -> DVector<T> {
    DVector::from_iterator(
        matrix.nrows(),
        matrix
            .row_iter()
            .map(|row| row.values().iter().fold(T::zero(), |acc, v| acc.max(v.abs()))),
    )
}

/// Row and column scaling by inverse inf-norms.
///
/// Solving the scaled system `(R A C) y = R b` and unscaling `x = C y` yields the
/// solution of `A x = b`.
#[derive(Debug, Clone)]
pub struct InfNormScaling<T: RealField> {
    row_scale: DVector<T>,
    col_scale: DVector<T>,
}

impl<T: RealField + Copy> InfNormScaling<T> {
    pub fn compute(matrix: &CsrMatrix<T>) -> Self {
        let invert = |v: T| if v > T::zero() { T::one() / v } else { T::one() };
        let row_scale = row_inf_norms(matrix).map(invert);

        let mut col_max = DVector::repeat(matrix.ncols(), T::zero());
        for (i, row) in matrix.row_iter().enumerate() {
            for (&j, &v) in row.col_indices().iter().zip(row.values()) {
                col_max[j] = col_max[j].max((row_scale[i] * v).abs());
            }
        }
        let col_scale = col_max.map(invert);
        Self { row_scale, col_scale }
    }

    pub fn scale_system(&self, matrix: &mut CsrMatrix<T>, rhs: &mut DVector<T>) {
        for (i, mut row) in matrix.row_iter_mut().enumerate() {
            let r_i = self.row_scale[i];
            let (cols, values) = row.cols_and_values_mut();
            for (&j, v) in cols.iter().zip(values.iter_mut()) {
                *v *= r_i * self.col_scale[j];
            }
        }
        rhs.component_mul_assign(&self.row_scale);
    }

    pub fn unscale_solution(&self, solution: &mut DVector<T>) {
        solution.component_mul_assign(&self.col_scale);
    }
}

/// Transposed matrix-vector product `y = A^T x`.
pub fn transpose_mul<T: RealField + Copy>(matrix: &CsrMatrix<T>, x: &DVector<T>) -> DVector<T> {
    assert_eq!(matrix.nrows(), x.len());
    let mut y = DVector::zeros(matrix.ncols());
    for (i, row) in matrix.row_iter().enumerate() {
        for (&j, &v) in row.col_indices().iter().zip(row.values()) {
            y[j] += v * x[i];
        }
    }
    y
}
