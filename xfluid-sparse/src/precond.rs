use crate::krylov::LinearOperator;
use core::fmt;
use nalgebra::{DVector, DVectorView, DVectorViewMut, RealField};
use nalgebra_sparse::CsrMatrix;
use std::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactorizationError {
    MissingDiagonal { row: usize },
    ZeroPivot { row: usize },
}

impl fmt::Display for FactorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDiagonal { row } => write!(f, "Row {} has no diagonal entry in its sparsity pattern", row),
            Self::ZeroPivot { row } => write!(f, "Zero pivot encountered in row {}", row),
        }
    }
}

impl Error for FactorizationError {}

/// Diagonal (Jacobi) preconditioner.
///
/// Zero diagonal entries are treated as ones.
#[derive(Debug, Clone)]
pub struct Jacobi<T: RealField> {
    inverse_diagonal: DVector<T>,
}

impl<T: RealField + Copy> Jacobi<T> {
    pub fn from_csr(matrix: &CsrMatrix<T>) -> Self {
        let mut inverse_diagonal = DVector::repeat(matrix.nrows(), T::one());
        for (i, row) in matrix.row_iter().enumerate() {
            if let Some(a_ii) = row.get_entry(i) {
                let a_ii = a_ii.into_value();
                if a_ii != T::zero() {
                    inverse_diagonal[i] = T::one() / a_ii;
                }
            }
        }
        Self { inverse_diagonal }
    }
}

impl<T: RealField + Copy> LinearOperator<T> for Jacobi<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        assert_eq!(y.len(), self.inverse_diagonal.len());
        y.copy_from(&x);
        y.component_mul_assign(&self.inverse_diagonal);
        Ok(())
    }
}

/// Incomplete LU factorization with zero fill-in.
///
/// The factors share the sparsity pattern of the input matrix. `L` has an implicit
/// unit diagonal; `U` holds the diagonal.
#[derive(Debug, Clone)]
pub struct Ilu0<T: RealField> {
    factors: CsrMatrix<T>,
    diagonal_offsets: Vec<usize>,
}

impl<T: RealField + Copy> Ilu0<T> {
    pub fn from_csr(matrix: &CsrMatrix<T>) -> Result<Self, FactorizationError> {
        assert_eq!(matrix.nrows(), matrix.ncols(), "ILU(0) requires a square matrix");
        let mut factors = matrix.clone();
        let n = factors.nrows();
        let offsets = factors.row_offsets().to_vec();
        let cols = factors.col_indices().to_vec();

        let mut diagonal_offsets = Vec::with_capacity(n);
        for i in 0..n {
            let row_cols = &cols[offsets[i]..offsets[i + 1]];
            let local = row_cols
                .binary_search(&i)
                .map_err(|_| FactorizationError::MissingDiagonal { row: i })?;
            diagonal_offsets.push(offsets[i] + local);
        }

        let values = factors.values_mut();
        for i in 0..n {
            for kk in offsets[i]..diagonal_offsets[i] {
                let k = cols[kk];
                let pivot = values[diagonal_offsets[k]];
                if pivot == T::zero() {
                    return Err(FactorizationError::ZeroPivot { row: k });
                }
                let l_ik = values[kk] / pivot;
                values[kk] = l_ik;

                // Update the remainder of row i with row k of U, restricted to the pattern
                let row_k_cols = &cols[diagonal_offsets[k] + 1..offsets[k + 1]];
                for jj in kk + 1..offsets[i + 1] {
                    let j = cols[jj];
                    if let Ok(local) = row_k_cols.binary_search(&j) {
                        let u_kj = values[diagonal_offsets[k] + 1 + local];
                        values[jj] -= l_ik * u_kj;
                    }
                }
            }
            if values[diagonal_offsets[i]] == T::zero() {
                return Err(FactorizationError::ZeroPivot { row: i });
            }
        }

        Ok(Self {
            factors,
            diagonal_offsets,
        })
    }
}

impl<T: RealField + Copy> LinearOperator<T> for Ilu0<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        let n = self.factors.nrows();
        assert_eq!(x.len(), n);
        let offsets = self.factors.row_offsets();
        let cols = self.factors.col_indices();
        let values = self.factors.values();

        // L z = x
        for i in 0..n {
            let mut s = x[i];
            for kk in offsets[i]..self.diagonal_offsets[i] {
                s -= values[kk] * y[cols[kk]];
            }
            y[i] = s;
        }

        // U y = z
        for i in (0..n).rev() {
            let mut s = y[i];
            for kk in self.diagonal_offsets[i] + 1..offsets[i + 1] {
                s -= values[kk] * y[cols[kk]];
            }
            y[i] = s / values[self.diagonal_offsets[i]];
        }
        Ok(())
    }
}
