use super::{convection_diffusion_1d, dense, laplacian_1d};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::DVector;
use xfluid_sparse::csr::{apply_identity_rows, row_inf_norms, transpose_mul, zero_masked_entries, InfNormScaling};
use xfluid_sparse::solve_dense_lu;

#[test]
fn identity_rows_replace_masked_rows() {
    let mut a = laplacian_1d(4);
    let mask = vec![true, false, false, true];
    apply_identity_rows(&mut a, &mask);
    let a = dense(&a);

    assert_eq!(a.row(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0, 0.0, 0.0]);
    assert_eq!(a.row(3).iter().copied().collect::<Vec<_>>(), vec![0.0, 0.0, 0.0, 1.0]);
    assert_eq!(a.row(1).iter().copied().collect::<Vec<_>>(), vec![-1.0, 2.0, -1.0, 0.0]);

    let mut v = DVector::repeat(4, 5.0);
    zero_masked_entries(&mut v, &mask);
    assert_eq!(v, DVector::from_column_slice(&[0.0, 5.0, 5.0, 0.0]));
}

#[test]
fn inf_norm_scaling_preserves_solution() {
    let mut a = convection_diffusion_1d(12, 3.0);
    // Badly scaled rows
    for (i, mut row) in a.row_iter_mut().enumerate() {
        let s = 10f64.powi(i as i32 % 5);
        row.values_mut().iter_mut().for_each(|v| *v *= s);
    }
    let b = DVector::from_fn(12, |i, _| 1.0 + i as f64);
    let reference = solve_dense_lu(&a, &b).unwrap();

    let scaling = InfNormScaling::compute(&a);
    let mut a_scaled = a.clone();
    let mut b_scaled = b.clone();
    scaling.scale_system(&mut a_scaled, &mut b_scaled);

    for norm in row_inf_norms(&a_scaled).iter() {
        assert!(*norm <= 1.0 + 1e-14);
    }

    let mut x = solve_dense_lu(&a_scaled, &b_scaled).unwrap();
    scaling.unscale_solution(&mut x);
    assert_matrix_eq!(x, reference, comp = abs, tol = 1e-10);
}

#[test]
fn transpose_mul_matches_dense() {
    let a = convection_diffusion_1d(6, 1.5);
    let x = DVector::from_fn(6, |i, _| i as f64 - 2.0);
    let y = transpose_mul(&a, &x);
    let y_dense = dense(&a).transpose() * &x;
    assert_matrix_eq!(y, y_dense, comp = abs, tol = 1e-14);
    assert_scalar_eq!(y.sum(), y_dense.sum(), comp = abs, tol = 1e-13);
}
