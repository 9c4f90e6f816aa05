use super::{convection_diffusion_1d, dense};
use matrixcompare::assert_matrix_eq;
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use xfluid_sparse::{FactorizationError, Ilu0, Jacobi, LinearOperator};

#[test]
fn jacobi_inverts_diagonal() {
    let mut coo = CooMatrix::new(3, 3);
    coo.push(0, 0, 2.0);
    coo.push(1, 1, 4.0);
    coo.push(2, 0, 1.0);
    let a = CsrMatrix::from(&coo);

    let jacobi = Jacobi::from_csr(&a);
    let x = DVector::from_column_slice(&[2.0, 2.0, 2.0]);
    let mut y = DVector::zeros(3);
    jacobi.apply((&mut y).into(), (&x).into()).unwrap();
    // Missing diagonal in row 2 is treated as one
    assert_eq!(y, DVector::from_column_slice(&[1.0, 0.5, 2.0]));
}

#[test]
fn ilu0_of_tridiagonal_is_exact_inverse() {
    let a = convection_diffusion_1d(10, 0.5);
    let ilu = Ilu0::from_csr(&a).unwrap();
    let x = DVector::from_fn(10, |i, _| (i as f64).sqrt());
    let b = dense(&a) * &x;
    let mut y = DVector::zeros(10);
    ilu.apply((&mut y).into(), (&b).into()).unwrap();
    assert_matrix_eq!(y, x, comp = abs, tol = 1e-12);
}

#[test]
fn ilu0_requires_diagonal() {
    let mut coo = CooMatrix::new(2, 2);
    coo.push(0, 1, 1.0);
    coo.push(1, 0, 1.0);
    let a = CsrMatrix::from(&coo);
    assert_eq!(
        Ilu0::from_csr(&a).unwrap_err(),
        FactorizationError::MissingDiagonal { row: 0 }
    );
}
