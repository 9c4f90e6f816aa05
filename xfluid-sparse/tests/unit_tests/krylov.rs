use super::{convection_diffusion_1d, dense, laplacian_1d};
use matrixcompare::assert_matrix_eq;
use nalgebra::DVector;
use xfluid_sparse::{solve_dense_lu, CgWorkspace, ConjugateGradient, Gmres, Ilu0, Jacobi, SolveErrorKind};

#[test]
fn cg_solves_spd_system() {
    let a = laplacian_1d(30);
    let x_exact = DVector::from_fn(30, |i, _| (i as f64 * 0.3).sin());
    let b = &a * &x_exact;

    let mut x = DVector::zeros(30);
    let output = ConjugateGradient::new()
        .with_operator(&a)
        .with_tolerance(1e-12)
        .solve_with_guess(&b, &mut x)
        .unwrap();

    assert!(output.num_iterations <= 30);
    assert_matrix_eq!(x, x_exact, comp = abs, tol = 1e-9);
}

#[test]
fn cg_workspace_does_not_change_result() {
    let a = laplacian_1d(20);
    let mut workspace = CgWorkspace::default();

    for k in 1..4 {
        let x_exact = DVector::repeat(20, k as f64);
        let b = &a * &x_exact;

        let mut x_ws = DVector::zeros(20);
        let out_ws = ConjugateGradient::with_workspace(&mut workspace)
            .with_operator(&a)
            .with_tolerance(1e-10)
            .solve_with_guess(&b, &mut x_ws)
            .unwrap();

        let mut x_no_ws = DVector::zeros(20);
        let out_no_ws = ConjugateGradient::new()
            .with_operator(&a)
            .with_tolerance(1e-10)
            .solve_with_guess(&b, &mut x_no_ws)
            .unwrap();

        assert_eq!(x_ws, x_no_ws);
        assert_eq!(out_ws.num_iterations, out_no_ws.num_iterations);
    }
}

#[test]
fn cg_reports_max_iterations() {
    let a = laplacian_1d(50);
    let b = DVector::repeat(50, 1.0);
    let mut x = DVector::zeros(50);
    let err = ConjugateGradient::new()
        .with_operator(&a)
        .with_tolerance(1e-14)
        .with_max_iter(2)
        .solve_with_guess(&b, &mut x)
        .unwrap_err();
    assert!(matches!(err.kind, SolveErrorKind::MaxIterationsReached { max_iter: 2 }));
    assert_eq!(err.output.num_iterations, 2);
}

#[test]
fn gmres_solves_nonsymmetric_system() {
    let a = convection_diffusion_1d(40, 0.8);
    let x_exact = DVector::from_fn(40, |i, _| 1.0 + (i as f64 * 0.1).cos());
    let b = &a * &x_exact;

    let mut x = DVector::zeros(40);
    Gmres::new()
        .with_operator(&a)
        .with_restart(10)
        .with_tolerance(1e-12)
        .solve_with_guess(&b, &mut x)
        .unwrap();

    assert_matrix_eq!(x, x_exact, comp = abs, tol = 1e-9);
}

#[test]
fn gmres_with_preconditioners_agrees_with_dense_lu() {
    let a = convection_diffusion_1d(25, 2.0);
    let b = DVector::from_fn(25, |i, _| (i % 3) as f64 - 1.0);
    let reference = solve_dense_lu(&a, &b).unwrap();

    let mut x_jacobi = DVector::zeros(25);
    Gmres::new()
        .with_operator(&a)
        .with_preconditioner(Jacobi::from_csr(&a))
        .with_tolerance(1e-12)
        .solve_with_guess(&b, &mut x_jacobi)
        .unwrap();

    let mut x_ilu = DVector::zeros(25);
    let output = Gmres::new()
        .with_operator(&a)
        .with_preconditioner(Ilu0::from_csr(&a).unwrap())
        .with_tolerance(1e-12)
        .solve_with_guess(&b, &mut x_ilu)
        .unwrap();

    // A tridiagonal matrix has an exact ILU(0) factorization
    assert!(output.num_iterations <= 2);
    assert_matrix_eq!(x_jacobi, reference, comp = abs, tol = 1e-9);
    assert_matrix_eq!(x_ilu, reference, comp = abs, tol = 1e-9);
}

#[test]
fn zero_rhs_gives_zero_solution() {
    let a = laplacian_1d(5);
    let b = DVector::zeros(5);
    let mut x = DVector::repeat(5, 3.0);
    let output = Gmres::new().with_operator(&a).solve_with_guess(&b, &mut x).unwrap();
    assert_eq!(output.num_iterations, 0);
    assert_eq!(x, DVector::zeros(5));
}

#[test]
fn dense_operator_matches_sparse() {
    let a = convection_diffusion_1d(8, 1.0);
    let a_dense = dense(&a);
    let b = DVector::from_fn(8, |i, _| i as f64);
    let mut x_sparse = DVector::zeros(8);
    let mut x_dense = DVector::zeros(8);
    Gmres::new()
        .with_operator(&a)
        .with_tolerance(1e-13)
        .solve_with_guess(&b, &mut x_sparse)
        .unwrap();
    Gmres::new()
        .with_operator(&a_dense)
        .with_tolerance(1e-13)
        .solve_with_guess(&b, &mut x_dense)
        .unwrap();
    assert_matrix_eq!(x_sparse, x_dense, comp = abs, tol = 1e-10);
}
