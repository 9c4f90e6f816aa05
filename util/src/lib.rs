use nalgebra::{DMatrix, DVector};

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Central finite-difference approximation of the Jacobian of `f` at `x`.
///
/// Used to check element tangents against their residuals.
pub fn approximate_jacobian(mut f: impl FnMut(&DVector<f64>) -> DVector<f64>, x: &DVector<f64>, h: f64) -> DMatrix<f64> {
    let f0 = f(x);
    let mut jacobian = DMatrix::zeros(f0.len(), x.len());
    let mut x_perturbed = x.clone();
    for j in 0..x.len() {
        x_perturbed[j] = x[j] + h;
        let f_plus = f(&x_perturbed);
        x_perturbed[j] = x[j] - h;
        let f_minus = f(&x_perturbed);
        x_perturbed[j] = x[j];
        jacobian.set_column(j, &((f_plus - f_minus) / (2.0 * h)));
    }
    jacobian
}

/// Relative difference `|a - b| / max(|a|, |b|, floor)` measured in the max norm.
pub fn relative_max_difference(a: &DMatrix<f64>, b: &DMatrix<f64>, floor: f64) -> f64 {
    let scale = a.amax().max(b.amax()).max(floor);
    (a - b).amax() / scale
}
