use matrixcompare::assert_scalar_eq;
use util::assert_approx_matrix_eq;
use xfluid::config::{Predictor, TimeIntegrationScheme, TimeParameters};
use xfluid::error::XFluidError;
use xfluid::nalgebra::{DVector, Vector3};
use xfluid::timint::{
    compute_accelerations, compute_history, evaluation_acceleration, evaluation_velocity, explicit_predictor,
    generalized_alpha_intermediate, grid_velocity, true_residual, TimeParams,
};

fn parameters(scheme: TimeIntegrationScheme) -> TimeParameters {
    TimeParameters {
        scheme,
        dt: 0.1,
        theta: 0.5,
        ..TimeParameters::default()
    }
}

fn started(parameters: &TimeParameters, steps: usize) -> TimeParams {
    let mut time = TimeParams::new(parameters);
    for _ in 0..steps {
        time.advance(parameters.dt);
        time.set_theta(parameters).unwrap();
    }
    time
}

fn vector(values: &[f64]) -> DVector<f64> {
    DVector::from_column_slice(values)
}

#[test]
fn theta_is_only_available_after_the_first_step() {
    let parameters = parameters(TimeIntegrationScheme::OneStepTheta);
    let mut time = TimeParams::new(&parameters);
    assert!(matches!(time.set_theta(&parameters), Err(XFluidError::Configuration(_))));
    time.advance(parameters.dt);
    time.set_theta(&parameters).unwrap();
    assert_eq!(time.theta, 0.5);
    assert_eq!(time.step, 1);
    assert_scalar_eq!(time.time, 0.1, comp = abs, tol = 1e-15);
}

#[test]
fn startup_steps_use_backward_euler() {
    let parameters = TimeParameters {
        num_start_steps: 2,
        ..parameters(TimeIntegrationScheme::OneStepTheta)
    };
    let mut time = started(&parameters, 1);
    assert!(time.is_startup_step(&parameters));
    assert_eq!(time.theta, 1.0);
    time.advance(parameters.dt);
    time.set_theta(&parameters).unwrap();
    assert_eq!(time.theta, 1.0);
    time.advance(parameters.dt);
    time.set_theta(&parameters).unwrap();
    assert!(!time.is_startup_step(&parameters));
    assert_eq!(time.theta, 0.5);
}

#[test]
fn bdf2_theta_reflects_variable_step_sizes() {
    let parameters = parameters(TimeIntegrationScheme::Bdf2);
    let mut time = started(&parameters, 1);
    assert_eq!(time.theta, 1.0);
    time.advance(0.05);
    time.set_theta(&parameters).unwrap();
    assert_eq!(time.dt_previous, 0.1);
    assert_scalar_eq!(time.theta, 0.15 / 0.2, comp = abs, tol = 1e-14);

    time.advance(0.05);
    time.set_theta(&parameters).unwrap();
    assert_scalar_eq!(time.theta, 2.0 / 3.0, comp = abs, tol = 1e-14);
}

#[test]
fn one_step_theta_acceleration_is_consistent_with_history() {
    let time = started(&parameters(TimeIntegrationScheme::OneStepTheta), 1);
    let veln = vector(&[1.0, -2.0, 0.5]);
    let velnm = vector(&[0.0, 0.0, 0.0]);
    let accn = vector(&[0.3, 0.1, -1.0]);
    let velnp = vector(&[1.2, -1.7, 0.4]);

    let hist = compute_history(&time, &veln, &velnm, &accn);
    let accnp = compute_accelerations(&time, &velnp, &veln, &velnm, &accn);
    // velnp = hist + theta dt accnp
    assert_approx_matrix_eq!(&velnp, &(&hist + &accnp * (time.theta * time.dt)), abstol = 1e-13);
    // The acceleration seen by the kernel is the same
    let evaluated = evaluation_acceleration(&time, &velnp, &veln, &accn, &hist);
    assert_approx_matrix_eq!(&evaluated, &accnp, abstol = 1e-12);
    assert_scalar_eq!(time.residual_scaling(), 0.05, comp = abs, tol = 1e-15);
    assert_scalar_eq!(time.mass_factor(), 20.0, comp = abs, tol = 1e-12);
}

#[test]
fn bdf2_reproduces_quadratic_velocity_history() {
    // u(t) = t^2 on equidistant steps has acceleration 2t
    let time = started(&parameters(TimeIntegrationScheme::Bdf2), 3);
    let t = time.time;
    let dt = time.dt;
    let velnp = vector(&[t * t]);
    let veln = vector(&[(t - dt) * (t - dt)]);
    let velnm = vector(&[(t - 2.0 * dt) * (t - 2.0 * dt)]);
    let accn = vector(&[0.0]);

    let accnp = compute_accelerations(&time, &velnp, &veln, &velnm, &accn);
    assert_scalar_eq!(accnp[0], 2.0 * t, comp = abs, tol = 1e-10);

    let hist = compute_history(&time, &veln, &velnm, &accn);
    let evaluated = evaluation_acceleration(&time, &velnp, &veln, &accn, &hist);
    assert_scalar_eq!(evaluated[0], 2.0 * t, comp = abs, tol = 1e-10);
}

#[test]
fn generalized_alpha_intermediate_states_interpolate() {
    let parameters = TimeParameters {
        alpha_f: 0.25,
        alpha_m: 0.75,
        gamma: 0.5,
        ..parameters(TimeIntegrationScheme::AfGenAlpha)
    };
    let time = started(&parameters, 1);
    let velnp = vector(&[4.0, 0.0]);
    let veln = vector(&[0.0, 4.0]);
    let accnp = vector(&[1.0, 1.0]);
    let accn = vector(&[-1.0, 3.0]);

    let (velaf, accam) = generalized_alpha_intermediate(&time, &velnp, &veln, &accnp, &accn);
    assert_approx_matrix_eq!(&velaf, &vector(&[1.0, 3.0]), abstol = 1e-14);
    assert_approx_matrix_eq!(&accam, &vector(&[0.5, 1.5]), abstol = 1e-14);
    assert_approx_matrix_eq!(&evaluation_velocity(&time, &velnp, &veln), &velaf, abstol = 1e-14);
    assert_scalar_eq!(time.evaluation_time(), 0.1 - 0.75 * 0.1, comp = abs, tol = 1e-15);
    assert_scalar_eq!(time.velocity_factor(), 0.25, comp = abs, tol = 1e-15);
}

#[test]
fn stationary_problems_carry_no_inertia() {
    let time = TimeParams::new(&parameters(TimeIntegrationScheme::Stationary));
    let veln = vector(&[1.0, 2.0]);
    assert_eq!(time.residual_scaling(), 1.0);
    assert_eq!(time.mass_factor(), 0.0);
    assert_eq!(compute_history(&time, &veln, &veln, &veln), vector(&[0.0, 0.0]));
    assert_eq!(compute_accelerations(&time, &veln, &veln, &veln, &veln), vector(&[0.0, 0.0]));
    assert_eq!(true_residual(&vector(&[2.0, -4.0]), &time), vector(&[-2.0, 4.0]));
}

#[test]
fn explicit_predictors_extrapolate_the_old_state() {
    let time = started(&parameters(TimeIntegrationScheme::OneStepTheta), 2);
    let veln = vector(&[1.0]);
    let velnm = vector(&[0.5]);
    let accn = vector(&[2.0]);

    assert!(explicit_predictor(Predictor::SteadyState, &time, &veln, &velnm, &accn).is_none());
    let predicted = |p| explicit_predictor(p, &time, &veln, &velnm, &accn).unwrap()[0];
    assert_scalar_eq!(predicted(Predictor::ZeroAcceleration), 1.1, comp = abs, tol = 1e-14);
    assert_scalar_eq!(predicted(Predictor::ConstantAcceleration), 1.2, comp = abs, tol = 1e-14);
    assert_scalar_eq!(predicted(Predictor::ConstantIncrement), 1.5, comp = abs, tol = 1e-14);
    assert_scalar_eq!(predicted(Predictor::ExplicitSecondOrderMidpoint), 0.9, comp = abs, tol = 1e-14);
}

#[test]
fn grid_velocity_follows_the_mesh_motion() {
    let parameters = parameters(TimeIntegrationScheme::Bdf2);
    let dispnp = [Vector3::new(0.3, 0.0, 0.0)];
    let dispn = [Vector3::new(0.2, 0.0, 0.0)];
    let dispnm = [Vector3::new(0.1, 0.0, 0.0)];
    let gridvn = [Vector3::zeros()];

    let first = started(&parameters, 1);
    let v = grid_velocity(&first, &dispnp, &dispn, &dispnm, &gridvn);
    assert_scalar_eq!(v[0].x, 1.0, comp = abs, tol = 1e-12);

    let later = started(&parameters, 2);
    let v = grid_velocity(&later, &dispnp, &dispn, &dispnm, &gridvn);
    assert_scalar_eq!(v[0].x, 1.0, comp = abs, tol = 1e-12);
}
