use super::water;
use util::{approximate_jacobian, relative_max_difference};
use xfluid::config::{Linearization, StabilizationParameters, TimeIntegrationScheme, TimeParameters};
use xfluid::element::Hex8Element;
use xfluid::function::VectorField;
use xfluid::kernel::{fluid, ElementFields, KernelContext, ELEMENT_DOFS};
use xfluid::nalgebra::{DMatrix, DVector, Point3, Vector3};
use xfluid::quadrature::hexahedron_rule;
use xfluid::timint::TimeParams;

const GALERKIN: StabilizationParameters = StabilizationParameters {
    pspg: false,
    supg: false,
    grad_div: false,
};

fn distorted_hex() -> Hex8Element<f64> {
    let scale = Vector3::new(1.0, 0.8, 1.2);
    let vertices = Hex8Element::<f64>::reference_vertices().map(|xi| {
        let x = Point3::from((xi.coords.add_scalar(1.0) * 0.5).component_mul(&scale));
        // Smooth perturbation so that opposite faces are not parallel
        x + Vector3::new(0.05 * x.y * x.z, -0.04 * x.x * x.z, 0.03 * x.x * x.y)
    });
    Hex8Element::from_vertices(vertices)
}

fn smooth_values(seed: f64) -> DVector<f64> {
    DVector::from_fn(ELEMENT_DOFS, |i, _| (seed + 0.37 * i as f64).sin())
}

fn fields_from(u: &DVector<f64>, acceleration: &DVector<f64>) -> ElementFields {
    let mut fields = ElementFields::zeros();
    for a in 0..8 {
        for i in 0..3 {
            fields.velocity[a][i] = u[4 * a + i];
            fields.acceleration[a][i] = acceleration[4 * a + i];
        }
        fields.pressure[a] = u[4 * a + 3];
    }
    fields
}

fn evaluate_local(
    element: &Hex8Element<f64>,
    fields: &ElementFields,
    context: &KernelContext,
) -> (DMatrix<f64>, DVector<f64>) {
    let quadrature = hexahedron_rule(3);
    let mut matrix = DMatrix::zeros(ELEMENT_DOFS, ELEMENT_DOFS);
    let mut rhs = DVector::zeros(ELEMENT_DOFS);
    fluid::evaluate(0, element, &quadrature, fields, &water(), context, &mut matrix, &mut rhs).unwrap();
    (matrix, rhs)
}

fn stationary() -> TimeParams {
    TimeParams::new(&TimeParameters {
        scheme: TimeIntegrationScheme::Stationary,
        ..TimeParameters::default()
    })
}

#[test]
fn stationary_newton_matrix_matches_finite_differences() {
    let element = distorted_hex();
    let time = stationary();
    let body_force = VectorField::from_fn(|x, _| Vector3::new(x.y, 1.0, -x.x));
    let context = KernelContext {
        time: &time,
        stabilization: &GALERKIN,
        linearization: Linearization::Newton,
        body_force: &body_force,
    };
    let zeros = DVector::zeros(ELEMENT_DOFS);
    let u = smooth_values(0.3);

    let (matrix, _) = evaluate_local(&element, &fields_from(&u, &zeros), &context);
    let residual = |u: &DVector<f64>| -evaluate_local(&element, &fields_from(u, &zeros), &context).1;
    let fd = approximate_jacobian(residual, &u, 1e-6);

    let diff = relative_max_difference(&matrix, &fd, 1e-8);
    assert!(diff < 1e-6, "relative difference {diff}");
}

#[test]
fn one_step_theta_matrix_includes_mass_contribution() {
    let element = distorted_hex();
    let parameters = TimeParameters {
        scheme: TimeIntegrationScheme::OneStepTheta,
        theta: 0.5,
        dt: 0.1,
        ..TimeParameters::default()
    };
    let mut time = TimeParams::new(&parameters);
    time.advance(parameters.dt);
    time.set_theta(&parameters).unwrap();
    let body_force = VectorField::zero();
    let context = KernelContext {
        time: &time,
        stabilization: &GALERKIN,
        linearization: Linearization::Newton,
        body_force: &body_force,
    };
    let history = smooth_values(1.1) * 0.5;
    let acceleration = |u: &DVector<f64>| (u - &history) * time.mass_factor();
    let u = smooth_values(-0.7);

    let (matrix, _) = evaluate_local(&element, &fields_from(&u, &acceleration(&u)), &context);
    let residual = |u: &DVector<f64>| -evaluate_local(&element, &fields_from(u, &acceleration(u)), &context).1;
    let fd = approximate_jacobian(residual, &u, 1e-6);

    let diff = relative_max_difference(&matrix, &fd, 1e-8);
    assert!(diff < 1e-6, "relative difference {diff}");
}

#[test]
fn picard_and_newton_agree_at_rest() {
    let element = distorted_hex();
    let time = stationary();
    let body_force = VectorField::zero();
    let stabilization = StabilizationParameters::default();
    let fields = ElementFields::zeros();
    let context = |linearization| KernelContext {
        time: &time,
        stabilization: &stabilization,
        linearization,
        body_force: &body_force,
    };
    let (newton, _) = evaluate_local(&element, &fields, &context(Linearization::Newton));
    let (picard, _) = evaluate_local(&element, &fields, &context(Linearization::FixedPoint));
    assert_eq!(newton, picard);
}

#[test]
fn uniform_flow_produces_no_element_residual() {
    let element = distorted_hex();
    let time = stationary();
    let body_force = VectorField::zero();
    let stabilization = StabilizationParameters::default();
    let context = KernelContext {
        time: &time,
        stabilization: &stabilization,
        linearization: Linearization::Newton,
        body_force: &body_force,
    };
    let mut fields = ElementFields::zeros();
    fields.velocity = [Vector3::new(0.3, -1.2, 0.8); 8];

    let (_, rhs) = evaluate_local(&element, &fields, &context);
    assert!(rhs.amax() < 1e-12, "residual {}", rhs.amax());
}
