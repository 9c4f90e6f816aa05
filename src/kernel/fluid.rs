//! Residual-based stabilized Navier-Stokes kernel for equal-order trilinear elements.
//!
//! Per quadrature point the momentum residual
//!
//! ```text
//! r_M = rho a + rho (grad u) c - mu (lap u + grad div u) + grad p - rho f
//! ```
//!
//! drives the SUPG and PSPG terms, with `c = u - u_grid` the convective velocity.
use crate::element::{FiniteElement, Hex8Element};
use crate::error::XFluidError;
use crate::kernel::{BasisPoint, ElementFields, KernelContext, ELEMENT_DOFS};
use crate::material::NewtonianFluid;
use crate::nalgebra::{DMatrix, DVector, Matrix3, Point3, Vector3};
use crate::quadrature::Quadrature;

/// Stabilization parameters `(tau_M, tau_C)` of the residual-based terms.
///
/// The transient contribution is left out for stationary problems.
pub fn stabilization_parameters(
    fluid: &NewtonianFluid,
    convective_speed: f64,
    h: f64,
    dt: f64,
    stationary: bool,
) -> (f64, f64) {
    let (rho, mu) = (fluid.density, fluid.viscosity);
    let transient = if stationary { 0.0 } else { (2.0 * rho / dt).powi(2) };
    let convective = (2.0 * rho * convective_speed / h).powi(2);
    let viscous = (12.0 * mu / (h * h)).powi(2);
    let tau_m = 1.0 / (transient + convective + viscous).sqrt();
    let tau_c = h * h / (12.0 * tau_m);
    (tau_m, tau_c)
}

/// Quantities of the discrete solution at a single quadrature point.
#[derive(Debug, Clone)]
struct PointState {
    acceleration: Vector3<f64>,
    convective: Vector3<f64>,
    velocity_gradient: Matrix3<f64>,
    pressure: f64,
    momentum_residual: Vector3<f64>,
}

#[allow(non_snake_case)]
fn point_state(
    basis: &BasisPoint,
    hessians: &[Matrix3<f64>; 8],
    fields: &ElementFields,
    fluid: &NewtonianFluid,
    body_force: &Vector3<f64>,
) -> PointState {
    let (rho, mu) = (fluid.density, fluid.viscosity);
    let u = basis.interpolate_vector(&fields.velocity);
    let a = basis.interpolate_vector(&fields.acceleration);
    let c = u - basis.interpolate_vector(&fields.grid_velocity);
    let grad_u = basis.vector_gradient(&fields.velocity);
    let grad_p = basis.scalar_gradient(&fields.pressure);

    let mut viscous = Vector3::zeros();
    for (H, u_a) in hessians.iter().zip(&fields.velocity) {
        viscous += u_a * H.trace() + H * u_a;
    }
    let r_m = a * rho + grad_u * c * rho - viscous * mu + grad_p - body_force * rho;

    PointState {
        acceleration: a,
        convective: c,
        velocity_gradient: grad_u,
        pressure: basis.interpolate_scalar(&fields.pressure),
        momentum_residual: r_m,
    }
}

/// Adds the volume contributions of one cell set to the element matrix and right-hand side.
///
/// The quadrature is given in reference coordinates of the Hex8 element with weights in
/// reference measure. `matrix` and `rhs` must have dimension [`ELEMENT_DOFS`].
#[allow(non_snake_case)]
pub fn evaluate(
    element_index: usize,
    element: &Hex8Element<f64>,
    quadrature: &impl Quadrature<Point3<f64>>,
    fields: &ElementFields,
    fluid: &NewtonianFluid,
    context: &KernelContext,
    matrix: &mut DMatrix<f64>,
    rhs: &mut DVector<f64>,
) -> Result<(), XFluidError> {
    assert_eq!(matrix.nrows(), ELEMENT_DOFS);
    assert_eq!(rhs.len(), ELEMENT_DOFS);

    let (rho, mu) = (fluid.density, fluid.viscosity);
    let stab = context.stabilization;
    let (s, afac, mfac) = (context.scaling(), context.velocity_factor(), context.mass_factor());
    let newton = context.is_newton();
    let h = element.volume_equivalent_length();
    let time = context.time.evaluation_time();
    let (supg, pspg, grad_div) = (
        if stab.supg { 1.0 } else { 0.0 },
        if stab.pspg { 1.0 } else { 0.0 },
        if stab.grad_div { 1.0 } else { 0.0 },
    );

    for (&w, xi) in quadrature.weights().iter().zip(quadrature.points()) {
        let basis = BasisPoint::evaluate(element_index, element, xi)?;
        let hessians = element
            .physical_hessians(xi)
            .ok_or(XFluidError::NegativeJacobian {
                element: element_index,
                determinant: basis.det,
            })?;
        let x = element.map_reference_coords(xi);
        let f = context.body_force.eval(&x, time);
        let state = point_state(&basis, &hessians, fields, fluid, &f);
        let (tau_m, tau_c) =
            stabilization_parameters(fluid, state.convective.norm(), h, context.time.dt, context.time.is_stationary());

        let wJ = w * basis.det;
        let N = &basis.N;
        let G = &basis.G;
        let c = &state.convective;
        let grad_u = &state.velocity_gradient;
        let r_m = &state.momentum_residual;
        let div = grad_u.trace();
        let a = &state.acceleration;
        let strain = grad_u + grad_u.transpose();
        let conv: [f64; 8] = std::array::from_fn(|A| c.dot(&G.column(A)));

        // Derivative of r_M with respect to u_{B,k}
        let dr_du: [[Vector3<f64>; 3]; 8] = std::array::from_fn(|B| {
            std::array::from_fn(|k| {
                let H = &hessians[B];
                let mut dr = H.column(k) * (-mu);
                dr[k] += rho * conv[B] - mu * H.trace();
                if newton {
                    dr += grad_u.column(k) * (rho * N[B]);
                }
                dr
            })
        });

        for A in 0..8 {
            let grad_A = basis.gradient(A);
            let supg_A = supg * tau_m * rho * conv[A];

            // Residual
            let momentum = (a + grad_u * c - f) * (rho * N[A]) + strain * grad_A * mu - grad_A * state.pressure
                + r_m * supg_A
                + grad_A * (grad_div * tau_c * div);
            let continuity = N[A] * div + pspg * tau_m * grad_A.dot(r_m);
            for i in 0..3 {
                rhs[4 * A + i] -= s * wJ * momentum[i];
            }
            rhs[4 * A + 3] -= s * wJ * continuity;

            // Linearization
            for B in 0..8 {
                let grad_B = basis.gradient(B);
                let NANB = N[A] * N[B];
                for i in 0..3 {
                    for k in 0..3 {
                        let delta = if i == k { 1.0 } else { 0.0 };
                        let mut duu = rho * N[A] * delta * conv[B]
                            + mu * (delta * grad_A.dot(&grad_B) + G[(k, A)] * G[(i, B)])
                            + supg_A * dr_du[B][k][i]
                            + grad_div * tau_c * G[(i, A)] * G[(k, B)];
                        if newton {
                            duu += rho * NANB * grad_u[(i, k)] + supg * tau_m * rho * N[B] * G[(k, A)] * r_m[i];
                        }
                        let dua = delta * (rho * NANB + supg_A * rho * N[B]);
                        matrix[(4 * A + i, 4 * B + k)] += s * wJ * (afac * duu + mfac * dua);
                    }
                    let dup = -N[B] * G[(i, A)] + supg_A * G[(i, B)];
                    matrix[(4 * A + i, 4 * B + 3)] += s * wJ * dup;
                }
                for k in 0..3 {
                    let dpu = N[A] * G[(k, B)] + pspg * tau_m * grad_A.dot(&dr_du[B][k]);
                    let dpa = pspg * tau_m * G[(k, A)] * rho * N[B];
                    matrix[(4 * A + 3, 4 * B + k)] += s * wJ * (afac * dpu + mfac * dpa);
                }
                matrix[(4 * A + 3, 4 * B + 3)] += s * wJ * pspg * tau_m * grad_A.dot(&grad_B);
            }
        }
    }
    Ok(())
}
