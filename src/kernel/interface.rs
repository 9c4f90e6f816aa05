//! Nitsche-type coupling terms on boundary cells.
//!
//! The interface normal `n` points out of the outside volume cell. One-sided couplings enforce
//! `u = g` weakly on the fluid of the outside cell set; two-phase couplings tie the velocities
//! and tractions of the outside (phase 1) and inside (phase 2) cell sets together.
use crate::config::NitscheParameters;
use crate::element::Hex8Element;
use crate::error::XFluidError;
use crate::kernel::{unit_strain_traction, BasisPoint, ElementFields, KernelContext, ELEMENT_DOFS};
use crate::material::NewtonianFluid;
use crate::nalgebra::{DMatrix, DVector, Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A quadrature point on a boundary cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfacePoint {
    pub x: Point3<f64>,
    /// Reference coordinates in the background element.
    pub xi: Point3<f64>,
    pub normal: Vector3<f64>,
    /// Physical integration weight.
    pub weight: f64,
    /// Interface velocity `g` at the point.
    pub velocity: Vector3<f64>,
    /// Side-local nodes and basis values of the interface discretization, for couplings with
    /// their own dofs.
    pub side_basis: Option<[(usize, f64); 3]>,
}

impl InterfacePoint {
    fn side_shape(&self) -> &[(usize, f64)] {
        match &self.side_basis {
            Some(basis) => basis,
            None => &[],
        }
    }
}

/// Local coupling blocks between the background element dofs `x` and side dofs `s`.
#[derive(Debug, Clone, PartialEq)]
pub struct SideSystem {
    pub c_xs: DMatrix<f64>,
    pub c_sx: DMatrix<f64>,
    pub c_ss: DMatrix<f64>,
    pub rhs_s: DVector<f64>,
}

impl SideSystem {
    pub fn zeros(num_x: usize, num_s: usize) -> Self {
        Self {
            c_xs: DMatrix::zeros(num_x, num_s),
            c_sx: DMatrix::zeros(num_s, num_x),
            c_ss: DMatrix::zeros(num_s, num_s),
            rhs_s: DVector::zeros(num_s),
        }
    }

    pub fn num_side_dofs(&self) -> usize {
        self.c_ss.nrows()
    }
}

/// Cauchy stress `-p I + mu (grad u + grad u^T)`.
pub fn cauchy_stress(mu: f64, velocity_gradient: &Matrix3<f64>, pressure: f64) -> Matrix3<f64> {
    (velocity_gradient + velocity_gradient.transpose()) * mu - Matrix3::identity() * pressure
}

fn check_side_dofs(coupling: usize, point: &InterfacePoint, side: &SideSystem) -> Result<(), XFluidError> {
    let size = side.num_side_dofs();
    for &(m, _) in point.side_shape() {
        if 3 * m + 2 >= size {
            return Err(XFluidError::CouplingSizeOverflow {
                coupling,
                dof: 3 * m + 2,
                size,
            });
        }
    }
    Ok(())
}

/// One-sided Nitsche coupling of the fluid of an outside cell set to the interface velocity.
///
/// If `side` is given, the interface velocity is the interpolant of the side dofs through the
/// side basis of the points, and the coupling blocks with the side dofs are filled as well.
#[allow(non_snake_case)]
#[allow(clippy::too_many_arguments)]
pub fn nitsche_one_sided(
    element_index: usize,
    coupling: usize,
    element: &Hex8Element<f64>,
    points: &[InterfacePoint],
    fields: &ElementFields,
    fluid: &NewtonianFluid,
    h: f64,
    nitsche: &NitscheParameters,
    context: &KernelContext,
    matrix: &mut DMatrix<f64>,
    rhs: &mut DVector<f64>,
    mut side: Option<&mut SideSystem>,
) -> Result<(), XFluidError> {
    assert_eq!(matrix.nrows(), ELEMENT_DOFS);
    let (rho, mu) = (fluid.density, fluid.viscosity);
    let (s, afac) = (context.scaling(), context.velocity_factor());
    let beta = nitsche.adjoint;
    let penalty = nitsche.penalty * mu / h;

    for point in points {
        if let Some(side) = side.as_deref() {
            check_side_dofs(coupling, point, side)?;
        }
        let basis = BasisPoint::evaluate(element_index, element, &point.xi)?;
        let N = &basis.N;
        let n = &point.normal;
        let w = point.weight;

        let u = basis.interpolate_vector(&fields.velocity);
        let c = u - basis.interpolate_vector(&fields.grid_velocity);
        let sigma = cauchy_stress(mu, &basis.vector_gradient(&fields.velocity), basis.interpolate_scalar(&fields.pressure));
        let traction = sigma * n;
        let jump = u - point.velocity;
        let inflow = if nitsche.inflow_stab { rho * (-c.dot(n)).max(0.0) } else { 0.0 };
        let strain_tractions: [[Vector3<f64>; 3]; 8] =
            std::array::from_fn(|A| std::array::from_fn(|i| unit_strain_traction(&basis.gradient(A), i, n)));

        for A in 0..8 {
            let t_A = &strain_tractions[A];
            for i in 0..3 {
                let residual =
                    -N[A] * traction[i] - beta * mu * jump.dot(&t_A[i]) + (penalty + inflow) * N[A] * jump[i];
                rhs[4 * A + i] -= s * w * residual;
            }
            rhs[4 * A + 3] -= s * w * (-N[A] * jump.dot(n));

            for B in 0..8 {
                let NANB = N[A] * N[B];
                for i in 0..3 {
                    for k in 0..3 {
                        let delta = if i == k { 1.0 } else { 0.0 };
                        let duu = -mu * N[A] * strain_tractions[B][k][i] - beta * mu * N[B] * t_A[i][k]
                            + (penalty + inflow) * NANB * delta;
                        matrix[(4 * A + i, 4 * B + k)] += s * w * afac * duu;
                    }
                    matrix[(4 * A + i, 4 * B + 3)] += s * w * NANB * n[i];
                }
                for k in 0..3 {
                    matrix[(4 * A + 3, 4 * B + k)] += s * w * afac * (-NANB * n[k]);
                }
            }
        }

        if let Some(side) = side.as_deref_mut() {
            for &(m, phi_m) in point.side_shape() {
                for A in 0..8 {
                    for i in 0..3 {
                        for k in 0..3 {
                            let delta = if i == k { 1.0 } else { 0.0 };
                            // d(u - g)/du_s = -phi_m
                            let dus = beta * mu * phi_m * strain_tractions[A][i][k]
                                - (penalty + inflow) * N[A] * phi_m * delta;
                            side.c_xs[(4 * A + i, 3 * m + k)] += s * w * afac * dus;
                        }
                    }
                    for k in 0..3 {
                        side.c_xs[(4 * A + 3, 3 * m + k)] += s * w * afac * N[A] * phi_m * n[k];
                    }
                }

                // Interface force on the side dofs
                for k in 0..3 {
                    let residual = phi_m * traction[k] - penalty * phi_m * jump[k];
                    side.rhs_s[3 * m + k] -= s * w * residual;
                    for B in 0..8 {
                        for j in 0..3 {
                            let delta = if j == k { 1.0 } else { 0.0 };
                            let dsu = phi_m * mu * strain_tractions[B][j][k] - penalty * phi_m * N[B] * delta;
                            side.c_sx[(3 * m + k, 4 * B + j)] += s * w * afac * dsu;
                        }
                        side.c_sx[(3 * m + k, 4 * B + 3)] += s * w * (-phi_m * N[B] * n[k]);
                    }
                    for &(m2, phi_m2) in point.side_shape() {
                        side.c_ss[(3 * m + k, 3 * m2 + k)] += s * w * afac * penalty * phi_m * phi_m2;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Material data of one phase of a two-phase coupling.
#[derive(Debug, Clone, Copy)]
pub struct Phase<'a> {
    pub element: &'a Hex8Element<f64>,
    pub fields: &'a ElementFields,
    pub fluid: &'a NewtonianFluid,
}

/// Two-phase Nitsche coupling between the outside (phase 1) and inside (phase 2) cell sets.
///
/// The local system has `2 * ELEMENT_DOFS` rows, the dofs of the outside set first.
/// Fluxes are averaged with the viscosity-weighted factors `kappa_1 = mu_2 / (mu_1 + mu_2)`
/// and `kappa_2 = mu_1 / (mu_1 + mu_2)`.
#[allow(non_snake_case)]
#[allow(clippy::too_many_arguments)]
pub fn nitsche_two_phase(
    element_index: usize,
    outside: Phase,
    inside: Phase,
    points: &[InterfacePoint],
    h: f64,
    nitsche: &NitscheParameters,
    context: &KernelContext,
    matrix: &mut DMatrix<f64>,
    rhs: &mut DVector<f64>,
) -> Result<(), XFluidError> {
    assert_eq!(matrix.nrows(), 2 * ELEMENT_DOFS);
    let (s, afac) = (context.scaling(), context.velocity_factor());
    let beta = nitsche.adjoint;
    let mu = [outside.fluid.viscosity, inside.fluid.viscosity];
    let kappa = [mu[1] / (mu[0] + mu[1]), mu[0] / (mu[0] + mu[1])];
    let mu_eff = 2.0 * mu[0] * mu[1] / (mu[0] + mu[1]);
    let penalty = nitsche.penalty * mu_eff / h;
    let sign = [1.0, -1.0];
    let phases = [outside, inside];

    for point in points {
        let n = &point.normal;
        let w = point.weight;
        let mut bases = Vec::with_capacity(2);
        for phase in &phases {
            bases.push(BasisPoint::evaluate(element_index, phase.element, &point.xi)?);
        }

        let mut jump = Vector3::zeros();
        let mut mean_traction = Vector3::zeros();
        for (a, phase) in phases.iter().enumerate() {
            let basis = &bases[a];
            jump += basis.interpolate_vector(&phase.fields.velocity) * sign[a];
            let sigma = cauchy_stress(
                mu[a],
                &basis.vector_gradient(&phase.fields.velocity),
                basis.interpolate_scalar(&phase.fields.pressure),
            );
            mean_traction += sigma * n * kappa[a];
        }

        let strain_tractions: [[[Vector3<f64>; 3]; 8]; 2] = std::array::from_fn(|a| {
            std::array::from_fn(|A| std::array::from_fn(|i| unit_strain_traction(&bases[a].gradient(A), i, n)))
        });

        for a in 0..2 {
            let Na = &bases[a].N;
            let offset_a = a * ELEMENT_DOFS;
            for A in 0..8 {
                for i in 0..3 {
                    let residual = -sign[a] * Na[A] * mean_traction[i]
                        - beta * kappa[a] * mu[a] * jump.dot(&strain_tractions[a][A][i])
                        + penalty * sign[a] * Na[A] * jump[i];
                    rhs[offset_a + 4 * A + i] -= s * w * residual;
                }
                rhs[offset_a + 4 * A + 3] -= s * w * (-kappa[a] * Na[A] * jump.dot(n));
            }

            for b in 0..2 {
                let Nb = &bases[b].N;
                let offset_b = b * ELEMENT_DOFS;
                for A in 0..8 {
                    for B in 0..8 {
                        let NANB = Na[A] * Nb[B];
                        for i in 0..3 {
                            for k in 0..3 {
                                let delta = if i == k { 1.0 } else { 0.0 };
                                let duu = -sign[a] * Na[A] * kappa[b] * mu[b] * strain_tractions[b][B][k][i]
                                    - beta * kappa[a] * mu[a] * sign[b] * Nb[B] * strain_tractions[a][A][i][k]
                                    + penalty * sign[a] * sign[b] * NANB * delta;
                                matrix[(offset_a + 4 * A + i, offset_b + 4 * B + k)] += s * w * afac * duu;
                            }
                            let dup = sign[a] * kappa[b] * NANB * n[i];
                            matrix[(offset_a + 4 * A + i, offset_b + 4 * B + 3)] += s * w * dup;
                        }
                        for k in 0..3 {
                            let dpu = -kappa[a] * sign[b] * NANB * n[k];
                            matrix[(offset_a + 4 * A + 3, offset_b + 4 * B + k)] += s * w * afac * dpu;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
