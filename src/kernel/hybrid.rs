//! Mixed/hybrid stress-based coupling.
//!
//! An element-local discontinuous stress field
//! `sigma_h = sum_a sum_m N_a sigma_{a,m} E_m` in Voigt ordering `(xx, yy, zz, xy, yz, zx)` is
//! introduced on the fluid part of a cut element. Its weak constitutive equation
//!
//! ```text
//! (sigma_h / 2 mu, tau) - (eps(u), tau) + <u - g, tau n> = 0      (viscous stress)
//! (sigma_h / 2 mu, tau) + (p I / 2 mu, tau) - (eps(u), tau) + <u - g, tau n> = 0  (Cauchy stress)
//! ```
//!
//! is condensed statically, and the interface flux `-<sigma_h n, v>` enters the momentum
//! equation of the background element.
use crate::element::Hex8Element;
use crate::error::XFluidError;
use crate::kernel::interface::{InterfacePoint, SideSystem};
use crate::kernel::{BasisPoint, ElementFields, KernelContext, ELEMENT_DOFS};
use crate::material::NewtonianFluid;
use crate::nalgebra::{DMatrix, DVector, Point3, Vector3};
use crate::quadrature::Quadrature;

/// Number of stress components in Voigt notation.
const VOIGT: usize = 6;

/// Number of element-local stress dofs.
pub const STRESS_DOFS: usize = VOIGT * 8;

/// Inner products `E_m : E_m` of the stress basis tensors.
const VOIGT_WEIGHTS: [f64; VOIGT] = [1.0, 1.0, 1.0, 2.0, 2.0, 2.0];

/// Index pairs of the Voigt components.
const VOIGT_PAIRS: [(usize, usize); VOIGT] = [(0, 0), (1, 1), (2, 2), (0, 1), (1, 2), (2, 0)];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HybridStress {
    /// The stress field carries the full Cauchy stress including the pressure.
    Cauchy,
    /// The stress field carries the viscous stress only. Pressure terms stay in Nitsche form.
    Viscous,
}

fn stress_dof(a: usize, m: usize) -> usize {
    VOIGT * a + m
}

/// `E_m n` for the stress basis tensor `E_m`.
fn basis_traction(m: usize, n: &Vector3<f64>) -> Vector3<f64> {
    let (i, j) = VOIGT_PAIRS[m];
    let mut t = Vector3::zeros();
    if i == j {
        t[i] = n[i];
    } else {
        t[i] = n[j];
        t[j] = n[i];
    }
    t
}

/// Voigt strain component `m` of the velocity `N_B e_k`.
fn unit_strain(m: usize, gradient: &Vector3<f64>, k: usize) -> f64 {
    let (i, j) = VOIGT_PAIRS[m];
    let delta = |a: usize, b: usize| if a == b { 1.0 } else { 0.0 };
    if i == j {
        delta(k, i) * gradient[i]
    } else {
        0.5 * (delta(k, i) * gradient[j] + delta(k, j) * gradient[i])
    }
}

/// Blocks of the stress equation before condensation.
#[derive(Debug, Clone)]
struct StressBlocks {
    /// `K_ss`, weighted stress mass matrix.
    k_ss: DMatrix<f64>,
    /// Derivative of the stress equation right-hand side with respect to the element dofs.
    l_sx: DMatrix<f64>,
    /// Interface operator `B_Gamma` acting on background velocities.
    b_gamma: DMatrix<f64>,
    /// Prescribed interface velocity term `b_g`.
    b_g: DVector<f64>,
    /// Interface operator acting on side velocities.
    b_side: DMatrix<f64>,
}

#[allow(non_snake_case)]
#[allow(clippy::too_many_arguments)]
fn stress_blocks(
    element_index: usize,
    element: &Hex8Element<f64>,
    volume_quadrature: &impl Quadrature<Point3<f64>>,
    points: &[InterfacePoint],
    mu: f64,
    variant: HybridStress,
    num_side_dofs: usize,
) -> Result<StressBlocks, XFluidError> {
    let mut k_ss = DMatrix::zeros(STRESS_DOFS, STRESS_DOFS);
    let mut l_sx = DMatrix::zeros(STRESS_DOFS, ELEMENT_DOFS);
    let mut b_gamma = DMatrix::zeros(STRESS_DOFS, ELEMENT_DOFS);
    let mut b_g = DVector::zeros(STRESS_DOFS);
    let mut b_side = DMatrix::zeros(STRESS_DOFS, num_side_dofs);

    for (&w, xi) in volume_quadrature.weights().iter().zip(volume_quadrature.points()) {
        let basis = BasisPoint::evaluate(element_index, element, xi)?;
        let N = &basis.N;
        let wJ = w * basis.det;
        for a in 0..8 {
            for m in 0..VOIGT {
                let row = stress_dof(a, m);
                for b in 0..8 {
                    k_ss[(row, stress_dof(b, m))] += wJ * VOIGT_WEIGHTS[m] * N[a] * N[b] / (2.0 * mu);
                    let grad_b = basis.gradient(b);
                    for k in 0..3 {
                        l_sx[(row, 4 * b + k)] += wJ * VOIGT_WEIGHTS[m] * N[a] * unit_strain(m, &grad_b, k);
                    }
                    if variant == HybridStress::Cauchy && m < 3 {
                        l_sx[(row, 4 * b + 3)] -= wJ * N[a] * N[b] / (2.0 * mu);
                    }
                }
            }
        }
    }

    for point in points {
        let basis = BasisPoint::evaluate(element_index, element, &point.xi)?;
        let N = &basis.N;
        let w = point.weight;
        for a in 0..8 {
            for m in 0..VOIGT {
                let row = stress_dof(a, m);
                let t = basis_traction(m, &point.normal);
                b_g[row] += w * N[a] * t.dot(&point.velocity);
                for b in 0..8 {
                    for k in 0..3 {
                        b_gamma[(row, 4 * b + k)] += w * N[a] * t[k] * N[b];
                    }
                }
                if let Some(side_basis) = &point.side_basis {
                    for &(node, phi) in side_basis {
                        for k in 0..3 {
                            b_side[(row, 3 * node + k)] += w * N[a] * t[k] * phi;
                        }
                    }
                }
            }
        }
    }
    l_sx -= &b_gamma;

    Ok(StressBlocks {
        k_ss,
        l_sx,
        b_gamma,
        b_g,
        b_side,
    })
}

/// Nodal values in local element dof ordering.
fn local_values(fields: &ElementFields) -> DVector<f64> {
    DVector::from_fn(ELEMENT_DOFS, |dof, _| {
        let (node, component) = (dof / 4, dof % 4);
        if component == 3 {
            fields.pressure[node]
        } else {
            fields.velocity[node][component]
        }
    })
}

/// Multiplies the velocity columns of a matrix with `factor`.
fn scale_velocity_columns(matrix: &mut DMatrix<f64>, factor: f64) {
    for (j, mut column) in matrix.column_iter_mut().enumerate() {
        if j % 4 != 3 {
            column *= factor;
        }
    }
}

/// Hybrid stress-based coupling of an outside cell set to the interface.
///
/// `volume_quadrature` covers the fluid part of the element in reference coordinates and
/// `points` all boundary cells of the coupling within the element.
#[allow(non_snake_case)]
#[allow(clippy::too_many_arguments)]
pub fn hybrid_one_sided(
    element_index: usize,
    coupling: usize,
    element: &Hex8Element<f64>,
    volume_quadrature: &impl Quadrature<Point3<f64>>,
    points: &[InterfacePoint],
    fields: &ElementFields,
    fluid: &NewtonianFluid,
    h: f64,
    penalty_factor: f64,
    variant: HybridStress,
    context: &KernelContext,
    matrix: &mut DMatrix<f64>,
    rhs: &mut DVector<f64>,
    mut side: Option<&mut SideSystem>,
) -> Result<(), XFluidError> {
    assert_eq!(matrix.nrows(), ELEMENT_DOFS);
    let mu = fluid.viscosity;
    let (s, afac) = (context.scaling(), context.velocity_factor());
    let num_side_dofs = side.as_deref().map(|side| side.num_side_dofs()).unwrap_or(0);
    for point in points {
        if let Some(side_basis) = &point.side_basis {
            for &(node, _) in side_basis {
                if 3 * node + 2 >= num_side_dofs {
                    return Err(XFluidError::CouplingSizeOverflow {
                        coupling,
                        dof: 3 * node + 2,
                        size: num_side_dofs,
                    });
                }
            }
        }
    }

    let blocks = stress_blocks(element_index, element, volume_quadrature, points, mu, variant, num_side_dofs)?;
    let cholesky = blocks
        .k_ss
        .clone()
        .cholesky()
        .ok_or_else(|| XFluidError::ElementEvaluateFailure {
            element: element_index,
            reason: "stress mass matrix of the hybrid coupling is singular".to_string(),
        })?;

    // sigma = K^-1 (L U + b_g), where b_g = B_s u_s for couplings with side dofs
    let u_local = local_values(fields);
    let stress_rhs = &blocks.l_sx * &u_local + &blocks.b_g;
    let sigma = cholesky.solve(&stress_rhs);
    let k_inv_l = cholesky.solve(&blocks.l_sx);
    let b_gamma_t = blocks.b_gamma.transpose();

    // Condensed flux -<sigma_h n, v>
    let residual = -(&b_gamma_t * &sigma);
    *rhs -= residual * s;
    let mut flux_jacobian = -(&b_gamma_t * &k_inv_l);
    scale_velocity_columns(&mut flux_jacobian, afac);
    *matrix += flux_jacobian * s;

    // Penalty, mass conservation and, for the viscous variant, pressure consistency
    let penalty = penalty_factor * mu / h;
    for point in points {
        let basis = BasisPoint::evaluate(element_index, element, &point.xi)?;
        let N = &basis.N;
        let n = &point.normal;
        let w = point.weight;
        let u = basis.interpolate_vector(&fields.velocity);
        let p = basis.interpolate_scalar(&fields.pressure);
        let jump = u - point.velocity;
        for A in 0..8 {
            for i in 0..3 {
                let mut residual = penalty * N[A] * jump[i];
                if variant == HybridStress::Viscous {
                    residual += p * n[i] * N[A];
                }
                rhs[4 * A + i] -= s * w * residual;
            }
            rhs[4 * A + 3] -= s * w * (-N[A] * jump.dot(n));
            for B in 0..8 {
                let NANB = N[A] * N[B];
                for i in 0..3 {
                    matrix[(4 * A + i, 4 * B + i)] += s * w * afac * penalty * NANB;
                    if variant == HybridStress::Viscous {
                        matrix[(4 * A + i, 4 * B + 3)] += s * w * NANB * n[i];
                    }
                    matrix[(4 * A + 3, 4 * B + i)] += s * w * afac * (-NANB * n[i]);
                }
            }
        }

        if let Some(side) = side.as_deref_mut() {
            if let Some(side_basis) = &point.side_basis {
                for &(m, phi_m) in side_basis {
                    for k in 0..3 {
                        let mut side_residual = -penalty * phi_m * jump[k];
                        if variant == HybridStress::Viscous {
                            side_residual -= p * n[k] * phi_m;
                        }
                        side.rhs_s[3 * m + k] -= s * w * side_residual;
                        for A in 0..8 {
                            side.c_xs[(4 * A + k, 3 * m + k)] += s * w * afac * (-penalty * N[A] * phi_m);
                            side.c_xs[(4 * A + 3, 3 * m + k)] += s * w * afac * N[A] * phi_m * n[k];
                            side.c_sx[(3 * m + k, 4 * A + k)] += s * w * afac * (-penalty * phi_m * N[A]);
                            if variant == HybridStress::Viscous {
                                side.c_sx[(3 * m + k, 4 * A + 3)] += s * w * (-phi_m * N[A] * n[k]);
                            }
                        }
                        for &(m2, phi_m2) in side_basis {
                            side.c_ss[(3 * m + k, 3 * m2 + k)] += s * w * afac * penalty * phi_m * phi_m2;
                        }
                    }
                }
            }
        }
    }

    // Couplings through the condensed stress field
    if let Some(side) = side {
        let b_side_t = blocks.b_side.transpose();
        let k_inv_b_side = cholesky.solve(&blocks.b_side);
        side.c_xs -= (&b_gamma_t * &k_inv_b_side) * (s * afac);
        side.rhs_s -= (&b_side_t * &sigma) * s;
        let mut c_sx = &b_side_t * &k_inv_l;
        scale_velocity_columns(&mut c_sx, afac);
        side.c_sx += c_sx * s;
        side.c_ss += (&b_side_t * &k_inv_b_side) * (s * afac);
    }
    Ok(())
}
