//! Ghost-penalty integrals on interior faces of the background mesh.
//!
//! The face is integrated on the local face of the master element; points are mapped into
//! the slave element by inverting its trilinear map. The normal `n` points from the master
//! into the slave element. Local dofs are ordered `[master, slave]`, each block following
//! the element dof ordering.
use crate::config::GhostPenaltyParameters;
use crate::element::{default_inverse_map_settings, map_physical_coordinates, FiniteElement, Hex8Element};
use crate::error::XFluidError;
use crate::kernel::{BasisPoint, ElementFields, KernelContext, ELEMENT_DOFS};
use crate::material::NewtonianFluid;
use crate::nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use crate::quadrature::{Quadrature, QuadraturePair2d};

/// One of the two elements adjacent to a face.
#[derive(Debug, Clone, Copy)]
pub struct FaceNeighbor<'a> {
    pub element_index: usize,
    pub element: &'a Hex8Element<f64>,
}

/// Basis data of both neighbors at a face quadrature point.
#[derive(Debug, Clone)]
struct FacePoint {
    weight: f64,
    /// Normal derivatives `+-grad N_A . n` of the basis functions, master first.
    jumps: [f64; 2 * 8],
    /// Second normal derivatives `+-n^T H_A n`, if requested.
    second_jumps: [f64; 2 * 8],
    bases: [BasisPoint; 2],
}

#[allow(clippy::needless_range_loop)]
fn face_points(
    master: FaceNeighbor,
    master_face: usize,
    slave: FaceNeighbor,
    quadrature: &QuadraturePair2d,
    second_order: bool,
) -> Result<Vec<FacePoint>, XFluidError> {
    let face = master.element.face(master_face);
    let mut points = Vec::with_capacity(quadrature.len());
    for (&w, st) in quadrature.weights().iter().zip(quadrature.points()) {
        let area_normal = face.area_normal(st);
        let n = area_normal.normalize();
        let xi_master = Hex8Element::face_to_reference(master_face, st);
        let x = master.element.map_reference_coords(&xi_master);
        let xi_slave = map_physical_coordinates(slave.element, &x, default_inverse_map_settings(slave.element))
            .map_err(|err| XFluidError::ElementEvaluateFailure {
                element: slave.element_index,
                reason: format!("face point could not be located in neighbor element: {err}"),
            })?;

        let bases = [
            BasisPoint::evaluate(master.element_index, master.element, &xi_master)?,
            BasisPoint::evaluate(slave.element_index, slave.element, &xi_slave)?,
        ];
        let mut jumps = [0.0; 16];
        let mut second_jumps = [0.0; 16];
        let sign = [1.0, -1.0];
        for a in 0..2 {
            for node in 0..8 {
                jumps[8 * a + node] = sign[a] * bases[a].gradient(node).dot(&n);
            }
        }
        if second_order {
            let neighbors = [(master, xi_master), (slave, xi_slave)];
            for (a, (neighbor, xi)) in neighbors.iter().enumerate() {
                let hessians: [Matrix3<f64>; 8] =
                    neighbor
                        .element
                        .physical_hessians(xi)
                        .ok_or(XFluidError::NegativeJacobian {
                            element: neighbor.element_index,
                            determinant: bases[a].det,
                        })?;
                for node in 0..8 {
                    second_jumps[8 * a + node] = sign[a] * n.dot(&(hessians[node] * n));
                }
            }
        }
        points.push(FacePoint {
            weight: w * area_normal.norm(),
            jumps,
            second_jumps,
            bases,
        });
    }
    Ok(points)
}

/// Local dof of node `node` (of neighbor `a`) and component `c`.
fn local_dof(a: usize, node: usize, c: usize) -> usize {
    ELEMENT_DOFS * a + 4 * node + c
}

/// Sum of `jumps[aA] * values[a][A]` over both neighbors.
fn vector_jump(jumps: &[f64; 16], values: [&[Vector3<f64>; 8]; 2]) -> Vector3<f64> {
    let mut jump = Vector3::zeros();
    for a in 0..2 {
        for node in 0..8 {
            jump += values[a][node] * jumps[8 * a + node];
        }
    }
    jump
}

fn scalar_jump(jumps: &[f64; 16], values: [&[f64; 8]; 2]) -> f64 {
    (0..16).map(|i| values[i / 8][i % 8] * jumps[i]).sum()
}

/// Ghost-penalty contributions of one face between two cell sets of the same phase patch.
///
/// `fields` holds the nodal values of the master and slave cell sets.
#[allow(clippy::too_many_arguments)]
pub fn ghost_penalty(
    master: FaceNeighbor,
    master_face: usize,
    slave: FaceNeighbor,
    quadrature: &QuadraturePair2d,
    fields: [&ElementFields; 2],
    fluid: &NewtonianFluid,
    parameters: &GhostPenaltyParameters,
    context: &KernelContext,
    matrix: &mut DMatrix<f64>,
    rhs: &mut DVector<f64>,
) -> Result<(), XFluidError> {
    assert_eq!(matrix.nrows(), 2 * ELEMENT_DOFS);
    let (rho, mu) = (fluid.density, fluid.viscosity);
    let (s, afac, mfac) = (context.scaling(), context.velocity_factor(), context.mass_factor());
    let stationary = context.time.is_stationary();
    let h = 0.5 * (master.element.volume_equivalent_length() + slave.element.volume_equivalent_length());
    let h3 = h * h * h;

    let enabled = |flag: bool| if flag { 1.0 } else { 0.0 };
    let viscous = enabled(parameters.stab) * parameters.viscous_factor * mu * h;
    let transient = enabled(parameters.transient_stab && !stationary) * parameters.transient_factor * rho * h3;
    let second_order = enabled(parameters.second_order_stab) * parameters.second_order_factor * mu * h3;

    let points = face_points(master, master_face, slave, quadrature, parameters.second_order_stab)?;
    for point in &points {
        let w = point.weight;
        let j = &point.jumps;
        let jh = &point.second_jumps;

        let speed = point.bases[0].interpolate_vector(&fields[0].velocity).norm();
        let mut phi_p = mu + rho * speed * h;
        if !stationary {
            phi_p += rho * h * h / context.time.dt;
        }
        let pressure = enabled(parameters.stab) * parameters.pressure_factor * h3 / phi_p;

        let vel = [&fields[0].velocity, &fields[1].velocity];
        let acc = [&fields[0].acceleration, &fields[1].acceleration];
        let pre = [&fields[0].pressure, &fields[1].pressure];
        let du = vector_jump(j, vel);
        let da = vector_jump(j, acc);
        let d2u = vector_jump(jh, vel);
        let dp = scalar_jump(j, pre);

        for a in 0..2 {
            for node in 0..8 {
                let row = 8 * a + node;
                for i in 0..3 {
                    let residual = viscous * j[row] * du[i] + transient * j[row] * da[i] + second_order * jh[row] * d2u[i];
                    rhs[local_dof(a, node, i)] -= s * w * residual;
                }
                rhs[local_dof(a, node, 3)] -= s * w * pressure * j[row] * dp;

                for b in 0..2 {
                    for node_b in 0..8 {
                        let col = 8 * b + node_b;
                        let jj = j[row] * j[col];
                        let velocity_entry = afac * (viscous * jj + second_order * jh[row] * jh[col]) + mfac * transient * jj;
                        for i in 0..3 {
                            matrix[(local_dof(a, node, i), local_dof(b, node_b, i))] += s * w * velocity_entry;
                        }
                        matrix[(local_dof(a, node, 3), local_dof(b, node_b, 3))] += s * w * pressure * jj;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Unscaled component-wise penalty of the first normal derivative jumps, used to extend
/// fields into ghost dof-sets.
pub fn reconstruction_penalty(
    master: FaceNeighbor,
    master_face: usize,
    slave: FaceNeighbor,
    quadrature: &QuadraturePair2d,
    factor: f64,
    matrix: &mut DMatrix<f64>,
) -> Result<(), XFluidError> {
    assert_eq!(matrix.nrows(), 2 * ELEMENT_DOFS);
    let points = face_points(master, master_face, slave, quadrature, false)?;
    for point in &points {
        let j = &point.jumps;
        for row in 0..16 {
            for col in 0..16 {
                let value = factor * point.weight * j[row] * j[col];
                for c in 0..4 {
                    matrix[(local_dof(row / 8, row % 8, c), local_dof(col / 8, col % 8, c))] += value;
                }
            }
        }
    }
    Ok(())
}

/// Face quadrature for ghost-penalty integrals.
pub fn face_quadrature() -> QuadraturePair2d {
    crate::quadrature::quadrilateral_gauss(2)
}
