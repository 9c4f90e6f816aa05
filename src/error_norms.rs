//! Discretization errors against analytical solutions.
//!
//! Domain norms are integrated over the physical volume cells of every element; interface
//! norms over the boundary cells of one-sided couplings, against the interface velocity the
//! coupling prescribes.
use crate::analytical::ExactSolution;
use crate::assembly::cell_set_quadrature;
use crate::boundary::element_of;
use crate::coupling::ConditionManager;
use crate::cut::CutWizard;
use crate::dofset::GlobalDofMap;
use crate::element::FiniteElement;
use crate::error::XFluidError;
use crate::kernel::{BasisPoint, ElementFields};
use crate::mesh::HexMesh;
use crate::nalgebra::{DVector, Vector3};
use crate::quadrature::Quadrature;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Squared error integrals, accumulated per element and summed afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SquaredErrors {
    velocity_l2: f64,
    velocity_h1_semi: f64,
    pressure_l2: f64,
    viscosity_velocity_h1_semi: f64,
    viscosity_pressure_l2: f64,
    sigma_velocity_l2: f64,
    phi_pressure_l2: f64,
    interface_velocity_h_half: f64,
    interface_viscous_flux: f64,
    interface_pressure_flux: f64,
    interface_inflow: f64,
    interface_mass_conservation: f64,
}

/// Error norms of a discrete solution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorNorms {
    pub velocity_l2: f64,
    pub velocity_h1_semi: f64,
    pub velocity_h1: f64,
    pub pressure_l2: f64,
    /// `|| sqrt(nu) grad(u - u_h) ||`
    pub viscosity_velocity_h1_semi: f64,
    /// `|| (p - p_h) / sqrt(nu) ||`
    pub viscosity_pressure_l2: f64,
    /// `|| sqrt(sigma) (u - u_h) ||` with the reaction coefficient `sigma`.
    pub sigma_velocity_l2: f64,
    /// `|| sqrt(phi) (p - p_h) ||` with `phi = 1 / (nu + sigma h^2)`.
    pub phi_pressure_l2: f64,
    /// `|| sqrt(nu / h) (u_h - u*) ||` on the interface.
    pub interface_velocity_h_half: f64,
    /// `|| sqrt(h / nu) 2 nu eps(u - u_h) n ||` on the interface.
    pub interface_viscous_flux: f64,
    /// `|| sqrt(h / nu) (p - p_h) ||` on the interface.
    pub interface_pressure_flux: f64,
    /// `|| sqrt(|u* . n|) (u_h - u*) ||` on the inflow part of the interface.
    pub interface_inflow: f64,
    /// `|| (u_h - u*) . n ||` on the interface.
    pub interface_mass_conservation: f64,
}

impl fmt::Display for ErrorNorms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "velocity L2:         {:.6e}", self.velocity_l2)?;
        writeln!(f, "velocity H1 semi:    {:.6e}", self.velocity_h1_semi)?;
        writeln!(f, "velocity H1:         {:.6e}", self.velocity_h1)?;
        writeln!(f, "pressure L2:         {:.6e}", self.pressure_l2)?;
        writeln!(f, "interface H1/2:      {:.6e}", self.interface_velocity_h_half)?;
        write!(f, "interface mass cons: {:.6e}", self.interface_mass_conservation)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ErrorEvaluation<'a> {
    pub mesh: &'a HexMesh,
    pub displacement: Option<&'a [Vector3<f64>]>,
    pub wizard: &'a CutWizard,
    pub dofmap: &'a GlobalDofMap,
    pub conditions: &'a ConditionManager,
    /// Reaction coefficient `1 / (theta dt)`, zero for stationary problems.
    pub sigma: f64,
}

impl<'a> ErrorEvaluation<'a> {
    /// Computes all norms of `solution - exact(t)` for a solution vector with velocity and
    /// pressure components.
    pub fn compute(
        &self,
        solution: &DVector<f64>,
        exact: &dyn ExactSolution,
        t: f64,
    ) -> Result<ErrorNorms, XFluidError> {
        let mut sum = SquaredErrors::default();
        for e in 0..self.mesh.num_cells() {
            let element = element_of(self.mesh, e, self.displacement)?;
            let h = element.volume_equivalent_length();
            for set in self.dofmap.cell_sets(e) {
                let fluid = self.conditions.material_at(e, set.position)?;
                let nu = fluid.kinematic_viscosity();
                let phi = 1.0 / (nu + self.sigma * h * h);
                let lm = self.dofmap.location_vector(e, &set.nds);
                let fields = ElementFields::gather(&lm, solution, solution, None);

                let quadrature = cell_set_quadrature(self.wizard, e, set);
                for (&w, xi) in quadrature.weights().iter().zip(quadrature.points()) {
                    let basis = BasisPoint::evaluate(e, &element, xi)?;
                    let x = element.map_reference_coords(xi);
                    let dx = w * basis.det;
                    let u_error = basis.interpolate_vector(&fields.velocity) - exact.velocity(&x, t);
                    let grad_error =
                        basis.vector_gradient(&fields.velocity) - exact.velocity_gradient(&x, t);
                    let p_error = basis.interpolate_scalar(&fields.pressure) - exact.pressure(&x, t);

                    sum.velocity_l2 += dx * u_error.norm_squared();
                    sum.velocity_h1_semi += dx * grad_error.norm_squared();
                    sum.pressure_l2 += dx * p_error * p_error;
                    sum.viscosity_velocity_h1_semi += dx * nu * grad_error.norm_squared();
                    sum.viscosity_pressure_l2 += dx * p_error * p_error / nu;
                    sum.sigma_velocity_l2 += dx * self.sigma * u_error.norm_squared();
                    sum.phi_pressure_l2 += dx * phi * p_error * p_error;
                }

                for &vc in &set.volume_cells {
                    for &bc in &self.wizard.volume_cell(vc).boundary_cells {
                        let cell = self.wizard.boundary_cell(bc);
                        let coupling = self.conditions.coupling(cell.coupling);
                        if coupling.kind().is_two_phase() {
                            continue;
                        }
                        let Some((_, local_side)) = self.conditions.local_side(cell.side) else {
                            continue;
                        };
                        let n = cell.normal;
                        for ((&w, x), xi) in cell.weights.iter().zip(&cell.points).zip(&cell.reference_points) {
                            let basis = BasisPoint::evaluate(e, &element, xi)?;
                            let u_h = basis.interpolate_vector(&fields.velocity);
                            let u_star = coupling.interface_velocity(x, local_side);
                            let jump = u_h - u_star;

                            let grad_error =
                                basis.vector_gradient(&fields.velocity) - exact.velocity_gradient(x, t);
                            let strain = 0.5 * (grad_error + grad_error.transpose());
                            let viscous_flux = 2.0 * nu * strain * n;
                            let p_error = basis.interpolate_scalar(&fields.pressure) - exact.pressure(x, t);

                            sum.interface_velocity_h_half += w * nu / h * jump.norm_squared();
                            sum.interface_viscous_flux += w * h / nu * viscous_flux.norm_squared();
                            sum.interface_pressure_flux += w * h / nu * p_error * p_error;
                            let normal_velocity = u_star.dot(&n);
                            if normal_velocity < 0.0 {
                                sum.interface_inflow += w * normal_velocity.abs() * jump.norm_squared();
                            }
                            let normal_jump = jump.dot(&n);
                            sum.interface_mass_conservation += w * normal_jump * normal_jump;
                        }
                    }
                }
            }
        }

        Ok(ErrorNorms {
            velocity_l2: sum.velocity_l2.sqrt(),
            velocity_h1_semi: sum.velocity_h1_semi.sqrt(),
            velocity_h1: (sum.velocity_l2 + sum.velocity_h1_semi).sqrt(),
            pressure_l2: sum.pressure_l2.sqrt(),
            viscosity_velocity_h1_semi: sum.viscosity_velocity_h1_semi.sqrt(),
            viscosity_pressure_l2: sum.viscosity_pressure_l2.sqrt(),
            sigma_velocity_l2: sum.sigma_velocity_l2.sqrt(),
            phi_pressure_l2: sum.phi_pressure_l2.sqrt(),
            interface_velocity_h_half: sum.interface_velocity_h_half.sqrt(),
            interface_viscous_flux: sum.interface_viscous_flux.sqrt(),
            interface_pressure_flux: sum.interface_pressure_flux.sqrt(),
            interface_inflow: sum.interface_inflow.sqrt(),
            interface_mass_conservation: sum.interface_mass_conservation.sqrt(),
        })
    }
}
