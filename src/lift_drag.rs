//! Hydrodynamic forces on the interfaces.
use crate::boundary::element_of;
use crate::coupling::ConditionManager;
use crate::cut::CutWizard;
use crate::dofset::GlobalDofMap;
use crate::error::XFluidError;
use crate::kernel::{BasisPoint, ElementFields};
use crate::mesh::HexMesh;
use crate::nalgebra::{DVector, Matrix3, Vector3};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingForce {
    pub coupling: usize,
    pub name: String,
    /// Force exerted by the fluid on the interface.
    pub force: Vector3<f64>,
}

/// Integrates the Cauchy traction of the fluid over the boundary cells of every coupling.
///
/// The boundary-cell normal points out of the fluid, so the force acting on the interface
/// is `-∫ σ n`.
pub fn compute_forces(
    mesh: &HexMesh,
    displacement: Option<&[Vector3<f64>]>,
    wizard: &CutWizard,
    dofmap: &GlobalDofMap,
    conditions: &ConditionManager,
    solution: &DVector<f64>,
) -> Result<Vec<CouplingForce>, XFluidError> {
    let mut forces: Vec<Vector3<f64>> = vec![Vector3::zeros(); conditions.num_couplings()];
    for e in 0..mesh.num_cells() {
        if !wizard.is_cut(e) {
            continue;
        }
        let element = element_of(mesh, e, displacement)?;
        for set in dofmap.cell_sets(e) {
            let fluid = conditions.material_at(e, set.position)?;
            let lm = dofmap.location_vector(e, &set.nds);
            let fields = ElementFields::gather(&lm, solution, solution, None);
            for &vc in &set.volume_cells {
                for &bc in &wizard.volume_cell(vc).boundary_cells {
                    let cell = wizard.boundary_cell(bc);
                    // Normal out of the fluid cell `vc`
                    let n = if cell.outside == vc { cell.normal } else { -cell.normal };
                    for (&w, xi) in cell.weights.iter().zip(&cell.reference_points) {
                        let basis = BasisPoint::evaluate(e, &element, xi)?;
                        let grad_u = basis.vector_gradient(&fields.velocity);
                        let p = basis.interpolate_scalar(&fields.pressure);
                        let stress = -p * Matrix3::identity() + fluid.viscosity * (grad_u + grad_u.transpose());
                        forces[cell.coupling] -= w * stress * n;
                    }
                }
            }
        }
    }

    Ok(forces
        .into_iter()
        .enumerate()
        .map(|(coupling, force)| {
            let name = conditions.coupling(coupling).name().to_string();
            info!("Force on {name}: [{:.6e}, {:.6e}, {:.6e}]", force.x, force.y, force.z);
            CouplingForce { coupling, name, force }
        })
        .collect())
}
