//! Initial velocity and pressure fields.
use crate::analytical::{BeltramiFlow, ExactSolution};
use crate::cut::{CutWizard, Position};
use crate::dofset::GlobalDofMap;
use crate::error::XFluidError;
use crate::face_stabilization::{solve_reconstruction, FaceStabilizer};
use crate::function::{ScalarField, VectorField};
use crate::material::FluidMaterial;
use crate::mesh::{HexMesh, MeshFaces};
use crate::nalgebra::{DVector, Vector3};
use crate::state::StateSnapshot;
use log::info;

/// Densities the flame-vortex interaction preset is defined for.
pub const FLAME_VORTEX_UNBURNT_DENSITY: f64 = 1.161;
pub const FLAME_VORTEX_BURNT_DENSITY: f64 = 0.157;

#[derive(Debug, Clone, Default)]
pub enum InitialField {
    #[default]
    Zero,
    /// Velocity and pressure from functions of space, evaluated at `t = 0`.
    Function { velocity: VectorField, pressure: ScalarField },
    /// Beltrami flow at `t = 0` with the density of the outside fluid.
    BeltramiFlow,
    /// Quiescent two-phase state of the flame-vortex interaction problem. Standard dof-sets
    /// start at rest with zero pressure; ghost dof-sets are extended by ghost-penalty
    /// reconstruction.
    FlameVortexInteraction,
}

/// Discretization on which the initial field is set.
#[derive(Debug, Clone, Copy)]
pub struct InitialFieldContext<'a> {
    pub mesh: &'a HexMesh,
    pub faces: &'a MeshFaces,
    pub displacement: Option<&'a [Vector3<f64>]>,
    pub wizard: &'a CutWizard,
    pub material: &'a FluidMaterial,
    pub reconstruction_factor: f64,
}

fn set_from_solution(dofmap: &GlobalDofMap, wizard: &CutWizard, velnp: &mut DVector<f64>, solution: &dyn ExactSolution) {
    for (slot, set) in dofmap.slots().iter().enumerate() {
        let x = &wizard.node_coordinates()[set.node];
        let u = solution.velocity(x, 0.0);
        for c in 0..3 {
            velnp[GlobalDofMap::dof(slot, c)] = u[c];
        }
        velnp[GlobalDofMap::dof(slot, 3)] = solution.pressure(x, 0.0);
    }
}

impl InitialField {
    /// Sets `velnp`, `veln` and `velnm` of the snapshot and zeroes the accelerations.
    pub fn apply(&self, context: &InitialFieldContext, state: &mut StateSnapshot) -> eyre::Result<()> {
        let dofmap = state.shared_dofmap();
        let mut velnp = DVector::zeros(dofmap.num_dofs());
        match self {
            Self::Zero => {}
            Self::Function { velocity, pressure } => {
                let solution = crate::analytical::FunctionSolution {
                    velocity: velocity.clone(),
                    pressure: pressure.clone(),
                };
                set_from_solution(&dofmap, context.wizard, &mut velnp, &solution);
            }
            Self::BeltramiFlow => {
                let fluid = context.material.resolve(0, Position::Outside)?;
                let solution = BeltramiFlow::new(fluid.density, fluid.kinematic_viscosity());
                set_from_solution(&dofmap, context.wizard, &mut velnp, &solution);
            }
            Self::FlameVortexInteraction => {
                let FluidMaterial::TwoPhase { outside, inside } = context.material else {
                    return Err(XFluidError::Configuration(
                        "the flame-vortex initial field requires a two-phase material".to_string(),
                    )
                    .into());
                };
                if outside.density != FLAME_VORTEX_UNBURNT_DENSITY || inside.density != FLAME_VORTEX_BURNT_DENSITY {
                    return Err(XFluidError::Configuration(format!(
                        "the flame-vortex initial field expects densities {FLAME_VORTEX_UNBURNT_DENSITY} (unburnt) \
                         and {FLAME_VORTEX_BURNT_DENSITY} (burnt), found {} and {}",
                        outside.density, inside.density
                    ))
                    .into());
                }
                let known: Vec<bool> = (0..dofmap.num_dofs())
                    .map(|dof| dofmap.slot(dof / crate::dofset::DOFS_PER_SET).standard)
                    .collect();
                let stabilizer = FaceStabilizer::new(
                    context.mesh,
                    context.faces,
                    context.displacement,
                    context.wizard,
                    &dofmap,
                );
                let penalty_matrix = stabilizer.reconstruction_matrix(context.reconstruction_factor)?;
                solve_reconstruction(&penalty_matrix, &known, &mut velnp, 1e-12)?;
                info!("Reconstructed ghost values of the flame-vortex initial field");
            }
        }

        state.velnp = velnp.clone();
        state.veln = velnp.clone();
        state.velnm = velnp;
        state.accnp.fill(0.0);
        state.accn.fill(0.0);
        Ok(())
    }
}
