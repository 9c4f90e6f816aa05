//! Assembly of the monolithic system over cut and uncut background elements.
//!
//! Local systems are evaluated element-parallel and scattered sequentially, so the assembled
//! values do not depend on the scheduling of the element loop.
use crate::boundary::BoundaryConditions;
use crate::error::XFluidError;
use crate::face_stabilization::FaceStabilizer;
use crate::mesh::MeshFaces;
use crate::state::{AssembledSystem, CouplingBlocks};
use log::debug;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use xfluid_sparse::csr::{apply_identity_rows, zero_masked_entries};

pub mod global;
pub mod local;

pub use global::*;
pub use local::*;

/// Assembles the system matrix, right-hand side and coupling blocks.
///
/// Rows flagged in `dirichlet` and rows without any contribution are replaced by identity
/// rows with zero right-hand side. Rows of Dirichlet dofs are also left out of `C_xs`.
pub fn assemble_system(
    data: &AssemblyData,
    faces: &MeshFaces,
    boundary: &BoundaryConditions,
    dirichlet: &[bool],
) -> Result<AssembledSystem, XFluidError> {
    let num_dofs = data.dofmap.num_dofs();
    assert_eq!(dirichlet.len(), num_dofs);

    let contributions: Vec<ElementContribution> = (0..data.mesh.num_cells())
        .into_par_iter()
        .map(|e| evaluate_element(data, e))
        .collect::<Result<_, _>>()?;

    let mut systems = Vec::new();
    let mut sides = Vec::new();
    for contribution in contributions {
        systems.extend(contribution.systems);
        sides.extend(contribution.sides);
    }

    let gp = &data.params.ghost_penalty;
    if gp.stab || gp.transient_stab || gp.second_order_stab {
        let stabilizer = FaceStabilizer::new(data.mesh, faces, data.displacement, data.wizard, data.dofmap);
        let face_systems = stabilizer.assemble(data)?;
        debug!("Assembled {} ghost-penalty face systems", face_systems.len());
        systems.extend(face_systems);
    }
    systems.extend(boundary.neumann_systems(
        data.mesh,
        faces,
        data.displacement,
        data.wizard,
        data.dofmap,
        &data.context,
    )?);

    let (mut matrix, mut rhs) = CsrAssembler::default().assemble(num_dofs, &systems);
    let empty_rows = empty_rows(&matrix);
    let num_empty = empty_rows.iter().filter(|&&empty| empty).count();
    if num_empty > 0 {
        debug!("{num_empty} rows without contributions receive identity rows");
    }
    let identity_rows: Vec<bool> = dirichlet.iter().zip(&empty_rows).map(|(&d, &e)| d || e).collect();
    apply_identity_rows(&mut matrix, &identity_rows);
    zero_masked_entries(&mut rhs, &identity_rows);

    let coupling_blocks = assemble_coupling_blocks(data, &sides, dirichlet);
    Ok(AssembledSystem {
        matrix,
        rhs,
        coupling_blocks,
        empty_rows,
    })
}

/// Rows whose stored entries are all zero.
pub fn empty_rows(matrix: &CsrMatrix<f64>) -> Vec<bool> {
    matrix
        .row_iter()
        .map(|row| row.values().iter().all(|&v| v == 0.0))
        .collect()
}

fn assemble_coupling_blocks(
    data: &AssemblyData,
    sides: &[SideContribution],
    dirichlet: &[bool],
) -> Vec<Option<CouplingBlocks>> {
    let num_dofs = data.dofmap.num_dofs();
    let conditions = data.conditions;
    (0..conditions.num_couplings())
        .map(|coupling| {
            let interface = conditions.coupling(coupling);
            if !interface.kind().has_side_dofs() {
                return None;
            }
            let num_side_dofs = interface.num_side_dofs();
            let mut c_xs = CooMatrix::new(num_dofs, num_side_dofs);
            let mut c_sx = CooMatrix::new(num_side_dofs, num_dofs);
            let mut c_ss = CooMatrix::new(num_side_dofs, num_side_dofs);
            let mut blocks = CouplingBlocks::zeros(num_dofs, num_side_dofs);
            for side in sides.iter().filter(|side| side.coupling == coupling) {
                let system = &side.system;
                add_block_to_coo(&mut c_xs, &side.x_dofs, &side.s_dofs, &system.c_xs, |row| dirichlet[row]);
                add_block_to_coo(&mut c_sx, &side.s_dofs, &side.x_dofs, &system.c_sx, |_| false);
                add_block_to_coo(&mut c_ss, &side.s_dofs, &side.s_dofs, &system.c_ss, |_| false);
                for (local, &dof) in side.s_dofs.iter().enumerate() {
                    blocks.rhs_s[dof] += system.rhs_s[local];
                }
            }
            blocks.c_xs = CsrMatrix::from(&c_xs);
            blocks.c_sx = CsrMatrix::from(&c_sx);
            blocks.c_ss = CsrMatrix::from(&c_ss);
            Some(blocks)
        })
        .collect()
}
