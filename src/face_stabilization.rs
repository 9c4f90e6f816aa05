//! Face-jump stabilization across interior faces of the background mesh.
//!
//! A face takes part if one of its two elements is cut, or always when inner faces are
//! requested. Contributions are integrated once per pair of cell sets of the two elements
//! that belong to the same phase patch, since only those share nodal dof-sets.
use crate::assembly::{AssemblyData, CsrAssembler};
use crate::boundary::element_of;
use crate::cut::CutWizard;
use crate::dofset::{CellSet, GlobalDofMap};
use crate::error::XFluidError;
use crate::kernel::face::{face_quadrature, ghost_penalty, reconstruction_penalty, FaceNeighbor};
use crate::kernel::{LocalSystem, ELEMENT_DOFS};
use crate::mesh::{HexMesh, InteriorFace, MeshFaces};
use crate::nalgebra::{DVector, Vector3};
use eyre::eyre;
use log::debug;
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;
use xfluid_sparse::csr::{apply_identity_rows, zero_masked_entries};
use xfluid_sparse::{Gmres, Ilu0};

/// Cell sets of the master and slave element of a face coupled by stabilization terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacePair {
    pub face: usize,
    pub master_set: usize,
    pub slave_set: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct FaceStabilizer<'a> {
    mesh: &'a HexMesh,
    faces: &'a MeshFaces,
    displacement: Option<&'a [Vector3<f64>]>,
    wizard: &'a CutWizard,
    dofmap: &'a GlobalDofMap,
}

fn same_patch(a: &CellSet, b: &CellSet) -> bool {
    a.position == b.position && a.patch == b.patch
}

impl<'a> FaceStabilizer<'a> {
    pub fn new(
        mesh: &'a HexMesh,
        faces: &'a MeshFaces,
        displacement: Option<&'a [Vector3<f64>]>,
        wizard: &'a CutWizard,
        dofmap: &'a GlobalDofMap,
    ) -> Self {
        Self {
            mesh,
            faces,
            displacement,
            wizard,
            dofmap,
        }
    }

    /// Indices of the interior faces that carry stabilization terms.
    pub fn active_faces(&self, add_inner_faces: bool) -> Vec<usize> {
        self.faces
            .interior()
            .iter()
            .enumerate()
            .filter(|(_, face)| add_inner_faces || self.wizard.is_cut(face.master) || self.wizard.is_cut(face.slave))
            .map(|(i, _)| i)
            .collect()
    }

    /// All same-patch cell-set pairs of the active faces.
    pub fn face_pairs(&self, add_inner_faces: bool) -> Vec<FacePair> {
        let mut pairs = Vec::new();
        for face_index in self.active_faces(add_inner_faces) {
            let face = &self.faces.interior()[face_index];
            let master_sets = self.dofmap.cell_sets(face.master);
            let slave_sets = self.dofmap.cell_sets(face.slave);
            for (m, master_set) in master_sets.iter().enumerate() {
                for (s, slave_set) in slave_sets.iter().enumerate() {
                    if same_patch(master_set, slave_set) {
                        pairs.push(FacePair {
                            face: face_index,
                            master_set: m,
                            slave_set: s,
                        });
                    }
                }
            }
        }
        pairs
    }

    fn pair_dofs(&self, face: &InteriorFace, pair: &FacePair) -> Vec<usize> {
        let master_set = &self.dofmap.cell_sets(face.master)[pair.master_set];
        let slave_set = &self.dofmap.cell_sets(face.slave)[pair.slave_set];
        let mut dofs = self.dofmap.location_vector(face.master, &master_set.nds);
        dofs.extend(self.dofmap.location_vector(face.slave, &slave_set.nds));
        debug_assert_eq!(dofs.len(), 2 * ELEMENT_DOFS);
        dofs
    }

    /// Ghost-penalty systems of all active faces at the state of `data`.
    pub fn assemble(&self, data: &AssemblyData) -> Result<Vec<LocalSystem>, XFluidError> {
        let parameters = &data.params.ghost_penalty;
        let pairs = self.face_pairs(parameters.add_inner_faces);
        let quadrature = face_quadrature();

        pairs
            .par_iter()
            .map(|pair| {
                let face = &self.faces.interior()[pair.face];
                let master_element = element_of(self.mesh, face.master, self.displacement)?;
                let slave_element = element_of(self.mesh, face.slave, self.displacement)?;
                let master_set = &self.dofmap.cell_sets(face.master)[pair.master_set];
                let slave_set = &self.dofmap.cell_sets(face.slave)[pair.slave_set];
                let fluid = data.conditions.material_at(face.master, master_set.position)?;

                let dofs = self.pair_dofs(face, pair);
                let master_fields = data.gather(face.master, &dofs[..ELEMENT_DOFS]);
                let slave_fields = data.gather(face.slave, &dofs[ELEMENT_DOFS..]);
                debug_assert!(same_patch(master_set, slave_set));

                let mut system = LocalSystem::zeros(dofs);
                ghost_penalty(
                    FaceNeighbor {
                        element_index: face.master,
                        element: &master_element,
                    },
                    face.master_face,
                    FaceNeighbor {
                        element_index: face.slave,
                        element: &slave_element,
                    },
                    &quadrature,
                    [&master_fields, &slave_fields],
                    &fluid,
                    parameters,
                    &data.context,
                    &mut system.matrix,
                    &mut system.rhs,
                )?;
                Ok(system)
            })
            .collect()
    }

    /// Unscaled jump-penalty matrix `K` used to extend fields into ghost dof-sets.
    pub fn reconstruction_matrix(&self, factor: f64) -> Result<CsrMatrix<f64>, XFluidError> {
        let pairs = self.face_pairs(true);
        let quadrature = face_quadrature();
        let systems: Vec<LocalSystem> = pairs
            .par_iter()
            .map(|pair| {
                let face = &self.faces.interior()[pair.face];
                let master_element = element_of(self.mesh, face.master, self.displacement)?;
                let slave_element = element_of(self.mesh, face.slave, self.displacement)?;
                let mut system = LocalSystem::zeros(self.pair_dofs(face, pair));
                reconstruction_penalty(
                    FaceNeighbor {
                        element_index: face.master,
                        element: &master_element,
                    },
                    face.master_face,
                    FaceNeighbor {
                        element_index: face.slave,
                        element: &slave_element,
                    },
                    &quadrature,
                    factor,
                    &mut system.matrix,
                )?;
                Ok(system)
            })
            .collect::<Result<_, XFluidError>>()?;
        let (matrix, _) = CsrAssembler::default().assemble(self.dofmap.num_dofs(), &systems);
        Ok(matrix)
    }

    /// The incremental reconstruction system `K d = -K v` for the values `v`.
    ///
    /// Rows of `known` dofs and rows without face contributions are replaced by identity rows
    /// with zero right-hand side, so that the increment vanishes there.
    pub fn reconstruction_system(
        penalty_matrix: &CsrMatrix<f64>,
        known: &[bool],
        values: &DVector<f64>,
    ) -> (CsrMatrix<f64>, DVector<f64>) {
        assert_eq!(known.len(), penalty_matrix.nrows());
        let mut matrix = penalty_matrix.clone();
        let mut rhs = -(penalty_matrix * values);
        let fixed: Vec<bool> = crate::assembly::empty_rows(&matrix)
            .into_iter()
            .zip(known)
            .map(|(empty, &known)| empty || known)
            .collect();
        apply_identity_rows(&mut matrix, &fixed);
        zero_masked_entries(&mut rhs, &fixed);
        (matrix, rhs)
    }

    /// Overwrites the unknown entries of `values` by a smooth extension of the known ones.
    pub fn reconstruct(&self, factor: f64, known: &[bool], values: &mut DVector<f64>) -> eyre::Result<()> {
        let penalty_matrix = self.reconstruction_matrix(factor)?;
        solve_reconstruction(&penalty_matrix, known, values, 1e-12)
    }
}

/// Solves the incremental reconstruction system for `values` with GMRES and ILU(0).
pub fn solve_reconstruction(
    penalty_matrix: &CsrMatrix<f64>,
    known: &[bool],
    values: &mut DVector<f64>,
    tolerance: f64,
) -> eyre::Result<()> {
    let num_unknown = known.iter().filter(|&&k| !k).count();
    if num_unknown == 0 {
        return Ok(());
    }
    let (matrix, rhs) = FaceStabilizer::reconstruction_system(penalty_matrix, known, values);
    let preconditioner = Ilu0::from_csr(&matrix)?;
    let mut increment = DVector::zeros(rhs.len());
    let output = Gmres::new()
        .with_operator(&matrix)
        .with_preconditioner(&preconditioner)
        .with_restart(100)
        .with_tolerance(tolerance)
        .with_max_iter(2000)
        .solve_with_guess(&rhs, &mut increment)
        .map_err(|err| eyre!("ghost-penalty reconstruction failed: {}", err))?;
    debug!(
        "Reconstruction of {num_unknown} dofs converged after {} iterations (relative residual {:.3e})",
        output.num_iterations, output.relative_residual
    );
    *values += increment;
    Ok(())
}
