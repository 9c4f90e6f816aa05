//! Projection of the constant-pressure mode out of the Krylov space.
//!
//! A fluid domain enclosed by Dirichlet velocity conditions determines the pressure only up to
//! a constant. With the kernel vector `c` (one on pressure dofs) and a weight vector `w`
//! normalized to `wᵀc = 1`, the solver iterates on `Pᵀ A` with
//!
//! ```text
//! P x  = x - c (wᵀ x)
//! Pᵀ r = r - w (cᵀ r)
//! ```
//!
//! and the final iterate is projected with `P`.
use crate::assembly::cell_set_quadrature;
use crate::config::KrylovWeights;
use crate::cut::CutWizard;
use crate::dofset::GlobalDofMap;
use crate::error::XFluidError;
use crate::kernel::BasisPoint;
use crate::mesh::HexMesh;
use crate::nalgebra::{DVector, DVectorView, DVectorViewMut, Vector3};
use crate::quadrature::Quadrature;
use log::debug;
use nalgebra_sparse::CsrMatrix;
use std::error::Error;
use xfluid_sparse::LinearOperator;

#[derive(Debug, Clone, PartialEq)]
pub struct KrylovProjector {
    kernel: DVector<f64>,
    weights: DVector<f64>,
}

/// Kernel vector with ones on all pressure dofs that received contributions.
fn pressure_kernel(dofmap: &GlobalDofMap, empty_rows: &[bool]) -> DVector<f64> {
    DVector::from_fn(dofmap.num_dofs(), |dof, _| {
        if GlobalDofMap::is_pressure_dof(dof) && !empty_rows[dof] {
            1.0
        } else {
            0.0
        }
    })
}

impl KrylovProjector {
    /// Builds a projector from an arbitrary kernel and weight vector.
    ///
    /// Returns `None` if `wᵀc` vanishes, in which case no projection is possible.
    pub fn from_vectors(kernel: DVector<f64>, weights: DVector<f64>) -> Option<Self> {
        assert_eq!(kernel.len(), weights.len());
        let wc = weights.dot(&kernel);
        (wc.abs() > f64::EPSILON).then(|| Self {
            weights: weights / wc,
            kernel,
        })
    }

    /// Point-value weights, `w = c / (cᵀc)`.
    pub fn from_point_values(dofmap: &GlobalDofMap, empty_rows: &[bool]) -> Option<Self> {
        let kernel = pressure_kernel(dofmap, empty_rows);
        Self::from_vectors(kernel.clone(), kernel)
    }

    /// Integration weights, `w_j = ∫ N_j` over the physical part of the domain for the
    /// pressure dof `j`.
    pub fn from_integrated_weights(
        mesh: &HexMesh,
        displacement: Option<&[Vector3<f64>]>,
        wizard: &CutWizard,
        dofmap: &GlobalDofMap,
        empty_rows: &[bool],
    ) -> Result<Option<Self>, XFluidError> {
        let kernel = pressure_kernel(dofmap, empty_rows);
        let mut weights = DVector::zeros(dofmap.num_dofs());
        for e in 0..mesh.num_cells() {
            let element = crate::boundary::element_of(mesh, e, displacement)?;
            for set in dofmap.cell_sets(e) {
                let slots = dofmap.element_slots(e, &set.nds);
                let quadrature = cell_set_quadrature(wizard, e, set);
                for (&w, xi) in quadrature.weights().iter().zip(quadrature.points()) {
                    let basis = BasisPoint::evaluate(e, &element, xi)?;
                    for (a, &slot) in slots.iter().enumerate() {
                        weights[GlobalDofMap::dof(slot, 3)] += w * basis.det * basis.N[a];
                    }
                }
            }
        }
        Ok(Self::from_vectors(kernel, weights))
    }

    /// Builds the projector with the configured kind of weights.
    pub fn build(
        kind: KrylovWeights,
        mesh: &HexMesh,
        displacement: Option<&[Vector3<f64>]>,
        wizard: &CutWizard,
        dofmap: &GlobalDofMap,
        empty_rows: &[bool],
    ) -> Result<Option<Self>, XFluidError> {
        match kind {
            KrylovWeights::PointValues => Ok(Self::from_point_values(dofmap, empty_rows)),
            KrylovWeights::Integration => {
                Self::from_integrated_weights(mesh, displacement, wizard, dofmap, empty_rows)
            }
        }
    }

    pub fn kernel(&self) -> &DVector<f64> {
        &self.kernel
    }

    pub fn weights(&self) -> &DVector<f64> {
        &self.weights
    }

    /// `x <- x - c (wᵀ x)`
    pub fn apply_p(&self, x: &mut DVector<f64>) {
        let alpha = self.weights.dot(x);
        x.axpy(-alpha, &self.kernel, 1.0);
    }

    /// `r <- r - w (cᵀ r)`
    pub fn apply_pt(&self, r: &mut DVector<f64>) {
        let alpha = self.kernel.dot(r);
        r.axpy(-alpha, &self.weights, 1.0);
    }

    /// Checks that `A c` vanishes relative to the largest matrix entry.
    pub fn check_nullspace(&self, matrix: &CsrMatrix<f64>, tolerance: f64) -> Result<f64, XFluidError> {
        let ac = matrix * &self.kernel;
        let norm = ac.norm();
        let scale = matrix.values().iter().fold(1.0_f64, |max, v| max.max(v.abs()));
        debug!("Krylov nullspace check: |A c| = {norm:.3e}");
        if norm > tolerance * scale {
            Err(XFluidError::NullspaceViolation {
                norm,
                tolerance: tolerance * scale,
            })
        } else {
            Ok(norm)
        }
    }

    /// The operator `Pᵀ A`.
    pub fn project_operator<A>(&self, operator: A) -> ProjectedOperator<'_, A> {
        ProjectedOperator {
            operator,
            projector: self,
        }
    }
}

/// An operator followed by the left projection `Pᵀ`.
pub struct ProjectedOperator<'a, A> {
    operator: A,
    projector: &'a KrylovProjector,
}

impl<'a, A: LinearOperator<f64>> LinearOperator<f64> for ProjectedOperator<'a, A> {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        self.operator.apply(DVectorViewMut::from(&mut y), x)?;
        let alpha = self.projector.kernel.dot(&y);
        y.axpy(-alpha, &self.projector.weights, 1.0);
        Ok(())
    }
}
