//! Solution state of one iterate of the monolithic fluid system.
//!
//! A [`StateSnapshot`] is tied to one [`GlobalDofMap`]. When the cut or the dof-sets change,
//! the driver creates a new snapshot for the new map and transfers the vectors of the old one
//! into it, instead of resizing the old snapshot in place.
use crate::dofset::{GlobalDofMap, DOFS_PER_SET};
use crate::nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;

/// Coupling blocks between background dofs `x` and the side dofs `s` of one coupling.
#[derive(Debug, Clone, PartialEq)]
pub struct CouplingBlocks {
    pub c_xs: CsrMatrix<f64>,
    pub c_sx: CsrMatrix<f64>,
    pub c_ss: CsrMatrix<f64>,
    pub rhs_s: DVector<f64>,
}

impl CouplingBlocks {
    pub fn zeros(num_dofs: usize, num_side_dofs: usize) -> Self {
        Self {
            c_xs: CsrMatrix::zeros(num_dofs, num_side_dofs),
            c_sx: CsrMatrix::zeros(num_side_dofs, num_dofs),
            c_ss: CsrMatrix::zeros(num_side_dofs, num_side_dofs),
            rhs_s: DVector::zeros(num_side_dofs),
        }
    }

    pub fn num_side_dofs(&self) -> usize {
        self.rhs_s.len()
    }
}

/// The assembled linear system of one Newton iteration.
#[derive(Debug, Clone)]
pub struct AssembledSystem {
    pub matrix: CsrMatrix<f64>,
    /// `-s * F`, with the residual scaling `s` of the time integration scheme.
    pub rhs: DVector<f64>,
    /// Blocks of couplings with side dofs, indexed by coupling.
    pub coupling_blocks: Vec<Option<CouplingBlocks>>,
    /// Rows that received no contribution and were replaced by identity rows.
    pub empty_rows: Vec<bool>,
}

#[derive(Debug, Clone)]
pub struct StateSnapshot {
    iteration: usize,
    dofmap: Arc<GlobalDofMap>,
    pub system: Option<AssembledSystem>,
    pub velnp: DVector<f64>,
    pub veln: DVector<f64>,
    pub velnm: DVector<f64>,
    pub accnp: DVector<f64>,
    pub accn: DVector<f64>,
    pub hist: DVector<f64>,
    /// Dofs with Dirichlet conditions.
    pub dirichlet: Vec<bool>,
}

impl StateSnapshot {
    /// A snapshot with zero vectors for the given dof map.
    pub fn new(iteration: usize, dofmap: Arc<GlobalDofMap>) -> Self {
        let n = dofmap.num_dofs();
        Self {
            iteration,
            dofmap,
            system: None,
            velnp: DVector::zeros(n),
            veln: DVector::zeros(n),
            velnm: DVector::zeros(n),
            accnp: DVector::zeros(n),
            accn: DVector::zeros(n),
            hist: DVector::zeros(n),
            dirichlet: vec![false; n],
        }
    }

    /// The next iterate on the same dof map. The system of `self` is not carried over.
    pub fn successor(&self) -> Self {
        Self {
            iteration: self.iteration + 1,
            dofmap: Arc::clone(&self.dofmap),
            system: None,
            velnp: self.velnp.clone(),
            veln: self.veln.clone(),
            velnm: self.velnm.clone(),
            accnp: self.accnp.clone(),
            accn: self.accn.clone(),
            hist: self.hist.clone(),
            dirichlet: self.dirichlet.clone(),
        }
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn dofmap(&self) -> &GlobalDofMap {
        &self.dofmap
    }

    pub fn shared_dofmap(&self) -> Arc<GlobalDofMap> {
        Arc::clone(&self.dofmap)
    }

    pub fn num_dofs(&self) -> usize {
        self.dofmap.num_dofs()
    }

    /// Splits a vector into its velocity and pressure parts, zeroing the other components.
    pub fn split_velocity_pressure(vector: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
        let mut velocity = vector.clone();
        let mut pressure = vector.clone();
        for (dof, (u, p)) in velocity.iter_mut().zip(pressure.iter_mut()).enumerate() {
            if GlobalDofMap::is_pressure_dof(dof) {
                *u = 0.0;
            } else {
                *p = 0.0;
            }
        }
        (velocity, pressure)
    }

    /// Mask of the velocity dofs of standard dof-sets.
    pub fn standard_velocity_mask(&self) -> Vec<bool> {
        (0..self.num_dofs())
            .map(|dof| !GlobalDofMap::is_pressure_dof(dof) && self.dofmap.slot(dof / DOFS_PER_SET).standard)
            .collect()
    }
}
