//! JSON restart bundles.
use crate::coupling::InterfaceState;
use crate::dofset::GlobalDofMap;
use crate::driver::AleState;
use crate::error::XFluidError;
use eyre::WrapErr;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything needed to continue a simulation after step `step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartBundle {
    pub step: usize,
    pub time: f64,
    pub dt_previous: f64,
    pub velnp: Vec<f64>,
    pub veln: Vec<f64>,
    pub velnm: Vec<f64>,
    pub accnp: Vec<f64>,
    pub accn: Vec<f64>,
    pub ale: Option<AleState>,
    pub interface_states: Vec<InterfaceState>,
    /// Number of nodal dof-sets per background node.
    pub dofsets_per_node: Vec<usize>,
}

impl RestartBundle {
    pub fn num_dofs(&self) -> usize {
        self.velnp.len()
    }

    /// Checks that `dofmap` has the dof-set layout the bundle was written for.
    pub fn check_layout(&self, dofmap: &GlobalDofMap) -> Result<(), XFluidError> {
        let found = dofmap.dofsets_per_node();
        if found == self.dofsets_per_node && dofmap.num_dofs() == self.num_dofs() {
            return Ok(());
        }
        if dofmap.num_dofs() == self.num_dofs() {
            let node = found
                .iter()
                .zip(&self.dofsets_per_node)
                .position(|(a, b)| a != b)
                .unwrap_or(found.len());
            warn!("Restart cut differs from the stored dof-set layout, first at node {node}");
        }
        Err(XFluidError::RestartDofMapMismatch {
            expected: self.num_dofs(),
            found: dofmap.num_dofs(),
        })
    }

    pub fn to_json_string(&self) -> eyre::Result<String> {
        serde_json::to_string(self).wrap_err("failed to serialize restart data")
    }

    pub fn from_json_str(json: &str) -> eyre::Result<Self> {
        serde_json::from_str(json).wrap_err("failed to parse restart data")
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> eyre::Result<()> {
        let path = path.as_ref();
        if let Some(directory) = path.parent() {
            std::fs::create_dir_all(directory)
                .wrap_err_with(|| format!("failed to create restart directory {}", directory.display()))?;
        }
        std::fs::write(path, self.to_json_string()?)
            .wrap_err_with(|| format!("failed to write restart file {}", path.display()))
    }

    pub fn read_json(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read restart file {}", path.display()))?;
        Self::from_json_str(&json)
    }
}
