//! Fluid materials.
use crate::cut::Position;
use crate::error::XFluidError;
use serde::{Deserialize, Serialize};

/// Incompressible Newtonian fluid.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewtonianFluid {
    pub density: f64,
    /// Dynamic viscosity.
    pub viscosity: f64,
}

impl NewtonianFluid {
    pub fn new(density: f64, viscosity: f64) -> Self {
        Self { density, viscosity }
    }

    pub fn kinematic_viscosity(&self) -> f64 {
        self.viscosity / self.density
    }
}

/// Material of the background fluid, resolved per volume cell position.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum FluidMaterial {
    /// A single fluid occupying the outside of all interfaces.
    Single(NewtonianFluid),
    /// Material list for two-phase problems.
    TwoPhase {
        outside: NewtonianFluid,
        inside: NewtonianFluid,
    },
}

impl FluidMaterial {
    pub fn at(&self, position: Position) -> Option<NewtonianFluid> {
        match (self, position) {
            (Self::Single(fluid), Position::Outside) => Some(*fluid),
            (Self::TwoPhase { outside, .. }, Position::Outside) => Some(*outside),
            (Self::TwoPhase { inside, .. }, Position::Inside) => Some(*inside),
            _ => None,
        }
    }

    pub fn resolve(&self, element: usize, position: Position) -> Result<NewtonianFluid, XFluidError> {
        self.at(position)
            .ok_or_else(|| XFluidError::MaterialTypeUnexpected {
                element,
                position: format!("{position:?}"),
            })
    }

    pub fn is_two_phase(&self) -> bool {
        matches!(self, Self::TwoPhase { .. })
    }

    /// Largest dynamic viscosity of all fluids.
    pub fn max_viscosity(&self) -> f64 {
        match self {
            Self::Single(fluid) => fluid.viscosity,
            Self::TwoPhase { outside, inside } => outside.viscosity.max(inside.viscosity),
        }
    }
}
