//! Typed failures of the solver.
//!
//! Application-level functions return [`eyre::Result`], with an [`XFluidError`] at the root
//! of the report whenever the failure is one the caller may want to match on.
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum XFluidError {
    /// Inconsistent setup, detected before the first time step.
    Configuration(String),
    /// The cut wizard could not produce a consistent partition of an element.
    CutFailed { element: usize, reason: String },
    /// A node requires more nodal dof-sets than permitted.
    TooManyDofSets { node: usize, required: usize, max: usize },
    /// Field transfer produced no finite value for a node after every fallback.
    ReconstructionImpossible { node: usize },
    /// No material is defined for a volume cell at the given position.
    MaterialTypeUnexpected { element: usize, position: String },
    /// An element kernel could not be evaluated.
    ElementEvaluateFailure { element: usize, reason: String },
    /// The dofs of a coupling side do not match the coupling block dimensions.
    CouplingSizeOverflow { coupling: usize, dof: usize, size: usize },
    /// The assembled matrix does not annihilate the pressure nullspace vector.
    NullspaceViolation { norm: f64, tolerance: f64 },
    /// The restart bundle was written for a different dof layout.
    RestartDofMapMismatch { expected: usize, found: usize },
    /// An element has a non-positive Jacobian determinant.
    NegativeJacobian { element: usize, determinant: f64 },
}

impl fmt::Display for XFluidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "Invalid configuration: {msg}"),
            Self::CutFailed { element, reason } => write!(f, "Cut failed for element {element}: {reason}"),
            Self::TooManyDofSets { node, required, max } => write!(
                f,
                "Node {node} requires {required} nodal dof-sets, but at most {max} are allowed"
            ),
            Self::ReconstructionImpossible { node } => {
                write!(f, "Values for node {node} cannot be reconstructed by any method")
            }
            Self::MaterialTypeUnexpected { element, position } => write!(
                f,
                "No fluid material defined for position {position} in element {element}"
            ),
            Self::ElementEvaluateFailure { element, reason } => {
                write!(f, "Failed to evaluate element {element}: {reason}")
            }
            Self::CouplingSizeOverflow { coupling, dof, size } => write!(
                f,
                "Side dof {dof} of coupling {coupling} exceeds the coupling block size {size}"
            ),
            Self::NullspaceViolation { norm, tolerance } => write!(
                f,
                "System matrix does not annihilate the pressure mode: |A c| = {norm:e} > {tolerance:e}. \
                 The boundary cubature is likely too coarse"
            ),
            Self::RestartDofMapMismatch { expected, found } => write!(
                f,
                "Restart data holds {expected} dofs, but the current discretization has {found}"
            ),
            Self::NegativeJacobian { element, determinant } => write!(
                f,
                "Element {element} has non-positive Jacobian determinant {determinant:e}"
            ),
        }
    }
}

impl Error for XFluidError {}
