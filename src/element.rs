//! Reference and physical finite elements used by the solver.
//!
//! The background discretization uses trilinear hexahedra. Linear tetrahedra describe the
//! sub-cells produced by the cut wizard and bilinear quadrilaterals the element faces.
use std::error::Error;
use std::fmt;

use nalgebra::{Matrix3, Point3};
use numeric_literals::replace_float_literals;

use crate::Real;

mod hexahedron;
mod quadrilateral;
mod tetrahedron;

pub use hexahedron::*;
pub use quadrilateral::*;
pub use tetrahedron::*;

/// A finite element whose reference domain and physical domain are both three-dimensional.
pub trait FiniteElement<T: Real> {
    fn map_reference_coords(&self, xi: &Point3<T>) -> Point3<T>;

    fn reference_jacobian(&self, xi: &Point3<T>) -> Matrix3<T>;

    /// The maximum distance between any two points in the element.
    fn diameter(&self) -> T;
}

/// Evaluates the 1D linear Lagrange basis function centered at `alpha` in `[-1, 1]`.
///
/// `alpha` is either `-1` or `1`.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub(crate) fn phi_linear_1d<T: Real>(alpha: T, xi: T) -> T {
    (1.0 + alpha * xi) / 2.0
}

/// Derivative of the basis function returned by [`phi_linear_1d`].
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub(crate) fn phi_linear_1d_grad<T: Real>(alpha: T) -> T {
    alpha / 2.0
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonSettings<T> {
    pub max_iterations: usize,
    /// Absolute tolerance on the physical distance `|x(xi) - x|`.
    pub tolerance: T,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InverseMapError {
    SingularJacobian { iteration: usize },
    MaxIterationsReached { max_iterations: usize },
}

impl fmt::Display for InverseMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingularJacobian { iteration } => {
                write!(f, "Element Jacobian is singular at Newton iteration {iteration}")
            }
            Self::MaxIterationsReached { max_iterations } => {
                write!(f, "Inverse map did not converge within {max_iterations} iterations")
            }
        }
    }
}

impl Error for InverseMapError {}

/// Maps physical coordinates `x` to reference coordinates `xi` by solving `x(xi) - x = 0`
/// with Newton's method, starting from the reference centroid.
pub fn map_physical_coordinates<T, Element>(
    element: &Element,
    x: &Point3<T>,
    settings: NewtonSettings<T>,
) -> Result<Point3<T>, InverseMapError>
where
    T: Real,
    Element: FiniteElement<T>,
{
    let mut xi = Point3::origin();
    for iteration in 0..settings.max_iterations {
        let residual = element.map_reference_coords(&xi) - x;
        if residual.norm() <= settings.tolerance {
            return Ok(xi);
        }
        let jacobian = element.reference_jacobian(&xi);
        let delta = jacobian
            .lu()
            .solve(&residual)
            .ok_or(InverseMapError::SingularJacobian { iteration })?;
        xi -= delta;
    }

    let residual = element.map_reference_coords(&xi) - x;
    if residual.norm() <= settings.tolerance {
        Ok(xi)
    } else {
        Err(InverseMapError::MaxIterationsReached {
            max_iterations: settings.max_iterations,
        })
    }
}

/// Default settings for point inversion: tolerance relative to the element diameter.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn default_inverse_map_settings<T: Real>(element: &impl FiniteElement<T>) -> NewtonSettings<T> {
    NewtonSettings {
        max_iterations: 20,
        tolerance: 1e-12 * element.diameter(),
    }
}
