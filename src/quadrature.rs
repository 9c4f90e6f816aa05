//! Quadrature rules for the reference domains used by the solver.
//!
//! Hexahedra and quadrilaterals live on `[-1, 1]^d`, simplices on the unit simplex with
//! vertices at the origin and the unit vectors.
use nalgebra::{Point2, Point3};
use num::Zero;
use std::ops::{AddAssign, Mul};

pub mod simplex;
pub mod tensor;
pub mod univariate;

pub use simplex::{tetrahedron, triangle};
pub use tensor::{hexahedron_gauss, quadrilateral_gauss};
pub use univariate::gauss;

pub type QuadraturePair1d = (Vec<f64>, Vec<f64>);
pub type QuadraturePair2d = (Vec<f64>, Vec<Point2<f64>>);
pub type QuadraturePair3d = (Vec<f64>, Vec<Point3<f64>>);

/// A quadrature rule consisting of weights and points.
pub trait Quadrature<P> {
    fn weights(&self) -> &[f64];
    fn points(&self) -> &[P];

    /// Approximates the integral of the given function using this quadrature rule.
    fn integrate<U, Function>(&self, f: Function) -> U
    where
        Function: Fn(&P) -> U,
        U: Zero + Mul<f64, Output = U> + AddAssign<U>,
    {
        let mut integral = U::zero();
        for (w, p) in self.weights().iter().zip(self.points()) {
            integral += f(p) * *w;
        }
        integral
    }

    fn len(&self) -> usize {
        self.weights().len()
    }

    fn is_empty(&self) -> bool {
        self.weights().is_empty()
    }
}

impl<P, A, B> Quadrature<P> for (A, B)
where
    A: AsRef<[f64]>,
    B: AsRef<[P]>,
{
    fn weights(&self) -> &[f64] {
        self.0.as_ref()
    }

    fn points(&self) -> &[P] {
        self.1.as_ref()
    }
}

/// Number of Gauss points per dimension needed to integrate polynomials of the given degree.
pub fn gauss_points_for_degree(degree: usize) -> usize {
    (degree + 2) / 2
}

/// Standard rule for the reference hexahedron with the given number of points per dimension
/// (the integration order).
pub fn hexahedron_rule(order: usize) -> QuadraturePair3d {
    hexahedron_gauss(order.max(1))
}
