use numeric_literals::replace_float_literals;

use crate::element::{phi_linear_1d, phi_linear_1d_grad};
use crate::nalgebra::{Point2, Point3, SMatrix, Vector2, Vector3};
use crate::Real;

/// Bilinear quadrilateral embedded in three dimensions, on the reference domain `[-1, 1]^2`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Quad4d3Element<T: Real> {
    vertices: [Point3<T>; 4],
}

impl<T: Real> Quad4d3Element<T> {
    pub fn from_vertices(vertices: [Point3<T>; 4]) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Point3<T>; 4] {
        &self.vertices
    }

    #[rustfmt::skip]
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn evaluate_basis(&self, st: &Point2<T>) -> SMatrix<T, 1, 4> {
        let phi = |alpha, beta| phi_linear_1d(alpha, st[0]) * phi_linear_1d(beta, st[1]);
        SMatrix::<T, 1, 4>::new(
            phi(-1.0, -1.0),
            phi( 1.0, -1.0),
            phi( 1.0,  1.0),
            phi(-1.0,  1.0),
        )
    }

    #[rustfmt::skip]
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn gradients(&self, st: &Point2<T>) -> SMatrix<T, 2, 4> {
        let grad = |alpha, beta| Vector2::new(
            phi_linear_1d_grad(alpha) * phi_linear_1d(beta, st[1]),
            phi_linear_1d(alpha, st[0]) * phi_linear_1d_grad(beta),
        );
        SMatrix::<T, 2, 4>::from_columns(&[
            grad(-1.0, -1.0),
            grad( 1.0, -1.0),
            grad( 1.0,  1.0),
            grad(-1.0,  1.0),
        ])
    }

    #[allow(non_snake_case)]
    pub fn map_reference_coords(&self, st: &Point2<T>) -> Point3<T> {
        let X = SMatrix::<T, 3, 4>::from_fn(|i, j| self.vertices[j][i]);
        Point3::from(X * self.evaluate_basis(st).transpose())
    }

    /// Tangent vectors `dx/ds` and `dx/dt` as columns.
    #[allow(non_snake_case)]
    pub fn reference_jacobian(&self, st: &Point2<T>) -> SMatrix<T, 3, 2> {
        let X = SMatrix::<T, 3, 4>::from_fn(|i, j| self.vertices[j][i]);
        X * self.gradients(st).transpose()
    }

    /// Unnormalized normal whose length is the surface area element at `st`.
    pub fn area_normal(&self, st: &Point2<T>) -> Vector3<T> {
        let jacobian = self.reference_jacobian(st);
        let ds: Vector3<T> = jacobian.column(0).into_owned();
        let dt: Vector3<T> = jacobian.column(1).into_owned();
        ds.cross(&dt)
    }

    /// Unit normal following the counter-clockwise vertex orientation.
    pub fn normal(&self, st: &Point2<T>) -> Vector3<T> {
        self.area_normal(st).normalize()
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn centroid(&self) -> Point3<T> {
        self.map_reference_coords(&Point2::new(0.0, 0.0))
    }
}
