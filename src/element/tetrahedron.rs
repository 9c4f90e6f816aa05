use itertools::Itertools;
use numeric_literals::replace_float_literals;

use crate::element::FiniteElement;
use crate::nalgebra::{distance, Matrix3, Point3, SMatrix, Vector3};
use crate::Real;

/// Linear tetrahedron on the unit reference simplex `(0,0,0), (1,0,0), (0,1,0), (0,0,1)`.
///
/// Used for the sub-cells of cut elements, which live in the reference coordinates of
/// their background hexahedron.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tet4Element<T: Real> {
    vertices: [Point3<T>; 4],
}

impl<T: Real> Tet4Element<T> {
    pub fn from_vertices(vertices: [Point3<T>; 4]) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Point3<T>; 4] {
        &self.vertices
    }

    pub fn reference() -> Self {
        Self::from_vertices([
            Point3::origin(),
            Point3::from(Vector3::x()),
            Point3::from(Vector3::y()),
            Point3::from(Vector3::z()),
        ])
    }

    #[rustfmt::skip]
    pub fn evaluate_basis(&self, xi: &Point3<T>) -> SMatrix<T, 1, 4> {
        SMatrix::<T, 1, 4>::new(
            T::one() - xi.x - xi.y - xi.z,
            xi.x,
            xi.y,
            xi.z,
        )
    }

    #[rustfmt::skip]
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn gradients(&self, _xi: &Point3<T>) -> SMatrix<T, 3, 4> {
        SMatrix::<T, 3, 4>::new(
            -1.0, 1.0, 0.0, 0.0,
            -1.0, 0.0, 1.0, 0.0,
            -1.0, 0.0, 0.0, 1.0,
        )
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn volume(&self) -> T {
        self.reference_jacobian(&Point3::origin()).determinant().abs() / 6.0
    }
}

impl<T: Real> FiniteElement<T> for Tet4Element<T> {
    fn map_reference_coords(&self, xi: &Point3<T>) -> Point3<T> {
        let [a, b, c, d] = &self.vertices;
        a + (b - a) * xi.x + (c - a) * xi.y + (d - a) * xi.z
    }

    fn reference_jacobian(&self, _xi: &Point3<T>) -> Matrix3<T> {
        let [a, b, c, d] = &self.vertices;
        Matrix3::from_columns(&[b - a, c - a, d - a])
    }

    fn diameter(&self) -> T {
        self.vertices
            .iter()
            .tuple_combinations()
            .map(|(x, y)| distance(x, y))
            .fold(T::zero(), |a, b| a.max(b))
    }
}
