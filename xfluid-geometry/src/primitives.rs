use crate::{AxisAlignedBoundingBox, BoundedGeometry, Real};
use nalgebra::{Matrix3, Point3, Scalar, Vector3};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "Point3<T>: Serialize"))]
#[serde(bound(deserialize = "Point3<T>: Deserialize<'de>"))]
pub struct Tetrahedron<T>
where
    T: Scalar,
{
    vertices: [Point3<T>; 4],
}

impl<T> Tetrahedron<T>
where
    T: Scalar,
{
    pub fn from_vertices(vertices: [Point3<T>; 4]) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Point3<T>; 4] {
        &self.vertices
    }
}

impl<T> Tetrahedron<T>
where
    T: Real,
{
    /// Jacobian of the affine map from the unit reference tetrahedron
    /// `(0,0,0), (1,0,0), (0,1,0), (0,0,1)`.
    pub fn affine_jacobian(&self) -> Matrix3<T> {
        let [a, b, c, d] = &self.vertices;
        Matrix3::from_columns(&[b - a, c - a, d - a])
    }

    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn signed_volume(&self) -> T {
        self.affine_jacobian().determinant() / 6.0
    }

    pub fn volume(&self) -> T {
        self.signed_volume().abs()
    }

    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn centroid(&self) -> Point3<T> {
        let sum = self.vertices.iter().fold(Vector3::zeros(), |acc, v| acc + v.coords);
        Point3::from(sum * 0.25)
    }

    /// Maps a point given in unit reference coordinates to physical space.
    pub fn map_reference_point(&self, xi: &Point3<T>) -> Point3<T> {
        self.vertices[0] + self.affine_jacobian() * xi.coords
    }

    /// Barycentric coordinates of `point` with respect to the vertices.
    ///
    /// Returns `None` for degenerate tetrahedra.
    pub fn barycentric_coordinates(&self, point: &Point3<T>) -> Option<[T; 4]> {
        let jacobian_inv = self.affine_jacobian().try_inverse()?;
        let xi = jacobian_inv * (point - self.vertices[0]);
        Some([T::one() - xi.x - xi.y - xi.z, xi.x, xi.y, xi.z])
    }
}

impl<T: Real> BoundedGeometry<T> for Tetrahedron<T> {
    fn bounding_box(&self) -> AxisAlignedBoundingBox<T> {
        AxisAlignedBoundingBox::from_points(&self.vertices).expect("A tetrahedron has four vertices")
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "Point3<T>: Serialize"))]
#[serde(bound(deserialize = "Point3<T>: Deserialize<'de>"))]
pub struct Triangle3d<T: Scalar>(pub [Point3<T>; 3]);

/// The feature of a triangle that realizes the closest point to a query point.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TriangleFeature {
    Vertex(usize),
    /// Edge between local vertices `i` and `(i + 1) % 3`.
    Edge(usize),
    Face,
}

impl<T> Triangle3d<T>
where
    T: Real,
{
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn centroid(&self) -> Point3<T> {
        let [a, b, c] = &self.0;
        Point3::from((a.coords + b.coords + c.coords) / 3.0)
    }

    /// Unnormalized normal, with length equal to twice the area.
    pub fn normal_dir(&self) -> Vector3<T> {
        let [a, b, c] = &self.0;
        (b - a).cross(&(c - a))
    }

    /// Unit normal following the counter-clockwise vertex orientation.
    pub fn normal(&self) -> Vector3<T> {
        self.normal_dir().normalize()
    }

    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn area(&self) -> T {
        0.5 * self.normal_dir().norm()
    }

    /// Closest point on the triangle to `p`, together with the feature it lies on.
    ///
    /// Follows the Voronoi region classification of Ericson, "Real-Time Collision Detection".
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn closest_point(&self, p: &Point3<T>) -> (Point3<T>, TriangleFeature) {
        use TriangleFeature::*;
        let [a, b, c] = self.0;
        let ab = b - a;
        let ac = c - a;
        let ap = p - a;
        let d1 = ab.dot(&ap);
        let d2 = ac.dot(&ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return (a, Vertex(0));
        }

        let bp = p - b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);
        if d3 >= 0.0 && d4 <= d3 {
            return (b, Vertex(1));
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return (a + ab * v, Edge(0));
        }

        let cp = p - c;
        let d5 = ab.dot(&cp);
        let d6 = ac.dot(&cp);
        if d6 >= 0.0 && d5 <= d6 {
            return (c, Vertex(2));
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return (a + ac * w, Edge(2));
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return (b + (c - b) * w, Edge(1));
        }

        let denom = 1.0 / (va + vb + vc);
        let v = vb * denom;
        let w = vc * denom;
        (a + ab * v + ac * w, Face)
    }

    pub fn distance(&self, p: &Point3<T>) -> T {
        (self.closest_point(p).0 - p).norm()
    }

    /// Signed solid angle subtended by the triangle at `p`.
    ///
    /// Based on equation (6) in Jacobson et al., "Robust Inside-Outside Segmentation
    /// using Generalized Winding Numbers".
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn solid_angle(&self, p: &Point3<T>) -> T {
        let [a, b, c] = self.0.map(|v_i| v_i - p);
        let abc = Matrix3::from_columns(&[a, b, c]);
        let (anorm, bnorm, cnorm) = (a.norm(), b.norm(), c.norm());
        let denominator = anorm * bnorm * cnorm + a.dot(&b) * cnorm + b.dot(&c) * anorm + c.dot(&a) * bnorm;
        2.0 * abc.determinant().atan2(denominator)
    }
}

impl<T: Real> BoundedGeometry<T> for Triangle3d<T> {
    fn bounding_box(&self) -> AxisAlignedBoundingBox<T> {
        AxisAlignedBoundingBox::from_points(&self.0).expect("A triangle has three vertices")
    }
}

/// Generalized winding number of a collection of triangles at `point`.
///
/// Close to 1 inside a closed, outward oriented surface and close to 0 outside.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn winding_number<T, I>(triangles: I, point: &Point3<T>) -> T
where
    T: Real,
    I: IntoIterator<Item = Triangle3d<T>>,
{
    let angle_sum = triangles
        .into_iter()
        .map(|triangle| triangle.solid_angle(point))
        .fold(T::zero(), |acc, angle| acc + angle);
    angle_sum / (4.0 * T::pi())
}
