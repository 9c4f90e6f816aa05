//! Triangulated surfaces used as cutter meshes.
use crate::primitives::{winding_number, Triangle3d, TriangleFeature};
use crate::{AxisAlignedBoundingBox, BoundedGeometry};
use itertools::Itertools;
use nalgebra::{Point3, Vector3};
use ordered_float::OrderedFloat;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A triangulated surface with outward, counter-clockwise oriented triangles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangulatedSurface {
    vertices: Vec<Point3<f64>>,
    triangles: Vec<[usize; 3]>,
}

impl TriangulatedSurface {
    pub fn from_vertices_and_triangles(vertices: Vec<Point3<f64>>, triangles: Vec<[usize; 3]>) -> Self {
        assert!(
            triangles.iter().flatten().all(|&v| v < vertices.len()),
            "Triangle vertex index out of bounds"
        );
        Self { vertices, triangles }
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn triangle(&self, index: usize) -> Triangle3d<f64> {
        Triangle3d(self.triangles[index].map(|v| self.vertices[v]))
    }

    pub fn triangle_iter(&self) -> impl '_ + Iterator<Item = Triangle3d<f64>> {
        (0..self.triangles.len()).map(move |i| self.triangle(i))
    }

    /// Returns a copy with every vertex displaced by `displacement(vertex_index, x)`.
    pub fn displaced(&self, displacement: impl Fn(usize, &Point3<f64>) -> Vector3<f64>) -> Self {
        let vertices = self
            .vertices
            .iter()
            .enumerate()
            .map(|(i, x)| x + displacement(i, x))
            .collect();
        Self {
            vertices,
            triangles: self.triangles.clone(),
        }
    }

    pub fn total_area(&self) -> f64 {
        self.triangle_iter().map(|t| t.area()).sum()
    }

    /// Volume enclosed by a closed surface, by the divergence theorem.
    pub fn enclosed_volume(&self) -> f64 {
        self.triangle_iter()
            .map(|t| {
                let [a, b, c] = t.0;
                a.coords.dot(&b.coords.cross(&c.coords)) / 6.0
            })
            .sum()
    }

    /// Triangulated sphere obtained by subdividing an icosahedron.
    pub fn icosphere(center: Point3<f64>, radius: f64, subdivisions: usize) -> Self {
        let t = (1.0 + 5.0f64.sqrt()) / 2.0;
        let mut vertices: Vec<Vector3<f64>> = [
            [-1.0, t, 0.0],
            [1.0, t, 0.0],
            [-1.0, -t, 0.0],
            [1.0, -t, 0.0],
            [0.0, -1.0, t],
            [0.0, 1.0, t],
            [0.0, -1.0, -t],
            [0.0, 1.0, -t],
            [t, 0.0, -1.0],
            [t, 0.0, 1.0],
            [-t, 0.0, -1.0],
            [-t, 0.0, 1.0],
        ]
        .iter()
        .map(|v| Vector3::from(*v).normalize())
        .collect();

        #[rustfmt::skip]
        let mut triangles: Vec<[usize; 3]> = vec![
            [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
            [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
            [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
            [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
        ];

        for _ in 0..subdivisions {
            let mut midpoints = HashMap::new();
            let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Vector3<f64>>| {
                let key = (a.min(b), a.max(b));
                *midpoints.entry(key).or_insert_with(|| {
                    let m = ((vertices[a] + vertices[b]) * 0.5).normalize();
                    vertices.push(m);
                    vertices.len() - 1
                })
            };
            let mut refined = Vec::with_capacity(4 * triangles.len());
            for [a, b, c] in triangles {
                let ab = midpoint(a, b, &mut vertices);
                let bc = midpoint(b, c, &mut vertices);
                let ca = midpoint(c, a, &mut vertices);
                refined.extend_from_slice(&[[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
            }
            triangles = refined;
        }

        let vertices = vertices
            .into_iter()
            .map(|v| center + v * radius)
            .collect();
        Self { vertices, triangles }
    }

    /// Closed surface of an axis-aligned box, two triangles per face.
    pub fn from_box(aabb: &AxisAlignedBoundingBox<f64>) -> Self {
        let (min, max) = (aabb.min(), aabb.max());
        let vertices = (0..8)
            .map(|i| {
                Point3::new(
                    if i & 1 == 0 { min.x } else { max.x },
                    if i & 2 == 0 { min.y } else { max.y },
                    if i & 4 == 0 { min.z } else { max.z },
                )
            })
            .collect();
        #[rustfmt::skip]
        let quads = [
            [0, 2, 3, 1], // z = min
            [4, 5, 7, 6], // z = max
            [0, 1, 5, 4], // y = min
            [2, 6, 7, 3], // y = max
            [0, 4, 6, 2], // x = min
            [1, 3, 7, 5], // x = max
        ];
        let triangles = quads
            .iter()
            .flat_map(|[a, b, c, d]| [[*a, *b, *c], [*a, *c, *d]])
            .collect();
        Self { vertices, triangles }
    }
}

impl BoundedGeometry<f64> for TriangulatedSurface {
    fn bounding_box(&self) -> AxisAlignedBoundingBox<f64> {
        AxisAlignedBoundingBox::from_points(&self.vertices)
            .unwrap_or_else(|| AxisAlignedBoundingBox::new(Vector3::zeros(), Vector3::zeros()))
    }
}

#[derive(Debug, Clone)]
struct IndexedTriangle {
    index: usize,
    triangle: Triangle3d<f64>,
}

impl RTreeObject for IndexedTriangle {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        let aabb = self.triangle.bounding_box();
        AABB::from_corners((*aabb.min()).into(), (*aabb.max()).into())
    }
}

impl PointDistance for IndexedTriangle {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let p = Point3::from(*point);
        (self.triangle.closest_point(&p).0 - p).norm_squared()
    }
}

/// Result of a closest-point query against a [`SurfaceDistance`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SurfaceQuery {
    pub signed_distance: f64,
    pub triangle: usize,
    pub closest_point: Point3<f64>,
}

/// Signed distance to a closed triangulated surface, accelerated by an R-tree.
///
/// The sign is taken from the normal of the closest triangle when the closest point
/// lies in the triangle interior, and from the generalized winding number otherwise.
#[derive(Debug, Clone)]
pub struct SurfaceDistance {
    surface: TriangulatedSurface,
    tree: RTree<IndexedTriangle>,
}

impl SurfaceDistance {
    pub fn new(surface: TriangulatedSurface) -> Self {
        let objects = surface
            .triangle_iter()
            .enumerate()
            .map(|(index, triangle)| IndexedTriangle { index, triangle })
            .collect();
        let tree = RTree::bulk_load(objects);
        Self { surface, tree }
    }

    pub fn surface(&self) -> &TriangulatedSurface {
        &self.surface
    }

    pub fn query(&self, x: &Point3<f64>) -> Option<SurfaceQuery> {
        let nearest = self.tree.nearest_neighbor(&[x.x, x.y, x.z])?;
        let (closest_point, feature) = nearest.triangle.closest_point(x);
        let distance = (closest_point - x).norm();

        let inside = match feature {
            TriangleFeature::Face => nearest.triangle.normal_dir().dot(&(x - closest_point)) < 0.0,
            _ => winding_number(self.surface.triangle_iter(), x) > 0.5,
        };

        Some(SurfaceQuery {
            signed_distance: if inside { -distance } else { distance },
            triangle: nearest.index,
            closest_point,
        })
    }

    /// Indices of the triangles whose bounding boxes intersect `aabb`, sorted by distance
    /// from the box center to the triangle centroid.
    pub fn triangles_near(&self, aabb: &AxisAlignedBoundingBox<f64>) -> Vec<usize> {
        let envelope = AABB::from_corners((*aabb.min()).into(), (*aabb.max()).into());
        let center = aabb.center();
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|obj| (obj.index, OrderedFloat((obj.triangle.centroid() - center).norm())))
            .sorted_by_key(|(_, d)| *d)
            .map(|(index, _)| index)
            .collect()
    }
}
