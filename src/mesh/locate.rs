use crate::element::{map_physical_coordinates, FiniteElement, NewtonSettings};
use crate::mesh::HexMesh;
use nalgebra::{Point3, Vector3};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use xfluid_geometry::AxisAlignedBoundingBox;

type ElementBox = GeomWithData<Rectangle<[f64; 3]>, usize>;

/// Reference coordinates are accepted as inside an element up to this slack.
pub const REFERENCE_INSIDE_TOLERANCE: f64 = 1e-8;

/// Locates points in a hexahedral mesh using an R-tree of element bounding boxes and a
/// Newton inversion of the trilinear map.
#[derive(Debug, Clone)]
pub struct PointLocator {
    tree: RTree<ElementBox>,
    vertices: Vec<Point3<f64>>,
    connectivity: Vec<[usize; 8]>,
}

impl PointLocator {
    pub fn new(mesh: &HexMesh) -> Self {
        Self::with_displacement(mesh, None)
    }

    /// Builds the locator for the mesh with vertices displaced by `displacement`.
    pub fn with_displacement(mesh: &HexMesh, displacement: Option<&[Vector3<f64>]>) -> Self {
        let vertices: Vec<_> = match displacement {
            Some(d) => mesh
                .vertices()
                .iter()
                .zip(d)
                .map(|(x, u)| x + u)
                .collect(),
            None => mesh.vertices().to_vec(),
        };
        let connectivity: Vec<_> = mesh.connectivity().iter().map(|c| c.0).collect();
        let boxes = connectivity
            .iter()
            .enumerate()
            .filter_map(|(idx, conn)| {
                let aabb = AxisAlignedBoundingBox::from_points(conn.iter().map(|&v| &vertices[v]))?;
                let aabb = aabb.grow_uniformly(1e-10 * aabb.max_extent());
                let rect = Rectangle::from_corners((*aabb.min()).into(), (*aabb.max()).into());
                Some(GeomWithData::new(rect, idx))
            })
            .collect();
        Self {
            tree: RTree::bulk_load(boxes),
            vertices,
            connectivity,
        }
    }

    fn element(&self, index: usize) -> crate::element::Hex8Element<f64> {
        crate::element::Hex8Element::from_vertices(self.connectivity[index].map(|v| self.vertices[v]))
    }

    /// Finds an element containing `x` and the reference coordinates of `x` in it.
    ///
    /// Among several candidates the element with the smallest reference coordinate
    /// violation is returned, with ties broken by element index.
    pub fn locate_point(&self, x: &Point3<f64>) -> Option<(usize, Point3<f64>)> {
        let mut candidates: Vec<usize> = self
            .tree
            .locate_all_at_point(&[x.x, x.y, x.z])
            .map(|entry| entry.data)
            .collect();
        candidates.sort_unstable();

        let mut best: Option<(usize, Point3<f64>, f64)> = None;
        for element_idx in candidates {
            let element = self.element(element_idx);
            let settings = NewtonSettings {
                max_iterations: 20,
                tolerance: 1e-12 * element.diameter(),
            };
            let Ok(xi) = map_physical_coordinates(&element, x, settings) else {
                continue;
            };
            let violation = xi.coords.amax();
            if violation <= 1.0 + REFERENCE_INSIDE_TOLERANCE && best.map_or(true, |(_, _, v)| violation < v) {
                best = Some((element_idx, xi, violation));
            }
        }
        best.map(|(element, xi, _)| (element, xi))
    }
}
