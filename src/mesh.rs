use crate::connectivity::{Connectivity, Hex8Connectivity, Tri3d3Connectivity};
use crate::element::Hex8Element;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use xfluid_geometry::surface::TriangulatedSurface;
use xfluid_geometry::{AxisAlignedBoundingBox, BoundedGeometry};

mod faces;
mod locate;
pub mod procedural;

pub use faces::*;
pub use locate::*;

/// Index-based data structure for conforming three-dimensional meshes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh<Connectivity> {
    vertices: Vec<Point3<f64>>,
    connectivity: Vec<Connectivity>,
}

/// Background mesh of trilinear hexahedra.
pub type HexMesh = Mesh<Hex8Connectivity>;
/// Triangulated cutter surface.
pub type TriangleMesh3d = Mesh<Tri3d3Connectivity>;

impl<C> Mesh<C> {
    pub fn from_vertices_and_connectivity(vertices: Vec<Point3<f64>>, connectivity: Vec<C>) -> Self {
        Self { vertices, connectivity }
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    pub fn vertices_mut(&mut self) -> &mut [Point3<f64>] {
        &mut self.vertices
    }

    pub fn connectivity(&self) -> &[C] {
        &self.connectivity
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_cells(&self) -> usize {
        self.connectivity.len()
    }

    pub fn translate(&mut self, translation: &Vector3<f64>) {
        self.transform_vertices(|v| *v += translation);
    }

    pub fn transform_vertices<F>(&mut self, transformation: F)
    where
        F: FnMut(&mut Point3<f64>),
    {
        self.vertices.iter_mut().for_each(transformation)
    }
}

impl<C: Connectivity> Mesh<C> {
    /// Finds faces which are only connected to exactly one cell, along with the connected cell
    /// index and the local index of the face within that cell.
    pub fn find_boundary_faces(&self) -> Vec<(C::FaceConnectivity, usize, usize)> {
        // BTreeMap avoids the non-determinism of hashing for the output order
        let mut face_counts: BTreeMap<Vec<usize>, ((C::FaceConnectivity, usize, usize), usize)> = BTreeMap::new();
        for (cell_idx, cell_conn) in self.connectivity.iter().enumerate() {
            for local_idx in 0..cell_conn.num_faces() {
                if let Some(face_conn) = cell_conn.get_face_connectivity(local_idx) {
                    let mut key = face_conn.vertex_indices().to_vec();
                    key.sort_unstable();
                    face_counts
                        .entry(key)
                        .and_modify(|(_, count)| *count += 1)
                        .or_insert(((face_conn, cell_idx, local_idx), 1));
                }
            }
        }

        face_counts
            .into_values()
            .filter(|(_, count)| *count == 1)
            .map(|(info, _)| info)
            .collect()
    }

    /// Returns a sorted list of vertices that belong to a boundary face.
    pub fn find_boundary_vertices(&self) -> Vec<usize> {
        let mut indices = Vec::new();
        for (connectivity, _, _) in self.find_boundary_faces() {
            indices.extend(connectivity.vertex_indices());
        }
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// For each vertex, the cells it belongs to.
    pub fn vertex_cells(&self) -> Vec<Vec<usize>> {
        let mut cells = vec![Vec::new(); self.vertices.len()];
        for (cell_idx, conn) in self.connectivity.iter().enumerate() {
            for &v in conn.vertex_indices() {
                cells[v].push(cell_idx);
            }
        }
        cells
    }
}

impl HexMesh {
    /// The element with the given index, using the current vertex positions.
    pub fn element(&self, index: usize) -> Option<Hex8Element<f64>> {
        Hex8Element::from_connectivity(self.connectivity.get(index)?, &self.vertices)
    }

    /// The element with the given index, with vertices displaced by `displacement` per vertex.
    pub fn displaced_element(&self, index: usize, displacement: Option<&[Vector3<f64>]>) -> Option<Hex8Element<f64>> {
        let conn = self.connectivity.get(index)?;
        let mut vertices = [Point3::origin(); 8];
        for (v, &idx) in vertices.iter_mut().zip(&conn.0) {
            *v = *self.vertices.get(idx)?;
            if let Some(displacement) = displacement {
                *v += displacement.get(idx)?;
            }
        }
        Some(Hex8Element::from_vertices(vertices))
    }
}

impl TriangleMesh3d {
    pub fn to_surface(&self) -> TriangulatedSurface {
        TriangulatedSurface::from_vertices_and_triangles(
            self.vertices.clone(),
            self.connectivity.iter().map(|c| c.0).collect(),
        )
    }
}

impl<C> BoundedGeometry<f64> for Mesh<C> {
    fn bounding_box(&self) -> AxisAlignedBoundingBox<f64> {
        AxisAlignedBoundingBox::from_points(&self.vertices)
            .unwrap_or_else(|| AxisAlignedBoundingBox::new(Vector3::zeros(), Vector3::zeros()))
    }
}
