use crate::connectivity::{Connectivity, Quad4d3Connectivity};
use crate::mesh::HexMesh;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A face shared by two background elements.
///
/// The master element is the one with the smaller index; the face normal of the master's
/// local face points into the slave element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteriorFace {
    pub master: usize,
    pub master_face: usize,
    pub slave: usize,
    pub slave_face: usize,
    pub nodes: Quad4d3Connectivity,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryFace {
    pub element: usize,
    pub local_face: usize,
    pub nodes: Quad4d3Connectivity,
}

/// Face tables of a hexahedral background mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshFaces {
    interior: Vec<InteriorFace>,
    boundary: Vec<BoundaryFace>,
    element_interior_faces: Vec<Vec<usize>>,
}

impl MeshFaces {
    pub fn from_mesh(mesh: &HexMesh) -> Self {
        let mut first_owner: FxHashMap<[usize; 4], (usize, usize, Quad4d3Connectivity)> = FxHashMap::default();
        let mut interior = Vec::new();

        for (element, conn) in mesh.connectivity().iter().enumerate() {
            for local_face in 0..conn.num_faces() {
                let Some(nodes) = conn.get_face_connectivity(local_face) else {
                    continue;
                };
                let key = nodes.sorted_key();
                if let Some((master, master_face, master_nodes)) = first_owner.remove(&key) {
                    interior.push(InteriorFace {
                        master,
                        master_face,
                        slave: element,
                        slave_face: local_face,
                        nodes: master_nodes,
                    });
                } else {
                    first_owner.insert(key, (element, local_face, nodes));
                }
            }
        }

        let mut boundary: Vec<_> = first_owner
            .into_values()
            .map(|(element, local_face, nodes)| BoundaryFace {
                element,
                local_face,
                nodes,
            })
            .collect();
        boundary.sort_unstable_by_key(|face| (face.element, face.local_face));
        interior.sort_unstable_by_key(|face| (face.master, face.master_face));

        let mut element_interior_faces = vec![Vec::new(); mesh.num_cells()];
        for (idx, face) in interior.iter().enumerate() {
            element_interior_faces[face.master].push(idx);
            element_interior_faces[face.slave].push(idx);
        }

        Self {
            interior,
            boundary,
            element_interior_faces,
        }
    }

    pub fn interior(&self) -> &[InteriorFace] {
        &self.interior
    }

    pub fn boundary(&self) -> &[BoundaryFace] {
        &self.boundary
    }

    /// Indices into [`Self::interior`] of the faces of the given element.
    pub fn element_interior_faces(&self, element: usize) -> &[usize] {
        &self.element_interior_faces[element]
    }
}
