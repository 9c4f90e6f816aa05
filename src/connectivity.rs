use serde::{Deserialize, Serialize};

pub trait Connectivity: Clone {
    type FaceConnectivity: Connectivity;

    fn num_faces(&self) -> usize;
    fn get_face_connectivity(&self, index: usize) -> Option<Self::FaceConnectivity>;

    fn vertex_indices(&self) -> &[usize];
}

impl Connectivity for () {
    type FaceConnectivity = ();

    fn num_faces(&self) -> usize {
        0
    }

    fn get_face_connectivity(&self, _index: usize) -> Option<Self::FaceConnectivity> {
        None
    }

    fn vertex_indices(&self) -> &[usize] {
        const EMPTY_SLICE: &[usize] = &[];
        EMPTY_SLICE
    }
}

/// Local node indices of the six faces of a [`Hex8Connectivity`].
///
/// Faces are oriented so that their normals point towards the exterior of the element.
pub const HEX8_FACE_NODES: [[usize; 4]; 6] = [
    [3, 2, 1, 0],
    [0, 1, 5, 4],
    [1, 2, 6, 5],
    [2, 3, 7, 6],
    [4, 7, 3, 0],
    [5, 6, 7, 4],
];

/// Local node pairs of the twelve edges of a [`Hex8Connectivity`].
pub const HEX8_EDGE_NODES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

/// Connectivity for a trilinear hexahedron.
///
/// Nodes 0 to 3 span the bottom face `xi_3 = -1` counter-clockwise starting at `(-1, -1, -1)`,
/// nodes 4 to 7 repeat the pattern on the top face `xi_3 = 1`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hex8Connectivity(pub [usize; 8]);

impl Connectivity for Hex8Connectivity {
    type FaceConnectivity = Quad4d3Connectivity;

    fn num_faces(&self) -> usize {
        6
    }

    fn get_face_connectivity(&self, index: usize) -> Option<Self::FaceConnectivity> {
        let v = &self.0;
        HEX8_FACE_NODES
            .get(index)
            .map(|local| Quad4d3Connectivity(local.map(|i| v[i])))
    }

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }
}

impl Hex8Connectivity {
    /// Returns the local node index of the given global vertex, if it belongs to the element.
    pub fn local_index_of(&self, vertex: usize) -> Option<usize> {
        self.0.iter().position(|&v| v == vertex)
    }
}

/// Connectivity for a bilinear quadrilateral embedded in three dimensions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quad4d3Connectivity(pub [usize; 4]);

impl Connectivity for Quad4d3Connectivity {
    type FaceConnectivity = ();

    fn num_faces(&self) -> usize {
        0
    }

    fn get_face_connectivity(&self, _index: usize) -> Option<Self::FaceConnectivity> {
        None
    }

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }
}

impl Quad4d3Connectivity {
    /// Sorted vertex indices, identifying the face independently of orientation.
    pub fn sorted_key(&self) -> [usize; 4] {
        let mut key = self.0;
        key.sort_unstable();
        key
    }
}

/// Connectivity for a linear triangle embedded in three dimensions, used for cutter surfaces.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tri3d3Connectivity(pub [usize; 3]);

impl Connectivity for Tri3d3Connectivity {
    type FaceConnectivity = ();

    fn num_faces(&self) -> usize {
        0
    }

    fn get_face_connectivity(&self, _index: usize) -> Option<Self::FaceConnectivity> {
        None
    }

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }
}
