use crate::primitives::{Tetrahedron, Triangle3d};
use crate::Real;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Identifies a vertex produced by clipping.
///
/// Original vertices keep their key, cut points are identified by the (sorted) keys of
/// the edge they lie on. Cut points of neighbouring tetrahedra sharing an edge therefore
/// receive the same key and the same coordinates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClipVertexKey<K> {
    Vertex(K),
    Edge(K, K),
}

/// Side of the zero level set. Zero values belong to the positive side.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LevelSetSide {
    Negative,
    Positive,
}

impl LevelSetSide {
    pub fn of<T: Real>(phi: T) -> Self {
        if phi < T::zero() {
            Self::Negative
        } else {
            Self::Positive
        }
    }
}

/// Convex part of a tetrahedron on one side of the level set, given as a union of tetrahedra.
#[derive(Debug, Clone, PartialEq)]
pub struct ClippedPiece<T: Real, K> {
    pub side: LevelSetSide,
    pub vertices: Vec<(ClipVertexKey<K>, Point3<T>)>,
    pub tetrahedra: Vec<[usize; 4]>,
}

impl<T: Real, K> ClippedPiece<T, K> {
    pub fn tetrahedron(&self, index: usize) -> Tetrahedron<T> {
        Tetrahedron::from_vertices(self.tetrahedra[index].map(|v| self.vertices[v].1))
    }

    pub fn volume(&self) -> T {
        (0..self.tetrahedra.len())
            .map(|i| self.tetrahedron(i).volume())
            .fold(T::zero(), |acc, v| acc + v)
    }
}

/// Intersection of the zero level set with a tetrahedron, triangulated.
///
/// Triangles are oriented so that their normals point from the negative towards the
/// positive side.
#[derive(Debug, Clone, PartialEq)]
pub struct IsoPolygon<T: Real, K> {
    pub vertices: Vec<(ClipVertexKey<K>, Point3<T>)>,
    pub triangles: Vec<[usize; 3]>,
}

impl<T: Real, K> IsoPolygon<T, K> {
    pub fn triangle(&self, index: usize) -> Triangle3d<T> {
        Triangle3d(self.triangles[index].map(|v| self.vertices[v].1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TetrahedronClip<T: Real, K> {
    pub pieces: Vec<ClippedPiece<T, K>>,
    pub iso_polygon: Option<IsoPolygon<T, K>>,
}

/// Local vertex quadruples splitting a prism `(0, 1, 2)-(3, 4, 5)` with lateral
/// edges `0-3`, `1-4`, `2-5` into tetrahedra.
const PRISM_TETRAHEDRA: [[usize; 4]; 3] = [[0, 1, 2, 3], [1, 2, 3, 4], [2, 3, 4, 5]];

/// Clips a tetrahedron by the linear interpolant of the vertex values `phi`.
pub fn clip_tetrahedron<T, K>(vertices: &[Point3<T>; 4], keys: &[K; 4], phi: &[T; 4]) -> TetrahedronClip<T, K>
where
    T: Real,
    K: Copy + Ord,
{
    let sides = phi.map(LevelSetSide::of);
    let negative: Vec<usize> = (0..4)
        .filter(|&i| sides[i] == LevelSetSide::Negative)
        .collect();
    let positive: Vec<usize> = (0..4)
        .filter(|&i| sides[i] == LevelSetSide::Positive)
        .collect();

    let vertex = |i: usize| (ClipVertexKey::Vertex(keys[i]), vertices[i]);
    let edge_point = |i: usize, j: usize| {
        // Evaluate with endpoints in key order so that shared edges give bitwise equal points
        let (i, j) = if keys[i] <= keys[j] { (i, j) } else { (j, i) };
        let t = phi[i] / (phi[i] - phi[j]);
        let p = vertices[i] + (vertices[j] - vertices[i]) * t;
        (ClipVertexKey::Edge(keys[i], keys[j]), p)
    };

    if negative.is_empty() || positive.is_empty() {
        let piece = ClippedPiece {
            side: sides[0],
            vertices: (0..4).map(vertex).collect(),
            tetrahedra: vec![[0, 1, 2, 3]],
        };
        return TetrahedronClip {
            pieces: vec![piece],
            iso_polygon: None,
        };
    }

    let (pieces, iso_vertices, iso_triangles) = match (negative.len(), positive.len()) {
        (1, 3) | (3, 1) => {
            let (lone, rest, lone_side, rest_side) = if negative.len() == 1 {
                (negative[0], &positive, LevelSetSide::Negative, LevelSetSide::Positive)
            } else {
                (positive[0], &negative, LevelSetSide::Positive, LevelSetSide::Negative)
            };
            let cuts: Vec<_> = rest.iter().map(|&j| edge_point(lone, j)).collect();

            let mut lone_vertices = vec![vertex(lone)];
            lone_vertices.extend(cuts.iter().copied());
            let lone_piece = ClippedPiece {
                side: lone_side,
                vertices: lone_vertices,
                tetrahedra: vec![[0, 1, 2, 3]],
            };

            let mut prism_vertices = cuts.clone();
            prism_vertices.extend(rest.iter().map(|&j| vertex(j)));
            let prism_piece = ClippedPiece {
                side: rest_side,
                vertices: prism_vertices,
                tetrahedra: PRISM_TETRAHEDRA.to_vec(),
            };
            (vec![lone_piece, prism_piece], cuts, vec![[0, 1, 2]])
        }
        (2, 2) => {
            let (a, b) = (negative[0], negative[1]);
            let (c, d) = (positive[0], positive[1]);
            let (p_ac, p_ad, p_bc, p_bd) = (edge_point(a, c), edge_point(a, d), edge_point(b, c), edge_point(b, d));

            let negative_piece = ClippedPiece {
                side: LevelSetSide::Negative,
                vertices: vec![vertex(a), p_ac, p_ad, vertex(b), p_bc, p_bd],
                tetrahedra: PRISM_TETRAHEDRA.to_vec(),
            };
            let positive_piece = ClippedPiece {
                side: LevelSetSide::Positive,
                vertices: vec![vertex(c), p_ac, p_bc, vertex(d), p_ad, p_bd],
                tetrahedra: PRISM_TETRAHEDRA.to_vec(),
            };
            (
                vec![negative_piece, positive_piece],
                vec![p_ac, p_ad, p_bd, p_bc],
                vec![[0, 1, 2], [0, 2, 3]],
            )
        }
        _ => unreachable!("Both sides are non-empty and there are four vertices"),
    };

    // Orient iso triangles from the negative to the positive side
    let reference_positive = vertices[positive[0]];
    let triangles = iso_triangles
        .into_iter()
        .map(|[i, j, k]| {
            let triangle = Triangle3d([iso_vertices[i].1, iso_vertices[j].1, iso_vertices[k].1]);
            let towards_positive = reference_positive - triangle.centroid();
            if triangle.normal_dir().dot(&towards_positive) >= T::zero() {
                [i, j, k]
            } else {
                [i, k, j]
            }
        })
        .collect();

    TetrahedronClip {
        pieces,
        iso_polygon: Some(IsoPolygon {
            vertices: iso_vertices,
            triangles,
        }),
    }
}

/// Splits the unit cube with corners numbered `i + 2j + 4k` into six tetrahedra along the
/// main diagonal `0-7` (Kuhn triangulation).
///
/// Cubes triangulated this way are conforming with their axis-aligned neighbours.
pub fn kuhn_tetrahedra() -> [[usize; 4]; 6] {
    let permutations = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    permutations.map(|[a, b, c]| {
        let v1 = 1 << a;
        let v2 = v1 | (1 << b);
        let v3 = v2 | (1 << c);
        [0, v1, v2, v3]
    })
}
