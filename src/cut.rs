//! Partitioning of background elements by the zero level set of the interfaces.
//!
//! Every hexahedron is sampled on a uniform grid of sub-hexahedra in reference coordinates.
//! Each sub-hexahedron is split into six tetrahedra which are clipped by the linear
//! interpolant of the sampled level set. Clipped pieces on the same side that share a face
//! are merged into volume cells, and the iso-surface triangles become boundary cells.
//!
//! Cells are stored in flat arenas owned by [`CutWizard`] and addressed by
//! [`VolumeCellIdx`] and [`BoundaryCellIdx`].
use crate::config::CutParameters;
use crate::element::{FiniteElement, Hex8Element};
use crate::error::XFluidError;
use crate::mesh::HexMesh;
use crate::nalgebra::{Point3, Vector3};
use crate::quadrature::{tetrahedron as tetrahedron_rule, triangle as triangle_rule, QuadraturePair3d};
use crate::util::UnionFind;
use itertools::iproduct;
use log::debug;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use xfluid_geometry::{clip_tetrahedron, kuhn_tetrahedra, ClipVertexKey, LevelSetSide, Tetrahedron, Triangle3d};

/// Position of a point or cell relative to the interfaces.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    Inside,
    Outside,
    OnCutSurface,
}

impl Position {
    /// Position corresponding to a level-set value. Zero counts as outside.
    pub fn from_phi(phi: f64) -> Self {
        match LevelSetSide::of(phi) {
            LevelSetSide::Negative => Self::Inside,
            LevelSetSide::Positive => Self::Outside,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inside => write!(f, "inside"),
            Self::Outside => write!(f, "outside"),
            Self::OnCutSurface => write!(f, "on-cut-surface"),
        }
    }
}

/// Value of the combined level set at a point, together with the closest interface side.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CutterSample {
    pub phi: f64,
    /// Global side id.
    pub side: usize,
    pub coupling: usize,
}

/// Evaluates the combined level set of all cutting interfaces.
pub trait LevelSetSampler: Sync {
    fn sample(&self, x: &Point3<f64>) -> CutterSample;
}

impl<F> LevelSetSampler for F
where
    F: Fn(&Point3<f64>) -> CutterSample + Sync,
{
    fn sample(&self, x: &Point3<f64>) -> CutterSample {
        self(x)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolumeCellIdx(pub usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoundaryCellIdx(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeCell {
    pub element: usize,
    pub position: Position,
    /// Local indices of the element nodes lying in this cell.
    pub nodes: Vec<usize>,
    /// Tetrahedral decomposition in element reference coordinates.
    pub tetrahedra: Vec<Tetrahedron<f64>>,
    /// Quadrature in element reference coordinates, weights in reference measure.
    pub quadrature: QuadraturePair3d,
    pub boundary_cells: Vec<BoundaryCellIdx>,
}

impl VolumeCell {
    /// Volume of the cell in reference coordinates.
    pub fn reference_volume(&self) -> f64 {
        self.quadrature.0.iter().sum()
    }

    pub fn contains_node(&self, local_node: usize) -> bool {
        self.nodes.contains(&local_node)
    }

    /// Whether the reference point lies in one of the tetrahedra of the cell.
    pub fn contains_reference_point(&self, xi: &Point3<f64>, tolerance: f64) -> bool {
        self.tetrahedra.iter().any(|tet| {
            tet.barycentric_coordinates(xi)
                .map(|lambda| lambda.iter().all(|&l| l >= -tolerance))
                .unwrap_or(false)
        })
    }
}

/// A triangle of the interface inside a background element.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryCell {
    pub element: usize,
    /// Global side id of the interface the cell lies on.
    pub side: usize,
    pub coupling: usize,
    /// The volume cell on the positive (fluid) side, which owns the boundary cell.
    pub outside: VolumeCellIdx,
    /// The volume cell on the negative side.
    pub inside: VolumeCellIdx,
    pub vertices: [Point3<f64>; 3],
    pub reference_vertices: [Point3<f64>; 3],
    /// Unit normal pointing out of the outside volume cell.
    pub normal: Vector3<f64>,
    pub area: f64,
    /// Physical quadrature weights.
    pub weights: Vec<f64>,
    pub points: Vec<Point3<f64>>,
    /// Quadrature points in element reference coordinates.
    pub reference_points: Vec<Point3<f64>>,
}

impl BoundaryCell {
    pub fn triangle(&self) -> Triangle3d<f64> {
        Triangle3d(self.vertices)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CutElementHandle {
    pub volume_cells: Vec<VolumeCellIdx>,
    /// `false` if a single volume cell covers the element, in which case the element is
    /// integrated with the standard rule.
    pub has_xfem_integration_rule: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementCut {
    Uncut(Position),
    Cut(CutElementHandle),
}

/// Result of cutting the background mesh.
#[derive(Debug, Clone)]
pub struct CutWizard {
    elements: Vec<ElementCut>,
    volume_cells: Vec<VolumeCell>,
    boundary_cells: Vec<BoundaryCell>,
    node_phi: Vec<f64>,
    node_positions: Vec<Position>,
    node_coordinates: Vec<Point3<f64>>,
}

/// Relative area below which iso-triangles are discarded.
const MIN_RELATIVE_AREA: f64 = 1e-14;

/// Exact volume of the reference hexahedron.
const REFERENCE_VOLUME: f64 = 8.0;

/// Cut cells of one element before they are moved into the arenas.
struct LocalCut {
    cells: Vec<VolumeCell>,
    boundary_cells: Vec<BoundaryCell>,
    has_xfem_integration_rule: bool,
}

enum LocalResult {
    Uncut(Position),
    Cut(LocalCut),
}

struct Piece {
    side: LevelSetSide,
    keys: Vec<ClipVertexKey<usize>>,
    tetrahedra: Vec<Tetrahedron<f64>>,
}

struct IsoTriangle {
    reference: [Point3<f64>; 3],
    positive_piece: usize,
    negative_piece: usize,
}

impl CutWizard {
    /// A wizard for a mesh without interfaces: every element and node is outside.
    pub fn uncut(mesh: &HexMesh, displacement: Option<&[Vector3<f64>]>) -> Self {
        Self {
            elements: vec![ElementCut::Uncut(Position::Outside); mesh.num_cells()],
            volume_cells: Vec::new(),
            boundary_cells: Vec::new(),
            node_phi: vec![f64::INFINITY; mesh.num_vertices()],
            node_positions: vec![Position::Outside; mesh.num_vertices()],
            node_coordinates: node_coordinates(mesh, displacement),
        }
    }

    /// Cuts every element of the (optionally displaced) mesh by the zero level set of `sampler`.
    pub fn cut(
        mesh: &HexMesh,
        displacement: Option<&[Vector3<f64>]>,
        sampler: &dyn LevelSetSampler,
        params: &CutParameters,
    ) -> Result<Self, XFluidError> {
        let node_coordinates = node_coordinates(mesh, displacement);
        let elements: Vec<Hex8Element<f64>> = (0..mesh.num_cells())
            .map(|e| {
                mesh.displaced_element(e, displacement).ok_or_else(|| XFluidError::CutFailed {
                    element: e,
                    reason: "connectivity refers to a missing vertex".into(),
                })
            })
            .collect::<Result<_, _>>()?;

        let h_max = elements
            .iter()
            .map(|element| element.volume_equivalent_length())
            .fold(0.0, f64::max);
        let snap = params.cut_tolerance * h_max;

        let node_phi: Vec<f64> = node_coordinates
            .par_iter()
            .map(|x| snap_level_set(sampler.sample(x).phi, snap))
            .collect();

        let results: Vec<LocalResult> = elements
            .par_iter()
            .enumerate()
            .map(|(e, element)| {
                let nodes = &mesh.connectivity()[e].0;
                check_jacobian(e, element)?;
                let corner_phi = nodes.map(|n| node_phi[n]);
                let mut result = cut_element(e, element, &corner_phi, sampler, params, params.refinement, snap);
                if result.is_err() && params.fallback {
                    debug!("Retrying cut of element {e} with refinement {}", params.refinement + 1);
                    result = cut_element(e, element, &corner_phi, sampler, params, params.refinement + 1, snap);
                }
                result
            })
            .collect::<Result<_, _>>()?;

        let mut wizard = Self {
            elements: Vec::with_capacity(results.len()),
            volume_cells: Vec::new(),
            boundary_cells: Vec::new(),
            node_positions: node_phi.iter().map(|&phi| Position::from_phi(phi)).collect(),
            node_phi,
            node_coordinates,
        };
        for result in results {
            match result {
                LocalResult::Uncut(position) => wizard.elements.push(ElementCut::Uncut(position)),
                LocalResult::Cut(local) => {
                    let handle = wizard.insert(local);
                    wizard.elements.push(ElementCut::Cut(handle));
                }
            }
        }

        debug!(
            "Cut {} of {} elements into {} volume cells and {} boundary cells",
            wizard.num_cut_elements(),
            wizard.elements.len(),
            wizard.volume_cells.len(),
            wizard.boundary_cells.len()
        );
        Ok(wizard)
    }

    /// Moves the cells of one element into the arenas, rewriting local indices.
    fn insert(&mut self, local: LocalCut) -> CutElementHandle {
        let vc_offset = self.volume_cells.len();
        let bc_offset = self.boundary_cells.len();
        let volume_cells = (0..local.cells.len()).map(|i| VolumeCellIdx(vc_offset + i)).collect();
        for mut cell in local.cells {
            for bc in &mut cell.boundary_cells {
                bc.0 += bc_offset;
            }
            self.volume_cells.push(cell);
        }
        for mut bc in local.boundary_cells {
            bc.outside.0 += vc_offset;
            bc.inside.0 += vc_offset;
            self.boundary_cells.push(bc);
        }
        CutElementHandle {
            volume_cells,
            has_xfem_integration_rule: local.has_xfem_integration_rule,
        }
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.node_positions.len()
    }

    pub fn num_cut_elements(&self) -> usize {
        self.elements
            .iter()
            .filter(|e| matches!(e, ElementCut::Cut(_)))
            .count()
    }

    pub fn element(&self, element: usize) -> &ElementCut {
        &self.elements[element]
    }

    pub fn is_cut(&self, element: usize) -> bool {
        matches!(self.elements[element], ElementCut::Cut(_))
    }

    pub fn volume_cell(&self, idx: VolumeCellIdx) -> &VolumeCell {
        &self.volume_cells[idx.0]
    }

    pub fn boundary_cell(&self, idx: BoundaryCellIdx) -> &BoundaryCell {
        &self.boundary_cells[idx.0]
    }

    pub fn volume_cells(&self) -> &[VolumeCell] {
        &self.volume_cells
    }

    pub fn boundary_cells(&self) -> &[BoundaryCell] {
        &self.boundary_cells
    }

    /// Volume cells of a cut element, empty for uncut elements.
    pub fn element_volume_cells(&self, element: usize) -> &[VolumeCellIdx] {
        match &self.elements[element] {
            ElementCut::Cut(handle) => &handle.volume_cells,
            ElementCut::Uncut(_) => &[],
        }
    }

    /// All boundary cells of an element.
    pub fn element_boundary_cells(&self, element: usize) -> impl '_ + Iterator<Item = BoundaryCellIdx> {
        self.element_volume_cells(element)
            .iter()
            .flat_map(move |&vc| self.volume_cells[vc.0].boundary_cells.iter().copied())
    }

    pub fn node_phi(&self, node: usize) -> f64 {
        self.node_phi[node]
    }

    pub fn node_position(&self, node: usize) -> Position {
        self.node_positions[node]
    }

    pub fn node_positions(&self) -> &[Position] {
        &self.node_positions
    }

    /// Node coordinates the cut was computed with.
    pub fn node_coordinates(&self) -> &[Point3<f64>] {
        &self.node_coordinates
    }

    /// Volume cell of a cut element containing the reference point.
    pub fn volume_cell_at(&self, element: usize, xi: &Point3<f64>) -> Option<VolumeCellIdx> {
        const TOLERANCE: f64 = 1e-10;
        let cells = self.element_volume_cells(element);
        cells
            .iter()
            .copied()
            .find(|&vc| self.volume_cells[vc.0].contains_reference_point(xi, TOLERANCE))
    }

    /// Position of a reference point of an element.
    pub fn position_at(&self, element: usize, xi: &Point3<f64>) -> Option<Position> {
        match &self.elements[element] {
            ElementCut::Uncut(position) => Some(*position),
            ElementCut::Cut(_) => self
                .volume_cell_at(element, xi)
                .map(|vc| self.volume_cells[vc.0].position),
        }
    }

    /// Distance from a physical point to the closest boundary cell of the element.
    pub fn distance_to_interface(&self, element: usize, x: &Point3<f64>) -> Option<f64> {
        self.element_boundary_cells(element)
            .map(|bc| self.boundary_cells[bc.0].triangle().distance(x))
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Whether both wizards classify every element and node identically and produce the
    /// same number of cells per element.
    pub fn same_topology(&self, other: &CutWizard) -> bool {
        self.node_positions == other.node_positions
            && self.elements.len() == other.elements.len()
            && self.elements.iter().zip(&other.elements).all(|(a, b)| match (a, b) {
                (ElementCut::Uncut(p), ElementCut::Uncut(q)) => p == q,
                (ElementCut::Cut(a), ElementCut::Cut(b)) => a.volume_cells.len() == b.volume_cells.len(),
                _ => false,
            })
    }
}

fn node_coordinates(mesh: &HexMesh, displacement: Option<&[Vector3<f64>]>) -> Vec<Point3<f64>> {
    match displacement {
        Some(d) => mesh.vertices().iter().zip(d).map(|(x, u)| x + u).collect(),
        None => mesh.vertices().to_vec(),
    }
}

/// Moves values close to zero off the interface, onto the positive side.
fn snap_level_set(phi: f64, tolerance: f64) -> f64 {
    if phi.abs() < tolerance {
        tolerance
    } else {
        phi
    }
}

fn check_jacobian(element: usize, hex: &Hex8Element<f64>) -> Result<(), XFluidError> {
    let mut points = Hex8Element::<f64>::reference_vertices().to_vec();
    points.push(Point3::origin());
    for xi in &points {
        let determinant = hex.reference_jacobian(xi).determinant();
        if determinant <= 0.0 {
            return Err(XFluidError::NegativeJacobian { element, determinant });
        }
    }
    Ok(())
}

/// Local node index of the element corner with reference coordinate bits `(bx, by, bz)`.
fn corner_node(bx: usize, by: usize, bz: usize) -> usize {
    [0, 1, 3, 2][bx + 2 * by] + 4 * bz
}

fn cut_element(
    element: usize,
    hex: &Hex8Element<f64>,
    corner_phi: &[f64; 8],
    sampler: &dyn LevelSetSampler,
    params: &CutParameters,
    refinement: usize,
    snap: f64,
) -> Result<LocalResult, XFluidError> {
    let r = refinement.max(1);
    let n = r + 1;
    let key = |ix: usize, iy: usize, iz: usize| ix + n * (iy + n * iz);
    let reference_point = |ix: usize, iy: usize, iz: usize| {
        let coord = |i: usize| -1.0 + 2.0 * (i as f64) / (r as f64);
        Point3::new(coord(ix), coord(iy), coord(iz))
    };

    // Sample the level set on the sub-vertex grid, reusing the nodal values at the corners
    let mut phi = vec![0.0; n * n * n];
    for (iz, iy, ix) in iproduct!(0..n, 0..n, 0..n) {
        let is_corner = [ix, iy, iz].iter().all(|&i| i == 0 || i == r);
        phi[key(ix, iy, iz)] = if is_corner {
            corner_phi[corner_node(ix / r, iy / r, iz / r)]
        } else {
            let x = hex.map_reference_coords(&reference_point(ix, iy, iz));
            snap_level_set(sampler.sample(&x).phi, snap)
        };
    }

    let first_side = LevelSetSide::of(phi[0]);
    if phi.iter().all(|&p| LevelSetSide::of(p) == first_side) {
        return Ok(LocalResult::Uncut(Position::from_phi(phi[0])));
    }

    // Clip every Kuhn tetrahedron of every sub-hexahedron
    let mut pieces: Vec<Piece> = Vec::new();
    let mut iso_triangles: Vec<IsoTriangle> = Vec::new();
    for (k, j, i) in iproduct!(0..r, 0..r, 0..r) {
        let corner = |c: usize| (i + (c & 1), j + ((c >> 1) & 1), k + ((c >> 2) & 1));
        for tet in kuhn_tetrahedra() {
            let vertices = tet.map(|c| {
                let (a, b, d) = corner(c);
                reference_point(a, b, d)
            });
            let keys = tet.map(|c| {
                let (a, b, d) = corner(c);
                key(a, b, d)
            });
            let tet_phi = keys.map(|k| phi[k]);
            let clip = clip_tetrahedron(&vertices, &keys, &tet_phi);

            let first_piece = pieces.len();
            for piece in &clip.pieces {
                pieces.push(Piece {
                    side: piece.side,
                    keys: piece.vertices.iter().map(|(key, _)| *key).collect(),
                    tetrahedra: (0..piece.tetrahedra.len()).map(|t| piece.tetrahedron(t)).collect(),
                });
            }
            if let Some(iso) = &clip.iso_polygon {
                let piece_on = |side: LevelSetSide| {
                    (first_piece..pieces.len())
                        .find(|&p| pieces[p].side == side)
                        .expect("a clipped tetrahedron has a piece on each side")
                };
                let positive_piece = piece_on(LevelSetSide::Positive);
                let negative_piece = piece_on(LevelSetSide::Negative);
                for t in 0..iso.triangles.len() {
                    iso_triangles.push(IsoTriangle {
                        reference: iso.triangle(t).0,
                        positive_piece,
                        negative_piece,
                    });
                }
            }
        }
    }

    // Merge pieces on the same side sharing a face, i.e. at least three vertex keys
    let mut pieces_of_key: FxHashMap<ClipVertexKey<usize>, Vec<usize>> = FxHashMap::default();
    for (p, piece) in pieces.iter().enumerate() {
        for key in &piece.keys {
            pieces_of_key.entry(*key).or_default().push(p);
        }
    }
    let mut shared_keys: FxHashMap<(usize, usize), usize> = FxHashMap::default();
    for owners in pieces_of_key.values() {
        for (a_idx, &a) in owners.iter().enumerate() {
            for &b in &owners[a_idx + 1..] {
                if a != b && pieces[a].side == pieces[b].side {
                    *shared_keys.entry((a.min(b), a.max(b))).or_default() += 1;
                }
            }
        }
    }
    let mut components = UnionFind::new(pieces.len());
    for (&(a, b), &count) in &shared_keys {
        if count >= 3 {
            components.union(a, b);
        }
    }
    let (labels, num_cells) = components.labels();

    let (weights, points) = tetrahedron_rule(params.volume_cubature_degree);
    let mut cells: Vec<VolumeCell> = (0..num_cells)
        .map(|_| VolumeCell {
            element,
            position: Position::Outside,
            nodes: Vec::new(),
            tetrahedra: Vec::new(),
            quadrature: (Vec::new(), Vec::new()),
            boundary_cells: Vec::new(),
        })
        .collect();
    for (p, piece) in pieces.iter().enumerate() {
        let cell = &mut cells[labels[p]];
        cell.position = match piece.side {
            LevelSetSide::Negative => Position::Inside,
            LevelSetSide::Positive => Position::Outside,
        };
        for tet in &piece.tetrahedra {
            let scale = 6.0 * tet.volume();
            for (w, xi) in weights.iter().zip(&points) {
                cell.quadrature.0.push(w * scale);
                cell.quadrature.1.push(tet.map_reference_point(xi));
            }
            cell.tetrahedra.push(*tet);
        }
    }

    // Each node belongs to the first cell containing its corner vertex
    for (bz, by, bx) in iproduct!(0..2, 0..2, 0..2) {
        let corner_key = ClipVertexKey::Vertex(key(bx * r, by * r, bz * r));
        if let Some(owners) = pieces_of_key.get(&corner_key) {
            if let Some(cell) = owners.iter().map(|&p| labels[p]).min() {
                cells[cell].nodes.push(corner_node(bx, by, bz));
            }
        }
    }
    for cell in &mut cells {
        cell.nodes.sort_unstable();
    }

    let h = hex.volume_equivalent_length();
    let (tri_weights, tri_points) = triangle_rule(params.boundary_cubature_degree);
    let mut boundary_cells = Vec::new();
    let mut skipped_area = 0.0;
    for iso in &iso_triangles {
        let vertices = iso.reference.map(|xi| hex.map_reference_coords(&xi));
        let physical = Triangle3d(vertices);
        let area = physical.area();
        if area < MIN_RELATIVE_AREA * h * h {
            skipped_area += area;
            continue;
        }
        let sample = sampler.sample(&physical.centroid());
        let [r0, r1, r2] = iso.reference;
        let mut bc = BoundaryCell {
            element,
            side: sample.side,
            coupling: sample.coupling,
            outside: VolumeCellIdx(labels[iso.positive_piece]),
            inside: VolumeCellIdx(labels[iso.negative_piece]),
            vertices,
            reference_vertices: iso.reference,
            normal: -physical.normal(),
            area,
            weights: Vec::with_capacity(tri_weights.len()),
            points: Vec::with_capacity(tri_weights.len()),
            reference_points: Vec::with_capacity(tri_weights.len()),
        };
        for (w, st) in tri_weights.iter().zip(&tri_points) {
            let xi = r0 + (r1 - r0) * st.x + (r2 - r0) * st.y;
            bc.weights.push(w * 2.0 * area);
            bc.points.push(hex.map_reference_coords(&xi));
            bc.reference_points.push(xi);
        }
        let index = boundary_cells.len();
        cells[bc.outside.0].boundary_cells.push(BoundaryCellIdx(index));
        boundary_cells.push(bc);
    }

    check_volume(element, &cells, params)?;
    check_closed_surfaces(element, &cells, &boundary_cells, params.volume_tolerance * h * h + skipped_area)?;

    // A cell covering the whole element is integrated with the standard rule
    let dominant = cells
        .iter()
        .position(|cell| (cell.reference_volume() - REFERENCE_VOLUME).abs() <= params.volume_tolerance);
    let has_xfem_integration_rule = dominant.is_none();
    if let Some(dominant) = dominant {
        for (c, cell) in cells.iter_mut().enumerate() {
            cell.boundary_cells.clear();
            if c != dominant {
                cell.quadrature = (Vec::new(), Vec::new());
            }
        }
        boundary_cells.clear();
    }

    Ok(LocalResult::Cut(LocalCut {
        cells,
        boundary_cells,
        has_xfem_integration_rule,
    }))
}

fn check_volume(element: usize, cells: &[VolumeCell], params: &CutParameters) -> Result<(), XFluidError> {
    let total: f64 = cells.iter().map(VolumeCell::reference_volume).sum();
    if (total - REFERENCE_VOLUME).abs() > params.volume_tolerance {
        return Err(XFluidError::CutFailed {
            element,
            reason: format!("volume cell weights sum to {total}, expected {REFERENCE_VOLUME}"),
        });
    }
    Ok(())
}

/// The boundary cells around a volume cell not touching the element boundary must form a
/// closed surface.
fn check_closed_surfaces(
    element: usize,
    cells: &[VolumeCell],
    boundary_cells: &[BoundaryCell],
    tolerance: f64,
) -> Result<(), XFluidError> {
    for (c, cell) in cells.iter().enumerate() {
        let touches_element_boundary = cell
            .tetrahedra
            .iter()
            .flat_map(|tet| tet.vertices().iter())
            .any(|xi| xi.iter().any(|coord| coord.abs() >= 1.0));
        if touches_element_boundary {
            continue;
        }
        // Normals point out of the outside cell and into the inside cell
        let flux: Vector3<f64> = boundary_cells
            .iter()
            .map(|bc| {
                let sign = if bc.outside.0 == c {
                    1.0
                } else if bc.inside.0 == c {
                    -1.0
                } else {
                    0.0
                };
                bc.normal * (sign * bc.area)
            })
            .sum();
        if flux.norm() > tolerance {
            return Err(XFluidError::CutFailed {
                element,
                reason: format!("interior volume cell is not enclosed, net normal flux {:e}", flux.norm()),
            });
        }
    }
    Ok(())
}
