//! Transfer of state vectors between the nodal dof-sets of two cuts.
//!
//! Every nodal dof-set of the target layout receives a [`ReconstructionMethod`]. The passes run
//! strictly in the order copy, projection, semi-Lagrangean back-tracking and ghost-penalty
//! extension; each earlier pass fixes the dofs it has written, so that the ghost-penalty solve
//! only extends into the remaining ones.
use crate::boundary::element_of;
use crate::config::{TransferParameters, XFluidTimeIntScheme};
use crate::cut::{CutWizard, ElementCut, Position};
use crate::dofset::{GlobalDofMap, DOFS_PER_SET};
use crate::error::XFluidError;
use crate::face_stabilization::{solve_reconstruction, FaceStabilizer};
use crate::kernel::BasisPoint;
use crate::mesh::{HexMesh, MeshFaces, PointLocator};
use crate::nalgebra::{DVector, Matrix3, Point3, Vector3};
use fxhash::FxHashSet;
use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a target nodal dof-set obtained its values, ordered by cost.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReconstructionMethod {
    DirichletEnforced,
    Copy,
    ProjectionFromEmbeddedMesh,
    SemiLagrangean,
    GhostPenalty,
}

/// A field given on an embedded discretization that overlaps the background mesh.
pub trait EmbeddedField: Send + Sync {
    /// Values `[u_x, u_y, u_z, p]` of the transported vector `vector` at `x`, if `x` is
    /// covered by the embedded discretization.
    fn evaluate(&self, vector: usize, x: &Point3<f64>) -> Option<[f64; 4]>;
}

/// One cut discretization of the background mesh.
#[derive(Debug, Clone, Copy)]
pub struct Discretization<'a> {
    pub mesh: &'a HexMesh,
    pub displacement: Option<&'a [Vector3<f64>]>,
    pub wizard: &'a CutWizard,
    pub dofmap: &'a GlobalDofMap,
}

/// Data of the characteristic back-tracking.
#[derive(Debug, Clone, Copy)]
pub struct SemiLagrangeData<'a> {
    pub dt: f64,
    /// Weight of the target velocity in the characteristic.
    pub theta: f64,
    /// Velocity on the target layout, required if `theta > 0`.
    pub target_velocity: Option<&'a DVector<f64>>,
}

pub struct TransferRequest<'a> {
    pub scheme: XFluidTimeIntScheme,
    pub source: Discretization<'a>,
    pub target: Discretization<'a>,
    pub faces: &'a MeshFaces,
    /// Vectors on the source layout. The first one is the velocity used for back-tracking.
    pub sources: Vec<&'a DVector<f64>>,
    /// Dofs of the target layout that hold prescribed values and are never written.
    pub dirichlet: &'a [bool],
    pub semi_lagrange: Option<SemiLagrangeData<'a>>,
    pub embedded: Option<&'a dyn EmbeddedField>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatistics {
    pub dirichlet: usize,
    pub copy: usize,
    pub projection: usize,
    pub semi_lagrangean: usize,
    pub ghost_penalty: usize,
    /// Back-tracking failures that fell back to ghost-penalty extension.
    pub semi_lagrange_failures: usize,
}

impl TransferStatistics {
    fn record(&mut self, method: ReconstructionMethod) {
        match method {
            ReconstructionMethod::DirichletEnforced => self.dirichlet += 1,
            ReconstructionMethod::Copy => self.copy += 1,
            ReconstructionMethod::ProjectionFromEmbeddedMesh => self.projection += 1,
            ReconstructionMethod::SemiLagrangean => self.semi_lagrangean += 1,
            ReconstructionMethod::GhostPenalty => self.ghost_penalty += 1,
        }
    }

    fn merge(&mut self, other: &TransferStatistics) {
        self.dirichlet += other.dirichlet;
        self.copy += other.copy;
        self.projection += other.projection;
        self.semi_lagrangean += other.semi_lagrangean;
        self.ghost_penalty += other.ghost_penalty;
        self.semi_lagrange_failures += other.semi_lagrange_failures;
    }
}

impl fmt::Display for TransferStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "copy: {}, projection: {}, semi-Lagrangean: {} ({} failed), ghost-penalty: {}, Dirichlet: {}",
            self.copy,
            self.projection,
            self.semi_lagrangean,
            self.semi_lagrange_failures,
            self.ghost_penalty,
            self.dirichlet
        )
    }
}

#[derive(Debug, Clone)]
pub struct TransferOutput {
    /// Transferred vectors on the target layout, in the order of the sources.
    pub vectors: Vec<DVector<f64>>,
    /// Method per target nodal dof-set.
    pub labels: Vec<ReconstructionMethod>,
    /// Source slot each target slot was copied from.
    pub permutation: Vec<Option<usize>>,
    pub statistics: TransferStatistics,
    pub newton_restart_required: bool,
}

impl TransferOutput {
    /// Most expensive method among the dof-sets of every node.
    pub fn node_labels(&self, dofmap: &GlobalDofMap) -> Vec<Option<ReconstructionMethod>> {
        (0..dofmap.num_nodes())
            .map(|node| dofmap.node_slots(node).map(|slot| self.labels[slot]).max())
            .collect()
    }
}

/// Transfers state vectors between dof layouts and keeps statistics over all transfers.
#[derive(Debug)]
pub struct FieldTransfer {
    params: TransferParameters,
    reconstruction_factor: f64,
    totals: Mutex<TransferStatistics>,
}

/// Key matching a dof-set across layouts: position, standard flag and occurrence index among
/// the sets of the node sharing the first two.
type SlotKey = (Position, bool, usize);

fn slot_keys(dofmap: &GlobalDofMap, node: usize) -> Vec<(usize, SlotKey)> {
    let mut keys: Vec<(usize, SlotKey)> = Vec::new();
    for slot in dofmap.node_slots(node) {
        let set = dofmap.slot(slot);
        let occurrence = keys
            .iter()
            .filter(|(_, (p, s, _))| *p == set.position && *s == set.standard)
            .count();
        keys.push((slot, (set.position, set.standard, occurrence)));
    }
    keys
}

/// Source slot of every target slot with a one-to-one match at its node.
pub fn match_slots(source: &GlobalDofMap, target: &GlobalDofMap) -> Vec<Option<usize>> {
    let mut permutation = vec![None; target.num_slots()];
    let num_nodes = source.num_nodes().min(target.num_nodes());
    for node in 0..num_nodes {
        let source_keys = slot_keys(source, node);
        for (slot, key) in slot_keys(target, node) {
            permutation[slot] = source_keys
                .iter()
                .find(|(_, source_key)| *source_key == key)
                .map(|(source_slot, _)| *source_slot);
        }
    }
    permutation
}

/// Nodes in the support of a cut element.
fn cut_support_nodes(wizard: &CutWizard, dofmap: &GlobalDofMap) -> FxHashSet<usize> {
    (0..wizard.num_elements())
        .filter(|&e| wizard.is_cut(e))
        .flat_map(|e| dofmap.element_nodes(e).iter().copied())
        .collect()
}

fn classify(
    scheme: XFluidTimeIntScheme,
    standard: bool,
    matched: bool,
    near_cut: bool,
    with_projection: bool,
    with_semi_lagrange: bool,
) -> ReconstructionMethod {
    use ReconstructionMethod::*;
    use XFluidTimeIntScheme::*;
    let copy_or = |fallback| if matched { Copy } else { fallback };
    let projection_or = |fallback| if with_projection { ProjectionFromEmbeddedMesh } else { fallback };
    let semi_lagrange_or = |fallback| if with_semi_lagrange { SemiLagrangean } else { fallback };
    match (scheme, standard) {
        (StdByCopyAndGhostByCopyOrGp, _) => copy_or(GhostPenalty),
        (StdByCopyOrProjAndGhostByProjOrCopyOrGp, true) => copy_or(projection_or(GhostPenalty)),
        (StdByCopyOrProjAndGhostByProjOrCopyOrGp, false) => projection_or(copy_or(GhostPenalty)),
        (StdBySlAndGhostByGp, true) if matched && !near_cut => Copy,
        (StdBySlAndGhostByGp, true) => semi_lagrange_or(GhostPenalty),
        (StdBySlAndGhostByGp, false) => GhostPenalty,
        (StdByCopyOrSlAndGhostByCopyOrGp, true) => copy_or(semi_lagrange_or(GhostPenalty)),
        (StdByCopyOrSlAndGhostByCopyOrGp, false) => copy_or(GhostPenalty),
        (StdByCopyAndGhostByGp, true) => copy_or(GhostPenalty),
        (StdByCopyAndGhostByGp, false) => GhostPenalty,
    }
}

/// Field values of one source location.
struct SourcePoint {
    element: usize,
    slots: [usize; 8],
    basis: BasisPoint,
}

impl SourcePoint {
    fn values(&self, vector: &DVector<f64>) -> [f64; 4] {
        let mut values = [0.0; 4];
        for (a, &slot) in self.slots.iter().enumerate() {
            for (c, value) in values.iter_mut().enumerate() {
                *value += self.basis.N[a] * vector[GlobalDofMap::dof(slot, c)];
            }
        }
        values
    }

    fn velocity(&self, vector: &DVector<f64>) -> Vector3<f64> {
        let [u, v, w, _] = self.values(vector);
        Vector3::new(u, v, w)
    }

    fn velocity_gradient(&self, vector: &DVector<f64>) -> Matrix3<f64> {
        let mut gradient = Matrix3::zeros();
        for (a, &slot) in self.slots.iter().enumerate() {
            let u = Vector3::from_fn(|c, _| vector[GlobalDofMap::dof(slot, c)]);
            gradient += u * self.basis.gradient(a).transpose();
        }
        gradient
    }
}

/// Result of locating a back-tracked point in the source discretization.
enum Located {
    Found(SourcePoint),
    WrongSide(SourcePoint),
    Outside,
}

struct SemiLagrangeTracker<'a> {
    source: Discretization<'a>,
    locator: PointLocator,
    velocity: &'a DVector<f64>,
    params: &'a TransferParameters,
}

impl<'a> SemiLagrangeTracker<'a> {
    /// Locates `x` and evaluates the basis of the source cell set with the given position.
    ///
    /// A point on the wrong side of the interface is still evaluated with the closest cell
    /// set of the requested position, if the element has one.
    fn locate(&self, x: &Point3<f64>, position: Position) -> Result<Located, XFluidError> {
        let Some((element, xi)) = self.locator.locate_point(x) else {
            return Ok(Located::Outside);
        };
        let dofmap = self.source.dofmap;
        let wizard = self.source.wizard;
        let sets = dofmap.cell_sets(element);
        let (set, same_side) = match wizard.element(element) {
            ElementCut::Uncut(p) => (sets.iter().find(|set| set.position == position), *p == position),
            ElementCut::Cut(_) => match wizard.volume_cell_at(element, &xi) {
                Some(vc) if wizard.volume_cell(vc).position == position => {
                    (sets.iter().find(|set| set.volume_cells.contains(&vc)), true)
                }
                _ => (sets.iter().find(|set| set.position == position), false),
            },
        };
        let Some(set) = set else {
            return Ok(Located::Outside);
        };
        let hex = element_of(self.source.mesh, element, self.source.displacement)?;
        let point = SourcePoint {
            element,
            slots: dofmap.element_slots(element, &set.nds),
            basis: BasisPoint::evaluate(element, &hex, &xi)?,
        };
        Ok(if same_side {
            Located::Found(point)
        } else {
            Located::WrongSide(point)
        })
    }

    /// Accepts points on the wrong side that lie on the interface within `tolerance`.
    fn accept(&self, located: Located, x: &Point3<f64>, tolerance: f64) -> Option<SourcePoint> {
        match located {
            Located::Found(point) => Some(point),
            Located::WrongSide(point) if self.params.check_sliding_on_surface => {
                let distance = self.source.wizard.distance_to_interface(point.element, x)?;
                (distance <= tolerance).then_some(point)
            }
            _ => None,
        }
    }

    /// Newton back-tracking of the characteristic ending in `x`.
    fn track(
        &self,
        x: &Point3<f64>,
        position: Position,
        data: &SemiLagrangeData,
        target_velocity: Vector3<f64>,
    ) -> Result<Option<SourcePoint>, XFluidError> {
        let (Located::Found(start) | Located::WrongSide(start)) = self.locate(x, position)? else {
            return Ok(None);
        };
        let hex = element_of(self.source.mesh, start.element, self.source.displacement)?;
        let h = hex.volume_equivalent_length();
        let tolerance = 1e-10 * h;
        let dt = data.dt;
        let theta = data.theta;

        let mut x0 = x - dt * start.velocity(self.velocity);
        let mut converged = None;
        for _ in 0..self.params.sl_max_iterations {
            let point = match self.locate(&x0, position)? {
                Located::Found(point) | Located::WrongSide(point) => point,
                Located::Outside => break,
            };
            let u0 = point.velocity(self.velocity);
            let residual = x0.coords + dt * ((1.0 - theta) * u0 + theta * target_velocity) - x.coords;
            if residual.norm() <= tolerance {
                converged = Some(x0);
                break;
            }
            let jacobian = Matrix3::identity() + dt * (1.0 - theta) * point.velocity_gradient(self.velocity);
            let Some(step) = jacobian.lu().solve(&residual) else {
                break;
            };
            x0 -= step;
        }

        if let Some(x0) = converged {
            let located = self.locate(&x0, position)?;
            if let Some(point) = self.accept(located, &x0, 1e-3 * h) {
                return Ok(Some(point));
            }
        }
        if self.params.check_interfacetips {
            return self.track_in_substeps(x, position, data, target_velocity, h);
        }
        Ok(None)
    }

    /// Explicit back-tracking in sub-steps, used when the Newton iteration ends in the wrong
    /// phase near an interface tip.
    fn track_in_substeps(
        &self,
        x: &Point3<f64>,
        position: Position,
        data: &SemiLagrangeData,
        target_velocity: Vector3<f64>,
        h: f64,
    ) -> Result<Option<SourcePoint>, XFluidError> {
        let substeps = self.params.sl_substeps.max(1);
        let dt = data.dt / substeps as f64;
        let mut x0 = *x;
        for _ in 0..substeps {
            let point = match self.locate(&x0, position)? {
                Located::Found(point) | Located::WrongSide(point) => point,
                Located::Outside => return Ok(None),
            };
            let u = (1.0 - data.theta) * point.velocity(self.velocity) + data.theta * target_velocity;
            x0 -= dt * u;
        }
        let located = self.locate(&x0, position)?;
        Ok(self.accept(located, &x0, 1e-3 * h))
    }
}

impl FieldTransfer {
    pub fn new(params: TransferParameters, reconstruction_factor: f64) -> Self {
        Self {
            params,
            reconstruction_factor,
            totals: Mutex::new(TransferStatistics::default()),
        }
    }

    pub fn params(&self) -> &TransferParameters {
        &self.params
    }

    /// Statistics accumulated over all transfers.
    pub fn total_statistics(&self) -> TransferStatistics {
        self.totals.lock().clone()
    }

    /// Scheme of a transfer inside a time step. Back-tracking is only allowed on the first
    /// transfer of the step.
    pub fn within_step_scheme(&self, first_call: bool) -> XFluidTimeIntScheme {
        if first_call {
            self.params.scheme
        } else {
            XFluidTimeIntScheme::StdByCopyAndGhostByCopyOrGp
        }
    }

    /// Transfers the source vectors onto the target layout.
    ///
    /// `initial` holds the target vectors before the transfer; entries of Dirichlet dofs are
    /// kept as given.
    pub fn transfer(&self, request: &TransferRequest, initial: Vec<DVector<f64>>) -> eyre::Result<TransferOutput> {
        let source = request.source;
        let target = request.target;
        let num_target_dofs = target.dofmap.num_dofs();
        assert_eq!(initial.len(), request.sources.len());
        assert!(initial.iter().all(|v| v.len() == num_target_dofs));
        assert_eq!(request.dirichlet.len(), num_target_dofs);
        let mut vectors = initial;

        let permutation = match_slots(source.dofmap, target.dofmap);
        let mut near_cut = cut_support_nodes(source.wizard, source.dofmap);
        near_cut.extend(cut_support_nodes(target.wizard, target.dofmap));
        let with_semi_lagrange = request.semi_lagrange.is_some() && !request.sources.is_empty();

        let mut labels: Vec<ReconstructionMethod> = target
            .dofmap
            .slots()
            .iter()
            .enumerate()
            .map(|(slot, set)| {
                classify(
                    request.scheme,
                    set.standard,
                    permutation[slot].is_some(),
                    near_cut.contains(&set.node),
                    request.embedded.is_some(),
                    with_semi_lagrange,
                )
            })
            .collect();

        let mut known = request.dirichlet.to_vec();
        let mut statistics = TransferStatistics::default();

        // Copy
        for (slot, label) in labels.iter().enumerate() {
            let (ReconstructionMethod::Copy, Some(source_slot)) = (label, permutation[slot]) else {
                continue;
            };
            for c in 0..DOFS_PER_SET {
                let dof = GlobalDofMap::dof(slot, c);
                let source_dof = GlobalDofMap::dof(source_slot, c);
                if !request.dirichlet[dof] {
                    for (vector, source_vector) in vectors.iter_mut().zip(&request.sources) {
                        vector[dof] = source_vector[source_dof];
                    }
                }
                known[dof] = true;
            }
        }

        // Projection from the embedded discretization
        if let Some(embedded) = request.embedded {
            for slot in 0..labels.len() {
                if labels[slot] != ReconstructionMethod::ProjectionFromEmbeddedMesh {
                    continue;
                }
                let x = target.wizard.node_coordinates()[target.dofmap.slot(slot).node];
                let values: Option<Vec<[f64; 4]>> = (0..vectors.len())
                    .map(|k| embedded.evaluate(k, &x))
                    .collect();
                match values {
                    Some(values) => {
                        for (vector, values) in vectors.iter_mut().zip(&values) {
                            write_slot(vector, slot, values, request.dirichlet);
                        }
                        mark_known(&mut known, slot);
                    }
                    None => labels[slot] = ReconstructionMethod::GhostPenalty,
                }
            }
        }

        // Semi-Lagrangean back-tracking
        if let (Some(data), Some(&velocity)) = (request.semi_lagrange, request.sources.first()) {
            let tracker = SemiLagrangeTracker {
                source,
                locator: PointLocator::with_displacement(source.mesh, source.displacement),
                velocity,
                params: &self.params,
            };
            let tracked: Vec<(usize, Option<Vec<[f64; 4]>>)> = labels
                .par_iter()
                .enumerate()
                .filter(|(_, label)| **label == ReconstructionMethod::SemiLagrangean)
                .map(|(slot, _)| {
                    let set = target.dofmap.slot(slot);
                    let x = target.wizard.node_coordinates()[set.node];
                    let target_velocity = data
                        .target_velocity
                        .map(|v| Vector3::from_fn(|c, _| v[GlobalDofMap::dof(slot, c)]))
                        .unwrap_or_else(Vector3::zeros);
                    let point = tracker.track(&x, set.position, &data, target_velocity)?;
                    let values = point.map(|point| request.sources.iter().map(|v| point.values(v)).collect());
                    Ok((slot, values))
                })
                .collect::<Result<_, XFluidError>>()?;

            for (slot, values) in tracked {
                match values {
                    Some(values) => {
                        for (vector, values) in vectors.iter_mut().zip(&values) {
                            write_slot(vector, slot, values, request.dirichlet);
                        }
                        mark_known(&mut known, slot);
                    }
                    None => {
                        warn!(
                            "Semi-Lagrangean back-tracking failed for node {}, falling back to ghost-penalty",
                            target.dofmap.slot(slot).node
                        );
                        statistics.semi_lagrange_failures += 1;
                        labels[slot] = ReconstructionMethod::GhostPenalty;
                    }
                }
            }
        }

        // Sets whose velocity is fully prescribed only need their pressure extended
        for (slot, label) in labels.iter_mut().enumerate() {
            let velocity_prescribed = (0..3).all(|c| request.dirichlet[GlobalDofMap::dof(slot, c)]);
            if *label == ReconstructionMethod::GhostPenalty && velocity_prescribed {
                *label = ReconstructionMethod::DirichletEnforced;
            }
        }

        // Ghost-penalty extension
        let num_unknown = known.iter().filter(|&&k| !k).count();
        if num_unknown > 0 {
            let stabilizer = FaceStabilizer::new(
                target.mesh,
                request.faces,
                target.displacement,
                target.wizard,
                target.dofmap,
            );
            let penalty_matrix = stabilizer.reconstruction_matrix(self.reconstruction_factor)?;
            let empty = crate::assembly::empty_rows(&penalty_matrix);
            // Dofs outside every stabilized face keep their initial values
            let num_isolated = (0..num_target_dofs).filter(|&dof| !known[dof] && empty[dof]).count();
            if num_isolated > 0 {
                warn!("{num_isolated} dofs without ghost-penalty faces keep their values before the transfer");
            }
            for vector in vectors.iter_mut() {
                solve_reconstruction(&penalty_matrix, &known, vector, self.params.gmres_tolerance)?;
                if let Some(dof) = (0..num_target_dofs).find(|&dof| !known[dof] && !vector[dof].is_finite()) {
                    let node = target.dofmap.slot(dof / DOFS_PER_SET).node;
                    return Err(XFluidError::ReconstructionImpossible { node }.into());
                }
            }
        }

        for &label in &labels {
            statistics.record(label);
        }
        let dofsets_changed = !source.dofmap.same_layout(target.dofmap);
        let newton_restart_required =
            dofsets_changed || statistics.ghost_penalty > 0 || statistics.semi_lagrangean > 0;

        info!("Field transfer ({:?}): {}", request.scheme, statistics);
        debug!("Newton restart required after transfer: {newton_restart_required}");
        self.totals.lock().merge(&statistics);

        Ok(TransferOutput {
            vectors,
            labels,
            permutation,
            statistics,
            newton_restart_required,
        })
    }
}

fn write_slot(vector: &mut DVector<f64>, slot: usize, values: &[f64; 4], dirichlet: &[bool]) {
    for (c, &value) in values.iter().enumerate() {
        let dof = GlobalDofMap::dof(slot, c);
        if !dirichlet[dof] {
            vector[dof] = value;
        }
    }
}

fn mark_known(known: &mut [bool], slot: usize) {
    for c in 0..DOFS_PER_SET {
        known[GlobalDofMap::dof(slot, c)] = true;
    }
}
