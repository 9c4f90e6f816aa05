//! Interface couplings and the condition manager.
//!
//! A coupling describes one interface: its geometry at the current pose, the velocity it
//! prescribes and, for two-sided couplings, the dofs on its other side. The
//! [`ConditionManager`] is the registry the cut wizard and the assembler query. Side ids are
//! global: each cutting coupling owns a contiguous range of them.
use crate::config::{CouplingMethod, XFluidParameters};
use crate::cut::{CutterSample, LevelSetSampler, Position};
use crate::error::XFluidError;
use crate::function::VectorField;
use crate::material::{FluidMaterial, NewtonianFluid};
use crate::nalgebra::{DVector, Point3, Rotation3, Unit, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use xfluid_geometry::sdf::SignedDistanceFunction3d;
use xfluid_geometry::surface::{SurfaceDistance, TriangulatedSurface};
use xfluid_geometry::Triangle3d;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CouplingKind {
    /// One-sided weak Dirichlet condition on a cutter surface mesh.
    MeshWeakDirichlet,
    /// Two-sided coupling with the velocity dofs of the cutter surface nodes.
    MeshFsi,
    /// One-sided weak Dirichlet condition on an analytic level set.
    LevelSetWeakDirichlet,
    /// Coupling between the outside and inside fluid phases of a level set.
    LevelSetTwoPhase,
}

impl CouplingKind {
    pub fn is_level_set(&self) -> bool {
        matches!(self, Self::LevelSetWeakDirichlet | Self::LevelSetTwoPhase)
    }

    pub fn has_side_dofs(&self) -> bool {
        matches!(self, Self::MeshFsi)
    }

    pub fn is_two_phase(&self) -> bool {
        matches!(self, Self::LevelSetTwoPhase)
    }
}

/// Rigid motion of an interface.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum InterfaceMotion {
    Static,
    Translation {
        velocity: Vector3<f64>,
    },
    Rotation {
        center: Point3<f64>,
        axis: Vector3<f64>,
        angular_velocity: f64,
    },
}

impl Default for InterfaceMotion {
    fn default() -> Self {
        Self::Static
    }
}

impl InterfaceMotion {
    /// Current position of the reference point `x0` at time `t`.
    pub fn push_forward(&self, x0: &Point3<f64>, t: f64) -> Point3<f64> {
        match self {
            Self::Static => *x0,
            Self::Translation { velocity } => x0 + velocity * t,
            Self::Rotation {
                center,
                axis,
                angular_velocity,
            } => {
                let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(*axis), angular_velocity * t);
                center + rotation * (x0 - center)
            }
        }
    }

    /// Reference position of the current point `x` at time `t`.
    pub fn pull_back(&self, x: &Point3<f64>, t: f64) -> Point3<f64> {
        match self {
            Self::Static => *x,
            Self::Translation { velocity } => x - velocity * t,
            Self::Rotation {
                center,
                axis,
                angular_velocity,
            } => {
                let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(*axis), -angular_velocity * t);
                center + rotation * (x - center)
            }
        }
    }

    /// Velocity of the material point currently at `x`.
    pub fn velocity_at(&self, x: &Point3<f64>) -> Vector3<f64> {
        match self {
            Self::Static => Vector3::zeros(),
            Self::Translation { velocity } => *velocity,
            Self::Rotation {
                center,
                axis,
                angular_velocity,
            } => (axis.normalize() * *angular_velocity).cross(&(x - center)),
        }
    }
}

/// Per-step interface state.
///
/// Mesh couplings store one displacement and velocity per cutter node. Level-set couplings
/// are described by their motion alone and only track the times of their poses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceState {
    pub time_np: f64,
    pub time_n: f64,
    pub idispnp: Vec<Vector3<f64>>,
    pub idispn: Vec<Vector3<f64>>,
    /// Displacement at the previous Newton iteration.
    pub idispi: Vec<Vector3<f64>>,
    pub ivelnp: Vec<Vector3<f64>>,
    pub iveln: Vec<Vector3<f64>>,
}

impl InterfaceState {
    fn with_nodes(num_nodes: usize) -> Self {
        Self {
            idispnp: vec![Vector3::zeros(); num_nodes],
            idispn: vec![Vector3::zeros(); num_nodes],
            idispi: vec![Vector3::zeros(); num_nodes],
            ivelnp: vec![Vector3::zeros(); num_nodes],
            iveln: vec![Vector3::zeros(); num_nodes],
            ..Default::default()
        }
    }

    /// `idispn <- idispnp`, `iveln <- ivelnp`.
    pub fn cycle(&mut self) {
        self.idispn.clone_from(&self.idispnp);
        self.iveln.clone_from(&self.ivelnp);
        self.time_n = self.time_np;
    }

    pub fn store_iteration(&mut self) {
        self.idispi.clone_from(&self.idispnp);
    }
}

/// Uniform interface of all interface couplings.
pub trait Coupling: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> CouplingKind;

    /// Number of sides of the interface. Level sets have a single side.
    fn num_sides(&self) -> usize;

    /// Signed level-set value (negative inside) and local side id at the current pose.
    fn sample(&self, x: &Point3<f64>) -> (f64, usize);

    /// Velocity prescribed by the interface at `x` on the given local side.
    fn interface_velocity(&self, x: &Point3<f64>, side: usize) -> Vector3<f64>;

    /// Number of coupling dofs owned by the interface itself.
    fn num_side_dofs(&self) -> usize {
        0
    }

    /// Coupling-local dof indices of a side.
    fn side_location_vector(&self, _side: usize) -> Vec<usize> {
        Vec::new()
    }

    /// Values of the side shape functions at `x`, ordered like the side location vector
    /// divided into groups of three velocity components.
    fn side_basis(&self, _side: usize, _x: &Point3<f64>) -> Vec<f64> {
        Vec::new()
    }

    fn state(&self) -> &InterfaceState;

    fn state_mut(&mut self) -> &mut InterfaceState;

    /// Moves the interface to its pose at time `t`.
    fn set_pose(&mut self, t: f64);
}

/// Coupling to a triangulated cutter surface.
///
/// Triangle normals of the surface must point into the fluid.
#[derive(Debug, Clone)]
pub struct MeshCoupling {
    name: String,
    kind: CouplingKind,
    reference: TriangulatedSurface,
    motion: InterfaceMotion,
    wall_velocity: Option<VectorField>,
    externally_driven: bool,
    state: InterfaceState,
    distance: SurfaceDistance,
}

impl MeshCoupling {
    fn new(name: impl Into<String>, kind: CouplingKind, surface: TriangulatedSurface, motion: InterfaceMotion) -> Self {
        let state = InterfaceState::with_nodes(surface.vertices().len());
        Self {
            name: name.into(),
            kind,
            distance: SurfaceDistance::new(surface.clone()),
            reference: surface,
            motion,
            wall_velocity: None,
            externally_driven: false,
            state,
        }
    }

    pub fn weak_dirichlet(name: impl Into<String>, surface: TriangulatedSurface, motion: InterfaceMotion) -> Self {
        Self::new(name, CouplingKind::MeshWeakDirichlet, surface, motion)
    }

    pub fn fsi(name: impl Into<String>, surface: TriangulatedSurface, motion: InterfaceMotion) -> Self {
        Self::new(name, CouplingKind::MeshFsi, surface, motion)
    }

    /// Adds a velocity on top of the motion of the surface (e.g. a slip-free rotating wall).
    pub fn with_wall_velocity(mut self, velocity: VectorField) -> Self {
        self.wall_velocity = Some(velocity);
        self
    }

    /// Sets the interface displacement and velocity at `t_{n+1}` from an external module.
    ///
    /// From then on the motion of the coupling is ignored.
    pub fn set_interface_displacement(&mut self, idispnp: Vec<Vector3<f64>>, ivelnp: Vec<Vector3<f64>>) {
        assert_eq!(idispnp.len(), self.reference.vertices().len());
        assert_eq!(ivelnp.len(), self.reference.vertices().len());
        self.externally_driven = true;
        self.state.idispnp = idispnp;
        self.state.ivelnp = ivelnp;
        self.rebuild_distance();
    }

    pub fn reference_surface(&self) -> &TriangulatedSurface {
        &self.reference
    }

    /// The cutter surface at its current pose.
    pub fn current_surface(&self) -> &TriangulatedSurface {
        self.distance.surface()
    }

    fn rebuild_distance(&mut self) {
        let idispnp = &self.state.idispnp;
        let displaced = self.reference.displaced(|i, _| idispnp[i]);
        self.distance = SurfaceDistance::new(displaced);
    }

    fn barycentric(&self, side: usize, x: &Point3<f64>) -> [f64; 3] {
        let triangle = self.current_surface().triangle(side);
        barycentric_coordinates(&triangle, x)
    }
}

/// Barycentric coordinates of the projection of `x` onto the plane of the triangle.
fn barycentric_coordinates(triangle: &Triangle3d<f64>, x: &Point3<f64>) -> [f64; 3] {
    let [a, b, c] = &triangle.0;
    let (v0, v1, v2) = (b - a, c - a, x - a);
    let (d00, d01, d11) = (v0.dot(&v0), v0.dot(&v1), v1.dot(&v1));
    let (d20, d21) = (v2.dot(&v0), v2.dot(&v1));
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() <= f64::EPSILON * d00 * d11 {
        return [1.0 / 3.0; 3];
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    [1.0 - v - w, v, w]
}

impl Coupling for MeshCoupling {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CouplingKind {
        self.kind
    }

    fn num_sides(&self) -> usize {
        self.reference.triangles().len()
    }

    fn sample(&self, x: &Point3<f64>) -> (f64, usize) {
        match self.distance.query(x) {
            Some(query) => (query.signed_distance, query.triangle),
            None => (f64::INFINITY, 0),
        }
    }

    fn interface_velocity(&self, x: &Point3<f64>, side: usize) -> Vector3<f64> {
        let [i, j, k] = self.reference.triangles()[side];
        let [l0, l1, l2] = self.barycentric(side, x);
        let ivelnp = &self.state.ivelnp;
        let mesh_velocity = ivelnp[i] * l0 + ivelnp[j] * l1 + ivelnp[k] * l2;
        let wall = self
            .wall_velocity
            .as_ref()
            .map(|v| v.eval(x, self.state.time_np))
            .unwrap_or_else(Vector3::zeros);
        mesh_velocity + wall
    }

    fn num_side_dofs(&self) -> usize {
        if self.kind.has_side_dofs() {
            3 * self.reference.vertices().len()
        } else {
            0
        }
    }

    fn side_location_vector(&self, side: usize) -> Vec<usize> {
        if !self.kind.has_side_dofs() {
            return Vec::new();
        }
        self.reference.triangles()[side]
            .iter()
            .flat_map(|&node| (0..3).map(move |c| 3 * node + c))
            .collect()
    }

    fn side_basis(&self, side: usize, x: &Point3<f64>) -> Vec<f64> {
        if !self.kind.has_side_dofs() {
            return Vec::new();
        }
        self.barycentric(side, x).to_vec()
    }

    fn state(&self) -> &InterfaceState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut InterfaceState {
        &mut self.state
    }

    fn set_pose(&mut self, t: f64) {
        self.state.time_np = t;
        if self.externally_driven {
            self.rebuild_distance();
            return;
        }
        for (i, x0) in self.reference.vertices().iter().enumerate() {
            let x = self.motion.push_forward(x0, t);
            self.state.idispnp[i] = x - x0;
            self.state.ivelnp[i] = self.motion.velocity_at(&x);
        }
        self.rebuild_distance();
    }
}

/// Coupling to an analytic level set moving rigidly with its motion.
#[derive(Clone)]
pub struct LevelSetCoupling {
    name: String,
    kind: CouplingKind,
    level_set: Arc<dyn SignedDistanceFunction3d<f64> + Send + Sync>,
    motion: InterfaceMotion,
    wall_velocity: Option<VectorField>,
    state: InterfaceState,
}

impl fmt::Debug for LevelSetCoupling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelSetCoupling")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("motion", &self.motion)
            .field("wall_velocity", &self.wall_velocity)
            .field("state", &self.state)
            .finish()
    }
}

impl LevelSetCoupling {
    fn new<S>(name: impl Into<String>, kind: CouplingKind, level_set: S, motion: InterfaceMotion) -> Self
    where
        S: SignedDistanceFunction3d<f64> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind,
            level_set: Arc::new(level_set),
            motion,
            wall_velocity: None,
            state: InterfaceState::default(),
        }
    }

    pub fn weak_dirichlet<S>(name: impl Into<String>, level_set: S, motion: InterfaceMotion) -> Self
    where
        S: SignedDistanceFunction3d<f64> + Send + Sync + 'static,
    {
        Self::new(name, CouplingKind::LevelSetWeakDirichlet, level_set, motion)
    }

    pub fn two_phase<S>(name: impl Into<String>, level_set: S) -> Self
    where
        S: SignedDistanceFunction3d<f64> + Send + Sync + 'static,
    {
        Self::new(name, CouplingKind::LevelSetTwoPhase, level_set, InterfaceMotion::Static)
    }

    pub fn with_wall_velocity(mut self, velocity: VectorField) -> Self {
        self.wall_velocity = Some(velocity);
        self
    }

    pub fn motion(&self) -> &InterfaceMotion {
        &self.motion
    }

    /// Level-set value at `x` and time `t`.
    pub fn level_set_at(&self, x: &Point3<f64>, t: f64) -> f64 {
        self.level_set.eval(&self.motion.pull_back(x, t))
    }
}

impl Coupling for LevelSetCoupling {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CouplingKind {
        self.kind
    }

    fn num_sides(&self) -> usize {
        1
    }

    fn sample(&self, x: &Point3<f64>) -> (f64, usize) {
        (self.level_set_at(x, self.state.time_np), 0)
    }

    fn interface_velocity(&self, x: &Point3<f64>, _side: usize) -> Vector3<f64> {
        let wall = self
            .wall_velocity
            .as_ref()
            .map(|v| v.eval(x, self.state.time_np))
            .unwrap_or_else(Vector3::zeros);
        self.motion.velocity_at(x) + wall
    }

    fn state(&self) -> &InterfaceState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut InterfaceState {
        &mut self.state
    }

    fn set_pose(&mut self, t: f64) {
        self.state.time_np = t;
    }
}

/// Registry of all couplings and the background fluid material.
#[derive(Debug)]
pub struct ConditionManager {
    couplings: Vec<Box<dyn Coupling>>,
    clone_of: Vec<Option<usize>>,
    /// First global side id of each coupling; clones own no sides.
    side_offsets: Vec<usize>,
    material: FluidMaterial,
}

impl ConditionManager {
    pub fn new(material: FluidMaterial) -> Self {
        Self {
            couplings: Vec::new(),
            clone_of: Vec::new(),
            side_offsets: vec![0],
            material,
        }
    }

    pub fn add_coupling(&mut self, coupling: Box<dyn Coupling>) -> usize {
        self.push(coupling, None)
    }

    /// Registers a coupling that receives a copy of every boundary cell of `clone_of`.
    ///
    /// Clones do not cut the background mesh themselves.
    pub fn add_clone(&mut self, coupling: Box<dyn Coupling>, clone_of: usize) -> Result<usize, XFluidError> {
        let index = self.couplings.len();
        if clone_of == index {
            return Err(XFluidError::Configuration(format!(
                "coupling '{}' cannot be a clone of itself",
                coupling.name()
            )));
        }
        if clone_of > index || self.clone_of[clone_of].is_some() {
            return Err(XFluidError::Configuration(format!(
                "coupling '{}' must clone a registered, non-cloned coupling",
                coupling.name()
            )));
        }
        Ok(self.push(coupling, Some(clone_of)))
    }

    fn push(&mut self, coupling: Box<dyn Coupling>, clone_of: Option<usize>) -> usize {
        let last = *self.side_offsets.last().expect("offsets are never empty");
        let sides = if clone_of.is_none() { coupling.num_sides() } else { 0 };
        self.side_offsets.push(last + sides);
        self.couplings.push(coupling);
        self.clone_of.push(clone_of);
        self.couplings.len() - 1
    }

    /// Setup-time consistency checks.
    pub fn setup(&self, params: &XFluidParameters) -> Result<(), XFluidError> {
        let fail = |msg: String| Err(XFluidError::Configuration(msg));
        let two_phase: Vec<_> = self.cutting_couplings().filter(|&c| self.couplings[c].kind().is_two_phase()).collect();
        if !two_phase.is_empty() {
            if params.coupling_method != CouplingMethod::Nitsche {
                return fail("hybrid Lagrange-multiplier coupling is not available for two-phase couplings".into());
            }
            if !self.material.is_two_phase() {
                return fail("two-phase couplings require a two-phase material list".into());
            }
            if self.cutting_couplings().count() > 1 {
                return fail("a two-phase coupling must be the only interface cutting the background mesh".into());
            }
        } else if self.material.is_two_phase() {
            return fail("a two-phase material list requires a two-phase level-set coupling".into());
        }
        for (index, clone_of) in self.clone_of.iter().enumerate() {
            if let Some(source) = *clone_of {
                let clone = &self.couplings[index];
                if clone.kind().has_side_dofs() || clone.kind().is_two_phase() {
                    return fail(format!("cloned coupling '{}' must be one-sided", clone.name()));
                }
                if clone.kind() == CouplingKind::MeshWeakDirichlet
                    && clone.num_sides() != self.couplings[source].num_sides()
                {
                    return fail(format!(
                        "mesh coupling '{}' must share the sides of its clone source",
                        clone.name()
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn num_couplings(&self) -> usize {
        self.couplings.len()
    }

    pub fn coupling(&self, index: usize) -> &dyn Coupling {
        self.couplings[index].as_ref()
    }

    pub fn coupling_mut(&mut self, index: usize) -> &mut dyn Coupling {
        self.couplings[index].as_mut()
    }

    pub fn couplings(&self) -> impl Iterator<Item = &dyn Coupling> {
        self.couplings.iter().map(|c| c.as_ref())
    }

    /// Couplings whose geometry cuts the background mesh.
    pub fn cutting_couplings(&self) -> impl '_ + Iterator<Item = usize> {
        (0..self.couplings.len()).filter(move |&c| self.clone_of[c].is_none())
    }

    pub fn has_cutters(&self) -> bool {
        self.cutting_couplings().next().is_some()
    }

    pub fn num_level_set_couplings(&self) -> usize {
        self.cutting_couplings()
            .filter(|&c| self.couplings[c].kind().is_level_set())
            .count()
    }

    pub fn num_sides(&self) -> usize {
        *self.side_offsets.last().expect("offsets are never empty")
    }

    /// Coupling owning the global side id.
    pub fn index_of(&self, side: usize) -> Option<usize> {
        (0..self.couplings.len()).find(|&c| self.side_offsets[c] <= side && side < self.side_offsets[c + 1])
    }

    /// Coupling-local side id of a global side id.
    pub fn local_side(&self, side: usize) -> Option<(usize, usize)> {
        let coupling = self.index_of(side)?;
        Some((coupling, side - self.side_offsets[coupling]))
    }

    pub fn clone_info(&self, coupling: usize) -> Option<usize> {
        self.clone_of[coupling]
    }

    /// Couplings cloned from `coupling`.
    pub fn clones_of(&self, coupling: usize) -> impl '_ + Iterator<Item = usize> {
        (0..self.couplings.len()).filter(move |&c| self.clone_of[c] == Some(coupling))
    }

    /// Coupling-local side dofs of a global side.
    pub fn side_location_vector(&self, side: usize) -> Vec<usize> {
        match self.local_side(side) {
            Some((coupling, local)) => self.couplings[coupling].side_location_vector(local),
            None => Vec::new(),
        }
    }

    pub fn material(&self) -> &FluidMaterial {
        &self.material
    }

    pub fn material_at(&self, element: usize, position: Position) -> Result<NewtonianFluid, XFluidError> {
        self.material.resolve(element, position)
    }

    /// Whether fluid is present at the given position.
    pub fn is_physical(&self, position: Position) -> bool {
        self.material.at(position).is_some()
    }

    /// Moves every interface to its pose at time `t`.
    pub fn set_time(&mut self, t: f64) {
        for coupling in &mut self.couplings {
            coupling.set_pose(t);
        }
    }

    pub fn store_iteration_state(&mut self) {
        for coupling in &mut self.couplings {
            coupling.state_mut().store_iteration();
        }
    }

    pub fn update_state_vectors(&mut self) {
        for coupling in &mut self.couplings {
            coupling.state_mut().cycle();
        }
    }

    /// Velocity dofs of the sides of a coupling, ordered like its side location vectors.
    pub fn side_velocities(&self, coupling: usize) -> DVector<f64> {
        let ivelnp = &self.couplings[coupling].state().ivelnp;
        DVector::from_iterator(3 * ivelnp.len(), ivelnp.iter().flat_map(|v| v.iter().copied()))
    }

    pub fn interface_states(&self) -> Vec<InterfaceState> {
        self.couplings.iter().map(|c| c.state().clone()).collect()
    }

    /// Restores interface states, e.g. from a restart bundle.
    pub fn restore_interface_states(&mut self, states: Vec<InterfaceState>) -> Result<(), XFluidError> {
        if states.len() != self.couplings.len() {
            return Err(XFluidError::Configuration(format!(
                "restart data holds {} interface states for {} couplings",
                states.len(),
                self.couplings.len()
            )));
        }
        for (coupling, state) in self.couplings.iter_mut().zip(states) {
            let time = state.time_np;
            *coupling.state_mut() = state;
            coupling.set_pose(time);
        }
        Ok(())
    }
}

impl LevelSetSampler for ConditionManager {
    fn sample(&self, x: &Point3<f64>) -> CutterSample {
        let mut best = CutterSample {
            phi: f64::INFINITY,
            side: 0,
            coupling: 0,
        };
        for c in self.cutting_couplings() {
            let (phi, local_side) = self.couplings[c].sample(x);
            if phi < best.phi {
                best = CutterSample {
                    phi,
                    side: self.side_offsets[c] + local_side,
                    coupling: c,
                };
            }
        }
        best
    }
}
