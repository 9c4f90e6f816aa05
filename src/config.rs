//! Solver configuration.
//!
//! All parameters are collected in [`XFluidParameters`], which is deserialized from JSON or
//! built in code, validated once at setup and passed by reference from then on.
use crate::error::XFluidError;
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Weak enforcement of interface conditions on boundary cells.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouplingMethod {
    HybridLmCauchyStress,
    HybridLmViscousStress,
    Nitsche,
}

/// Rule deciding how each new nodal dof-set receives values when the interface moves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum XFluidTimeIntScheme {
    StdByCopyAndGhostByCopyOrGp,
    StdByCopyOrProjAndGhostByProjOrCopyOrGp,
    StdBySlAndGhostByGp,
    StdByCopyOrSlAndGhostByCopyOrGp,
    StdByCopyAndGhostByGp,
}

impl XFluidTimeIntScheme {
    pub fn uses_semi_lagrange(&self) -> bool {
        matches!(self, Self::StdBySlAndGhostByGp | Self::StdByCopyOrSlAndGhostByCopyOrGp)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predictor {
    SteadyState,
    ZeroAcceleration,
    ConstantAcceleration,
    ConstantIncrement,
    ExplicitSecondOrderMidpoint,
    TangVel,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeIntegrationScheme {
    Stationary,
    OneStepTheta,
    Bdf2,
    AfGenAlpha,
    NpGenAlpha,
}

impl TimeIntegrationScheme {
    pub fn is_generalized_alpha(&self) -> bool {
        matches!(self, Self::AfGenAlpha | Self::NpGenAlpha)
    }

    pub fn is_stationary(&self) -> bool {
        matches!(self, Self::Stationary)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodalDofSetStrategy {
    /// All patches of the same position at a node share one dof-set.
    OneDofsetPerNodeAndPosition,
    /// One dof-set per connected phase patch.
    ConnectedComponentBased,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linearization {
    Newton,
    FixedPoint,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearSolverKind {
    GmresIlu,
    GmresJacobi,
    Cg,
    DenseLu,
}

/// How the weight vector of the pressure nullspace projector is built.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KrylovWeights {
    PointValues,
    Integration,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct KrylovCondition {
    /// Components (three velocities, pressure) spanned by the nullspace mode.
    pub mode: [bool; 4],
    pub weights: KrylovWeights,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostPenaltyParameters {
    pub stab: bool,
    pub transient_stab: bool,
    pub second_order_stab: bool,
    pub add_inner_faces: bool,
    pub viscous_factor: f64,
    pub transient_factor: f64,
    pub pressure_factor: f64,
    pub second_order_factor: f64,
    /// Penalty factor of the unscaled jumps used for reconstruction.
    pub reconstruction_factor: f64,
}

impl Default for GhostPenaltyParameters {
    fn default() -> Self {
        Self {
            stab: true,
            transient_stab: true,
            second_order_stab: false,
            add_inner_faces: false,
            viscous_factor: 0.05,
            transient_factor: 0.005,
            pressure_factor: 0.05,
            second_order_factor: 0.05,
            reconstruction_factor: 1.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NitscheParameters {
    pub penalty: f64,
    /// `+1` for the adjoint-consistent (symmetric) and `-1` for the skew variant.
    pub adjoint: f64,
    pub inflow_stab: bool,
}

impl Default for NitscheParameters {
    fn default() -> Self {
        Self {
            penalty: 35.0,
            adjoint: 1.0,
            inflow_stab: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutParameters {
    /// Number of sub-hexahedra per direction in which each element is sampled.
    pub refinement: usize,
    pub volume_cubature_degree: usize,
    pub boundary_cubature_degree: usize,
    /// Level-set values below `cut_tolerance * h` in magnitude are moved off the interface.
    pub cut_tolerance: f64,
    /// Allowed deviation of the volume-cell weight sum from the reference volume.
    pub volume_tolerance: f64,
    /// Retry a failed element once with a finer sampling.
    pub fallback: bool,
}

impl Default for CutParameters {
    fn default() -> Self {
        Self {
            refinement: 1,
            volume_cubature_degree: 3,
            boundary_cubature_degree: 3,
            cut_tolerance: 1e-10,
            volume_tolerance: 1e-10,
            fallback: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizationParameters {
    pub pspg: bool,
    pub supg: bool,
    pub grad_div: bool,
}

impl Default for StabilizationParameters {
    fn default() -> Self {
        Self {
            pspg: true,
            supg: true,
            grad_div: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceParameters {
    pub itemax: usize,
    pub velrestol: f64,
    pub velinctol: f64,
    pub presrestol: f64,
    pub presinctol: f64,
    pub adaptconv: bool,
    pub adaptconv_better: f64,
}

impl Default for ConvergenceParameters {
    fn default() -> Self {
        Self {
            itemax: 10,
            velrestol: 1e-6,
            velinctol: 1e-6,
            presrestol: 1e-6,
            presinctol: 1e-6,
            adaptconv: false,
            adaptconv_better: 0.1,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearSolverParameters {
    pub kind: LinearSolverKind,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub gmres_restart: usize,
    pub scale_before_solve: bool,
}

impl Default for LinearSolverParameters {
    fn default() -> Self {
        Self {
            kind: LinearSolverKind::GmresIlu,
            tolerance: 1e-10,
            max_iterations: 2000,
            gmres_restart: 100,
            scale_before_solve: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeParameters {
    pub scheme: TimeIntegrationScheme,
    pub dt: f64,
    pub num_steps: usize,
    pub max_time: f64,
    pub theta: f64,
    /// Number of initial backward Euler steps.
    pub num_start_steps: usize,
    pub alpha_f: f64,
    pub alpha_m: f64,
    pub gamma: f64,
    pub predictor: Predictor,
}

impl Default for TimeParameters {
    fn default() -> Self {
        Self {
            scheme: TimeIntegrationScheme::OneStepTheta,
            dt: 0.01,
            num_steps: 1,
            max_time: f64::MAX,
            theta: 0.66,
            num_start_steps: 0,
            alpha_f: 0.5,
            alpha_m: 0.5,
            gamma: 0.5,
            predictor: Predictor::SteadyState,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferParameters {
    pub scheme: XFluidTimeIntScheme,
    pub check_interfacetips: bool,
    pub check_sliding_on_surface: bool,
    pub sl_max_iterations: usize,
    pub sl_substeps: usize,
    pub gmres_tolerance: f64,
}

impl Default for TransferParameters {
    fn default() -> Self {
        Self {
            scheme: XFluidTimeIntScheme::StdByCopyOrSlAndGhostByCopyOrGp,
            check_interfacetips: true,
            check_sliding_on_surface: true,
            sl_max_iterations: 10,
            sl_substeps: 4,
            gmres_tolerance: 1e-12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputParameters {
    pub directory: Option<PathBuf>,
    pub gmsh: bool,
    pub vtk_interval: usize,
    pub restart_interval: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XFluidParameters {
    pub coupling_method: CouplingMethod,
    pub dofset_strategy: NodalDofSetStrategy,
    pub max_dofsets_per_node: usize,
    pub linearization: Linearization,
    pub stabilization: StabilizationParameters,
    pub ghost_penalty: GhostPenaltyParameters,
    pub nitsche: NitscheParameters,
    pub cut: CutParameters,
    pub time: TimeParameters,
    pub transfer: TransferParameters,
    pub convergence: ConvergenceParameters,
    pub linear_solver: LinearSolverParameters,
    pub krylov_conditions: Vec<KrylovCondition>,
    /// Relative tolerance of the check that the system matrix annihilates the pressure mode.
    pub nullspace_tolerance: f64,
    pub output: OutputParameters,
}

impl Default for XFluidParameters {
    fn default() -> Self {
        Self {
            coupling_method: CouplingMethod::Nitsche,
            dofset_strategy: NodalDofSetStrategy::OneDofsetPerNodeAndPosition,
            max_dofsets_per_node: 3,
            linearization: Linearization::Newton,
            stabilization: StabilizationParameters::default(),
            ghost_penalty: GhostPenaltyParameters::default(),
            nitsche: NitscheParameters::default(),
            cut: CutParameters::default(),
            time: TimeParameters::default(),
            transfer: TransferParameters::default(),
            convergence: ConvergenceParameters::default(),
            linear_solver: LinearSolverParameters::default(),
            krylov_conditions: Vec::new(),
            nullspace_tolerance: 1e-12,
            output: OutputParameters::default(),
        }
    }
}

const PRESSURE_MODE: [bool; 4] = [false, false, false, true];

impl XFluidParameters {
    pub fn from_json_str(json: &str) -> eyre::Result<Self> {
        serde_json::from_str(json).wrap_err("failed to parse solver parameters")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read parameter file {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> eyre::Result<String> {
        serde_json::to_string_pretty(self).wrap_err("failed to serialize solver parameters")
    }

    /// The Krylov projection condition, if any.
    pub fn krylov_condition(&self) -> Option<&KrylovCondition> {
        self.krylov_conditions.first()
    }

    /// Checks the parameters for inconsistencies that must be rejected before solving.
    pub fn validate(&self) -> Result<(), XFluidError> {
        let fail = |msg: &str| Err(XFluidError::Configuration(msg.to_string()));

        if self.ghost_penalty.add_inner_faces && self.dofset_strategy != NodalDofSetStrategy::OneDofsetPerNodeAndPosition {
            return fail("ghost penalty on all inner faces requires the OneDofsetPerNodeAndPosition dof-set strategy");
        }
        if self.krylov_conditions.len() > 1 {
            return fail("more than one pressure nullspace (Krylov) condition given");
        }
        if let Some(condition) = self.krylov_condition() {
            if condition.mode != PRESSURE_MODE {
                return fail("the Krylov condition must select exactly the pressure mode");
            }
        }
        if self.max_dofsets_per_node == 0 {
            return fail("at least one nodal dof-set per node must be allowed");
        }

        let time = &self.time;
        if !time.scheme.is_stationary() {
            if !(time.dt > 0.0) {
                return fail("time step size must be positive");
            }
            if !(time.theta > 0.0 && time.theta <= 1.0) {
                return fail("theta must lie in (0, 1]");
            }
        }
        if time.scheme.is_generalized_alpha() && !(time.alpha_f > 0.0 && time.alpha_m > 0.0 && time.gamma > 0.0) {
            return fail("generalized-alpha parameters must be positive");
        }
        match (time.scheme, time.predictor) {
            (TimeIntegrationScheme::Bdf2, Predictor::TangVel) => {
                return fail("the TangVel predictor is not available for BDF2");
            }
            (TimeIntegrationScheme::Stationary, predictor) if predictor != Predictor::SteadyState => {
                return fail("stationary problems only support the steady_state predictor");
            }
            _ => {}
        }

        let conv = &self.convergence;
        if conv.itemax == 0 {
            return fail("itemax must be at least one");
        }
        if [conv.velrestol, conv.velinctol, conv.presrestol, conv.presinctol]
            .iter()
            .any(|&tol| !(tol > 0.0))
        {
            return fail("convergence tolerances must be positive");
        }
        if conv.adaptconv && !(conv.adaptconv_better > 0.0 && conv.adaptconv_better < 1.0) {
            return fail("ADAPTCONV_BETTER must lie in (0, 1)");
        }

        let cut = &self.cut;
        if cut.refinement == 0 || cut.volume_cubature_degree == 0 || cut.boundary_cubature_degree == 0 {
            return fail("cut refinement and cubature degrees must be positive");
        }
        if self.nitsche.adjoint.abs() != 1.0 {
            return fail("the Nitsche adjoint factor must be +1 or -1");
        }
        if self.linear_solver.gmres_restart == 0 {
            return fail("GMRES restart length must be positive");
        }
        Ok(())
    }
}
