//! Time stepping and Newton iteration of the XFEM fluid.
//!
//! Every time step recuts the background mesh at the new interface pose, builds the nodal
//! dof-sets of the new cut and transfers the state of the previous step onto them before the
//! nonlinear iteration starts. If neither the interfaces nor the background mesh moved, the
//! previous cut and dof layout are kept.
use crate::analytical::ExactSolution;
use crate::assembly::{assemble_system, AssemblyData, EvaluationState};
use crate::boundary::BoundaryConditions;
use crate::config::{ConvergenceParameters, LinearSolverKind, LinearSolverParameters, Predictor, XFluidParameters};
use crate::coupling::ConditionManager;
use crate::cut::CutWizard;
use crate::dofset::{DofSetManager, GlobalDofMap};
use crate::error::XFluidError;
use crate::error_norms::{ErrorEvaluation, ErrorNorms};
use crate::function::VectorField;
use crate::initial::{InitialField, InitialFieldContext};
use crate::io::restart::RestartBundle;
use crate::io::{gmsh, vtk};
use crate::kernel::KernelContext;
use crate::krylov_projector::KrylovProjector;
use crate::lift_drag::{compute_forces, CouplingForce};
use crate::mesh::{HexMesh, MeshFaces};
use crate::nalgebra::{DVector, Vector3};
use crate::state::{AssembledSystem, StateSnapshot};
use crate::timint::{
    compute_accelerations, compute_history, evaluation_acceleration, evaluation_velocity, explicit_predictor,
    grid_velocity, TimeParams,
};
use crate::transfer::{
    Discretization, EmbeddedField, FieldTransfer, SemiLagrangeData, TransferRequest, TransferStatistics,
};
use eyre::{eyre, WrapErr};
use log::{debug, info, warn};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use xfluid_sparse::csr::{zero_masked_entries, InfNormScaling};
use xfluid_sparse::{
    solve_dense_lu, ConjugateGradient, Gmres, Ilu0, Jacobi, LinearOperator, SolveError, SolveErrorKind,
    SolverOutput,
};

/// Denominators of relative increments are clamped to this value.
const MIN_NORM: f64 = 1e-5;

/// Nodal displacement history of a moving background mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AleState {
    pub dispnp: Vec<Vector3<f64>>,
    pub dispn: Vec<Vector3<f64>>,
    pub dispnm: Vec<Vector3<f64>>,
    pub gridvnp: Vec<Vector3<f64>>,
    pub gridvn: Vec<Vector3<f64>>,
}

impl AleState {
    pub fn new(num_nodes: usize) -> Self {
        let zeros = vec![Vector3::zeros(); num_nodes];
        Self {
            dispnp: zeros.clone(),
            dispn: zeros.clone(),
            dispnm: zeros.clone(),
            gridvnp: zeros.clone(),
            gridvn: zeros,
        }
    }

    fn cycle(&mut self) {
        self.dispnm = std::mem::replace(&mut self.dispn, self.dispnp.clone());
        self.gridvn = self.gridvnp.clone();
    }
}

/// Norms monitored by the Newton iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceNorms {
    pub velocity_residual: f64,
    pub pressure_residual: f64,
    /// `||Δu|| / ||u||`
    pub velocity_increment: f64,
    /// `||Δp|| / ||p||`
    pub pressure_increment: f64,
}

impl ConvergenceNorms {
    pub fn compute(residual: &DVector<f64>, increment: &DVector<f64>, velnp: &DVector<f64>) -> Self {
        let (res_u, res_p) = StateSnapshot::split_velocity_pressure(residual);
        let (inc_u, inc_p) = StateSnapshot::split_velocity_pressure(increment);
        let (u, p) = StateSnapshot::split_velocity_pressure(velnp);
        let clamp = |norm: f64| if norm < MIN_NORM { 1.0 } else { norm };
        Self {
            velocity_residual: res_u.norm(),
            pressure_residual: res_p.norm(),
            velocity_increment: inc_u.norm() / clamp(u.norm()),
            pressure_increment: inc_p.norm() / clamp(p.norm()),
        }
    }

    pub fn satisfies(&self, tolerances: &ConvergenceParameters) -> bool {
        self.velocity_residual <= tolerances.velrestol
            && self.pressure_residual <= tolerances.presrestol
            && self.velocity_increment <= tolerances.velinctol
            && self.pressure_increment <= tolerances.presinctol
    }

    /// Largest of the four monitored quantities.
    pub fn max(&self) -> f64 {
        self.velocity_residual
            .max(self.pressure_residual)
            .max(self.velocity_increment)
            .max(self.pressure_increment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewtonReport {
    /// Number of assembled iterates, including the one that was checked last.
    pub iterations: usize,
    pub linear_solves: usize,
    pub converged: bool,
    pub norms: ConvergenceNorms,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: usize,
    pub time: f64,
    pub newton: NewtonReport,
    /// Statistics of the transfer onto the cut of this step, if the cut changed.
    pub transfer: Option<TransferStatistics>,
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step {} (t = {:.6}): {} after {} iterations",
            self.step,
            self.time,
            if self.newton.converged { "converged" } else { "not converged" },
            self.newton.iterations
        )
    }
}

/// The monolithic XFEM fluid solver.
pub struct XFluidSolver {
    mesh: HexMesh,
    faces: MeshFaces,
    params: XFluidParameters,
    conditions: ConditionManager,
    boundary: BoundaryConditions,
    body_force: VectorField,
    dofsets: DofSetManager,
    wizard: CutWizard,
    state: StateSnapshot,
    time: TimeParams,
    transfer: FieldTransfer,
    ale: Option<AleState>,
    embedded: Option<Box<dyn EmbeddedField>>,
    projector: Option<KrylovProjector>,
    update_projection: bool,
    last_transfer: Option<TransferStatistics>,
}

impl fmt::Debug for XFluidSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XFluidSolver")
            .field("step", &self.time.step)
            .field("time", &self.time.time)
            .field("num_dofs", &self.state.num_dofs())
            .field("ale", &self.ale.is_some())
            .finish_non_exhaustive()
    }
}

fn cut_background(
    mesh: &HexMesh,
    displacement: Option<&[Vector3<f64>]>,
    conditions: &ConditionManager,
    params: &XFluidParameters,
) -> Result<(CutWizard, GlobalDofMap), XFluidError> {
    let wizard = if conditions.has_cutters() {
        CutWizard::cut(mesh, displacement, conditions, &params.cut)?
    } else {
        CutWizard::uncut(mesh, displacement)
    };
    let dofmap = GlobalDofMap::build(
        mesh,
        &wizard,
        conditions.material(),
        params.dofset_strategy,
        params.max_dofsets_per_node,
    )?;
    Ok((wizard, dofmap))
}

/// Whether two cuts of the same background mesh coincide node by node.
fn same_cut(a: &CutWizard, b: &CutWizard) -> bool {
    a.same_topology(b)
        && a.boundary_cells().len() == b.boundary_cells().len()
        && a.node_coordinates() == b.node_coordinates()
        && (0..a.node_coordinates().len()).all(|node| a.node_phi(node) == b.node_phi(node))
}

fn finish_krylov(output: Result<SolverOutput<f64>, SolveError<f64>>, name: &str) -> eyre::Result<()> {
    match output {
        Ok(output) => {
            debug!(
                "{name} converged after {} iterations (relative residual {:.3e})",
                output.num_iterations, output.relative_residual
            );
            Ok(())
        }
        Err(SolveError {
            output,
            kind: SolveErrorKind::MaxIterationsReached { max_iter },
            ..
        }) => {
            warn!(
                "{name} did not converge within {max_iter} iterations (relative residual {:.3e})",
                output.relative_residual
            );
            Ok(())
        }
        Err(err) => Err(eyre!("{name} failed: {}", err)),
    }
}

fn gmres<A, P>(
    params: &LinearSolverParameters,
    operator: A,
    preconditioner: P,
    rhs: &DVector<f64>,
    tolerance: f64,
) -> eyre::Result<DVector<f64>>
where
    A: LinearOperator<f64>,
    P: LinearOperator<f64>,
{
    let mut x = DVector::zeros(rhs.len());
    let output = Gmres::new()
        .with_operator(operator)
        .with_preconditioner(preconditioner)
        .with_restart(params.gmres_restart)
        .with_tolerance(tolerance)
        .with_max_iter(params.max_iterations)
        .solve_with_guess(rhs, &mut x);
    finish_krylov(output, "GMRES")?;
    Ok(x)
}

/// Solves `A x = b`, iterating on `Pᵀ A` if a projector is given.
pub fn solve_linear_system(
    params: &LinearSolverParameters,
    matrix: &CsrMatrix<f64>,
    rhs: &DVector<f64>,
    projector: Option<&KrylovProjector>,
    tolerance: f64,
) -> eyre::Result<DVector<f64>> {
    let mut x = match params.kind {
        LinearSolverKind::GmresIlu => {
            let ilu = Ilu0::from_csr(matrix).wrap_err("ILU(0) factorization of the system matrix failed")?;
            match projector {
                Some(projector) => gmres(params, projector.project_operator(matrix), &ilu, rhs, tolerance)?,
                None => gmres(params, matrix, &ilu, rhs, tolerance)?,
            }
        }
        LinearSolverKind::GmresJacobi => {
            let jacobi = Jacobi::from_csr(matrix);
            match projector {
                Some(projector) => gmres(params, projector.project_operator(matrix), &jacobi, rhs, tolerance)?,
                None => gmres(params, matrix, &jacobi, rhs, tolerance)?,
            }
        }
        LinearSolverKind::Cg => {
            let mut x = DVector::zeros(rhs.len());
            let output = ConjugateGradient::new()
                .with_operator(matrix)
                .with_tolerance(tolerance)
                .with_max_iter(params.max_iterations)
                .solve_with_guess(rhs, &mut x);
            finish_krylov(output, "CG")?;
            x
        }
        LinearSolverKind::DenseLu => {
            solve_dense_lu(matrix, rhs).ok_or_else(|| eyre!("dense LU solve failed: singular system matrix"))?
        }
    };
    if let Some(projector) = projector {
        projector.apply_p(&mut x);
    }
    Ok(x)
}

impl XFluidSolver {
    /// Sets up the solver and cuts the background mesh at `t = 0`.
    pub fn new(
        mesh: HexMesh,
        params: XFluidParameters,
        mut conditions: ConditionManager,
        boundary: BoundaryConditions,
    ) -> eyre::Result<Self> {
        params.validate()?;
        conditions.setup(&params)?;
        conditions.set_time(0.0);
        let faces = MeshFaces::from_mesh(&mesh);
        let (wizard, dofmap) =
            cut_background(&mesh, None, &conditions, &params).wrap_err("failed to cut the initial configuration")?;
        let dofmap = Arc::new(dofmap);
        let state = StateSnapshot::new(0, Arc::clone(&dofmap));
        info!(
            "Initial cut: {} cut elements, {} nodal dof-sets, {} dofs",
            (0..wizard.num_elements()).filter(|&e| wizard.is_cut(e)).count(),
            dofmap.num_slots(),
            dofmap.num_dofs()
        );
        Ok(Self {
            time: TimeParams::new(&params.time),
            transfer: FieldTransfer::new(params.transfer, params.ghost_penalty.reconstruction_factor),
            dofsets: DofSetManager::new(dofmap.as_ref().clone()),
            mesh,
            faces,
            params,
            conditions,
            boundary,
            body_force: VectorField::zero(),
            wizard,
            state,
            ale: None,
            embedded: None,
            projector: None,
            update_projection: true,
            last_transfer: None,
        })
    }

    pub fn with_body_force(mut self, body_force: impl Into<VectorField>) -> Self {
        self.body_force = body_force.into();
        self
    }

    /// Lets the background mesh move. Displacements are set with
    /// [`set_mesh_displacement`](Self::set_mesh_displacement) before each step.
    pub fn with_ale(mut self) -> Self {
        self.ale = Some(AleState::new(self.mesh.num_vertices()));
        self
    }

    /// Field used by projection-based transfer schemes.
    pub fn with_embedded_field(mut self, field: Box<dyn EmbeddedField>) -> Self {
        self.embedded = Some(field);
        self
    }

    pub fn mesh(&self) -> &HexMesh {
        &self.mesh
    }

    pub fn params(&self) -> &XFluidParameters {
        &self.params
    }

    pub fn conditions(&self) -> &ConditionManager {
        &self.conditions
    }

    pub fn conditions_mut(&mut self) -> &mut ConditionManager {
        &mut self.conditions
    }

    pub fn wizard(&self) -> &CutWizard {
        &self.wizard
    }

    pub fn dofmap(&self) -> &GlobalDofMap {
        self.state.dofmap()
    }

    pub fn state(&self) -> &StateSnapshot {
        &self.state
    }

    pub fn time(&self) -> &TimeParams {
        &self.time
    }

    pub fn ale(&self) -> Option<&AleState> {
        self.ale.as_ref()
    }

    pub fn projector(&self) -> Option<&KrylovProjector> {
        self.projector.as_ref()
    }

    pub fn transfer_statistics(&self) -> TransferStatistics {
        self.transfer.total_statistics()
    }

    fn displacement(&self) -> Option<&[Vector3<f64>]> {
        self.ale.as_ref().map(|ale| ale.dispnp.as_slice())
    }

    fn grid_velocity(&self) -> Option<&[Vector3<f64>]> {
        self.ale.as_ref().map(|ale| ale.gridvnp.as_slice())
    }

    /// Prescribes the background mesh displacement at the end of the current step.
    pub fn set_mesh_displacement(&mut self, dispnp: Vec<Vector3<f64>>) -> Result<(), XFluidError> {
        let num_vertices = self.mesh.num_vertices();
        let Some(ale) = self.ale.as_mut() else {
            return Err(XFluidError::Configuration(
                "mesh displacement given for a solver without a moving background mesh".into(),
            ));
        };
        if dispnp.len() != num_vertices {
            return Err(XFluidError::Configuration(format!(
                "mesh displacement has {} entries for {num_vertices} nodes",
                dispnp.len()
            )));
        }
        ale.dispnp = dispnp;
        Ok(())
    }

    /// Sets the initial velocity and pressure on the current cut.
    pub fn set_initial_field(&mut self, field: &InitialField) -> eyre::Result<()> {
        let context = InitialFieldContext {
            mesh: &self.mesh,
            faces: &self.faces,
            displacement: self.ale.as_ref().map(|ale| ale.dispnp.as_slice()),
            wizard: &self.wizard,
            material: self.conditions.material(),
            reconstruction_factor: self.params.ghost_penalty.reconstruction_factor,
        };
        field.apply(&context, &mut self.state)
    }

    /// Advances time, sets `theta`, moves the interfaces and runs the explicit predictor.
    pub fn prepare_time_step(&mut self) -> Result<(), XFluidError> {
        self.time.advance(self.params.time.dt);
        self.time.set_theta(&self.params.time)?;
        info!(
            "==================== time step {} (t = {:.6}, dt = {:.3e}, theta = {:.4}) ====================",
            self.time.step, self.time.time, self.time.dt, self.time.theta
        );

        if self.time.step > 1 && !self.time.is_stationary() {
            let state = &mut self.state;
            let predicted =
                explicit_predictor(self.params.time.predictor, &self.time, &state.veln, &state.velnm, &state.accn);
            if let Some(velnp) = predicted {
                state.velnp = velnp;
            }
        }
        self.conditions.set_time(self.time.time);
        Ok(())
    }

    /// Recuts at the new interface pose, transfers the state onto the new dof-sets and applies
    /// the boundary conditions of the new time level.
    pub fn prepare_xfem_solve(&mut self) -> eyre::Result<()> {
        if let Some(ale) = self.ale.as_mut() {
            ale.gridvnp = grid_velocity(&self.time, &ale.dispnp, &ale.dispn, &ale.dispnm, &ale.gridvn);
        }

        let (wizard, dofmap) = cut_background(&self.mesh, self.displacement(), &self.conditions, &self.params)
            .wrap_err_with(|| format!("failed to cut the background mesh in step {}", self.time.step))?;

        self.last_transfer = None;
        if same_cut(&self.wizard, &wizard) {
            debug!("Cut unchanged, keeping {} nodal dof-sets", self.state.dofmap().num_slots());
            self.state = self.state.successor();
        } else {
            self.install_cut_between_steps(wizard, dofmap)?;
        }

        let state = &mut self.state;
        state.hist = compute_history(&self.time, &state.veln, &state.velnm, &state.accn);
        state.dirichlet = self.boundary.dirichlet_mask(&self.mesh, state.dofmap());
        let dofmap = state.shared_dofmap();
        self.boundary
            .apply_dirichlet_values(&self.mesh, &dofmap, self.time.time, &mut state.velnp);

        if self.params.time.predictor == Predictor::TangVel && self.time.step > 1 && !self.time.is_stationary() {
            self.predict_tangent_velocity()
                .wrap_err_with(|| format!("TangVel predictor failed in step {}", self.time.step))?;
        }
        Ok(())
    }

    /// Linearized step from the old time level towards the new Dirichlet values.
    ///
    /// Expects `velnp` to hold the Dirichlet values of the new time level. The free velocity
    /// dofs follow from one linear solve with the reaction of the Dirichlet increment on the
    /// right-hand side; pressures keep their old values and `accnp` is made consistent.
    fn predict_tangent_velocity(&mut self) -> eyre::Result<()> {
        info!("Running the TangVel predictor");
        let num_dofs = self.state.num_dofs();
        let mut dbcinc = DVector::zeros(num_dofs);
        {
            let state = &mut self.state;
            for (dof, &constrained) in state.dirichlet.iter().enumerate() {
                if constrained {
                    dbcinc[dof] = state.velnp[dof] - state.veln[dof];
                }
            }
            state.velnp = state.veln.clone();
            state.accnp = state.accn.clone();
        }

        let system = self.assemble()?;
        if self.update_projection || self.ale.is_some() {
            self.rebuild_projector(&system)?;
        }
        let mut rhs = &system.rhs - &system.matrix * &dbcinc;
        zero_masked_entries(&mut rhs, &self.state.dirichlet);
        if let Some(projector) = &self.projector {
            projector.apply_pt(&mut rhs);
        }
        let tolerance = self.params.linear_solver.tolerance;
        let increment =
            solve_linear_system(&self.params.linear_solver, &system.matrix, &rhs, self.projector.as_ref(), tolerance)?;

        let state = &mut self.state;
        state.velnp = &state.veln + increment + dbcinc;
        for dof in (0..num_dofs).filter(|&dof| GlobalDofMap::is_pressure_dof(dof)) {
            state.velnp[dof] = state.veln[dof];
        }
        state.accnp = compute_accelerations(&self.time, &state.velnp, &state.veln, &state.velnm, &state.accn);
        Ok(())
    }

    fn install_cut_between_steps(&mut self, wizard: CutWizard, dofmap: GlobalDofMap) -> eyre::Result<()> {
        let dofmap = Arc::new(dofmap);
        let mut new_state = StateSnapshot::new(0, Arc::clone(&dofmap));
        let num_dofs = dofmap.num_dofs();
        // Values of the previous step are not subject to the new Dirichlet conditions
        let free = vec![false; num_dofs];
        {
            let old = &self.state;
            let old_displacement = self.ale.as_ref().map(|ale| ale.dispn.as_slice());
            let scheme = self.params.transfer.scheme;
            let request = TransferRequest {
                scheme,
                source: Discretization {
                    mesh: &self.mesh,
                    displacement: old_displacement,
                    wizard: &self.wizard,
                    dofmap: old.dofmap(),
                },
                target: Discretization {
                    mesh: &self.mesh,
                    displacement: self.ale.as_ref().map(|ale| ale.dispnp.as_slice()),
                    wizard: &wizard,
                    dofmap: &dofmap,
                },
                faces: &self.faces,
                sources: vec![&old.veln, &old.velnm, &old.accn, &old.velnp],
                dirichlet: &free,
                semi_lagrange: scheme.uses_semi_lagrange().then_some(SemiLagrangeData {
                    dt: self.time.dt,
                    theta: 0.0,
                    target_velocity: None,
                }),
                embedded: self.embedded.as_deref(),
            };
            let initial = vec![DVector::zeros(num_dofs); 4];
            let output = self
                .transfer
                .transfer(&request, initial)
                .wrap_err_with(|| format!("field transfer onto the cut of step {} failed", self.time.step))?;
            let [veln, velnm, accn, velnp]: [DVector<f64>; 4] = output
                .vectors
                .try_into()
                .map_err(|_| eyre!("field transfer returned an unexpected number of vectors"))?;
            new_state.veln = veln;
            new_state.velnm = velnm;
            new_state.accn = accn;
            new_state.velnp = velnp;
            self.last_transfer = Some(output.statistics);
        }

        self.dofsets.update(dofmap.as_ref().clone());
        if self.dofsets.dofsets_changed() {
            info!("Nodal dof-sets changed: {} dofs", num_dofs);
        }
        self.dofsets.release_previous();
        self.wizard = wizard;
        self.state = new_state;
        self.update_projection = true;
        Ok(())
    }

    /// Recuts within a time step after the interfaces were moved to a new iterate.
    ///
    /// Only `velnp` is transferred with the within-step scheme; the values of the previous time
    /// level are carried over by copy and ghost-penalty extension. If the transfer of `velnp`
    /// fails, `velnp` and `accnp` restart from `veln` and `accn`. Returns whether the Newton
    /// iteration has to be restarted.
    pub fn update_interface_within_step(&mut self, first_call: bool) -> eyre::Result<bool> {
        let (wizard, dofmap) = cut_background(&self.mesh, self.displacement(), &self.conditions, &self.params)?;
        if same_cut(&self.wizard, &wizard) {
            return Ok(false);
        }
        let dofmap = Arc::new(dofmap);
        let num_dofs = dofmap.num_dofs();
        let mut new_state = StateSnapshot::new(self.state.iteration() + 1, Arc::clone(&dofmap));
        new_state.dirichlet = self.boundary.dirichlet_mask(&self.mesh, &dofmap);
        let mut velnp_initial = DVector::zeros(num_dofs);
        self.boundary
            .apply_dirichlet_values(&self.mesh, &dofmap, self.time.time, &mut velnp_initial);

        let source = Discretization {
            mesh: &self.mesh,
            displacement: self.displacement(),
            wizard: &self.wizard,
            dofmap: self.state.dofmap(),
        };
        let target = Discretization {
            mesh: &self.mesh,
            displacement: self.displacement(),
            wizard: &wizard,
            dofmap: &dofmap,
        };

        let free = vec![false; num_dofs];
        let history = TransferRequest {
            scheme: self.transfer.within_step_scheme(false),
            source,
            target,
            faces: &self.faces,
            sources: vec![&self.state.veln, &self.state.velnm, &self.state.accn, &self.state.accnp],
            dirichlet: &free,
            semi_lagrange: None,
            embedded: None,
        };
        let output = self.transfer.transfer(&history, vec![DVector::zeros(num_dofs); 4])?;
        let mut restart = output.newton_restart_required;
        let [veln, velnm, accn, accnp]: [DVector<f64>; 4] = output
            .vectors
            .try_into()
            .map_err(|_| eyre!("field transfer returned an unexpected number of vectors"))?;

        let scheme = self.transfer.within_step_scheme(first_call);
        let increment = TransferRequest {
            scheme,
            source,
            target,
            faces: &self.faces,
            sources: vec![&self.state.velnp],
            dirichlet: &new_state.dirichlet,
            semi_lagrange: (first_call && scheme.uses_semi_lagrange()).then_some(SemiLagrangeData {
                dt: self.time.dt,
                theta: 0.0,
                target_velocity: None,
            }),
            embedded: self.embedded.as_deref(),
        };
        match self.transfer.transfer(&increment, vec![velnp_initial]) {
            Ok(output) => {
                restart |= output.newton_restart_required;
                new_state.velnp = output.vectors.into_iter().next().unwrap_or_else(|| veln.clone());
                new_state.accnp = accnp;
            }
            Err(err) => {
                warn!("Transfer of the velocity iterate failed ({err:#}), restarting from the previous time level");
                new_state.velnp = veln.clone();
                new_state.accnp = accn.clone();
                restart = true;
            }
        }
        new_state.veln = veln;
        new_state.velnm = velnm;
        new_state.accn = accn;
        new_state.hist = compute_history(&self.time, &new_state.veln, &new_state.velnm, &new_state.accn);
        self.boundary
            .apply_dirichlet_values(&self.mesh, &dofmap, self.time.time, &mut new_state.velnp);

        self.dofsets.update(dofmap.as_ref().clone());
        restart |= self.dofsets.dofsets_changed();
        self.dofsets.release_previous();
        self.wizard = wizard;
        self.state = new_state;
        self.update_projection = true;
        Ok(restart)
    }

    /// Builds the projector of the configured Krylov condition for the current cut.
    ///
    /// The matrix must annihilate the constant pressure mode. Flows with an outflow boundary
    /// determine the pressure and are rejected.
    fn rebuild_projector(&mut self, system: &AssembledSystem) -> eyre::Result<()> {
        let Some(condition) = self.params.krylov_condition() else {
            return Ok(());
        };
        self.projector = KrylovProjector::build(
            condition.weights,
            &self.mesh,
            self.displacement(),
            &self.wizard,
            self.state.dofmap(),
            &system.empty_rows,
        )?;
        match &self.projector {
            Some(projector) => {
                projector
                    .check_nullspace(&system.matrix, self.params.nullspace_tolerance)
                    .wrap_err("Krylov projection requested, but the system has no undetermined pressure mode")?;
            }
            None => warn!("Krylov projection requested, but the pressure mode has no support"),
        }
        self.update_projection = false;
        Ok(())
    }

    fn assemble(&self) -> Result<AssembledSystem, XFluidError> {
        let state = &self.state;
        let velocity = evaluation_velocity(&self.time, &state.velnp, &state.veln);
        let acceleration = evaluation_acceleration(&self.time, &state.velnp, &state.veln, &state.accn, &state.hist);
        let data = AssemblyData {
            mesh: &self.mesh,
            displacement: self.displacement(),
            grid_velocity: self.grid_velocity(),
            wizard: &self.wizard,
            dofmap: state.dofmap(),
            conditions: &self.conditions,
            params: &self.params,
            context: KernelContext {
                time: &self.time,
                stabilization: &self.params.stabilization,
                linearization: self.params.linearization,
                body_force: &self.body_force,
            },
            state: EvaluationState {
                velocity: &velocity,
                pressure: &state.velnp,
                acceleration: &acceleration,
            },
        };
        assemble_system(&data, &self.faces, &self.boundary, &state.dirichlet)
    }

    /// Newton iteration on the current cut.
    ///
    /// Reaching `itemax` without convergence is not an error.
    pub fn solve(&mut self) -> eyre::Result<NewtonReport> {
        let convergence = self.params.convergence;
        let ittol = convergence
            .velrestol
            .min(convergence.presrestol)
            .min(convergence.velinctol)
            .min(convergence.presinctol);
        info!(
            "| step/max |  vel-res   |  pre-res   |  vel-inc   |  pre-inc   |  (tol {:.3e} {:.3e} {:.3e} {:.3e})",
            convergence.velrestol, convergence.presrestol, convergence.velinctol, convergence.presinctol
        );

        let mut increment = DVector::zeros(self.state.num_dofs());
        let mut linear_solves = 0;
        let mut iteration = 0;
        loop {
            iteration += 1;
            let mut system = self
                .assemble()
                .wrap_err_with(|| format!("assembly failed in iteration {iteration}"))?;

            if self.update_projection || self.ale.is_some() {
                self.rebuild_projector(&system)?;
            }
            if let Some(projector) = &self.projector {
                projector.apply_pt(&mut system.rhs);
            }

            if increment.len() != system.rhs.len() {
                increment = DVector::zeros(system.rhs.len());
            }
            let norms = ConvergenceNorms::compute(&system.rhs, &increment, &self.state.velnp);
            let converged = iteration > 1 && norms.satisfies(&convergence);
            if iteration == 1 {
                info!(
                    "|  --/{:3}  | {:10.3e} | {:10.3e} |     --     |     --     |",
                    convergence.itemax, norms.velocity_residual, norms.pressure_residual
                );
            } else {
                info!(
                    "| {:3}/{:3}  | {:10.3e} | {:10.3e} | {:10.3e} | {:10.3e} |",
                    iteration,
                    convergence.itemax,
                    norms.velocity_residual,
                    norms.pressure_residual,
                    norms.velocity_increment,
                    norms.pressure_increment
                );
            }
            if self.params.output.gmsh {
                self.write_gmsh_dump("residual", iteration, &system.rhs)?;
            }

            if converged || iteration >= convergence.itemax {
                if !converged {
                    warn!(
                        "Newton iteration of step {} not converged in {} iterations",
                        self.time.step, convergence.itemax
                    );
                }
                self.state.system = Some(system);
                return Ok(NewtonReport {
                    iterations: iteration,
                    linear_solves,
                    converged,
                    norms,
                });
            }

            let mut tolerance = self.params.linear_solver.tolerance;
            if convergence.adaptconv && iteration > 1 {
                tolerance = tolerance.max(convergence.adaptconv_better * norms.max().max(ittol));
                debug!("Adaptive linear solver tolerance {tolerance:.3e}");
            }

            if let Some(projector) = &self.projector {
                projector.check_nullspace(&system.matrix, self.params.nullspace_tolerance)?;
            }

            let mut matrix = system.matrix.clone();
            let mut rhs = system.rhs.clone();
            let scaling = (self.params.linear_solver.scale_before_solve && self.projector.is_none()).then(|| {
                let scaling = InfNormScaling::compute(&matrix);
                scaling.scale_system(&mut matrix, &mut rhs);
                scaling
            });
            increment = solve_linear_system(
                &self.params.linear_solver,
                &matrix,
                &rhs,
                self.projector.as_ref(),
                tolerance,
            )
            .wrap_err_with(|| format!("linear solve failed in step {} iteration {iteration}", self.time.step))?;
            if let Some(scaling) = &scaling {
                scaling.unscale_solution(&mut increment);
            }
            linear_solves += 1;

            self.state.velnp += &increment;
            if self.time.scheme.is_generalized_alpha() {
                let state = &mut self.state;
                state.accnp = compute_accelerations(&self.time, &state.velnp, &state.veln, &state.velnm, &state.accn);
            }
            self.state.system = Some(system);
        }
    }

    /// Computes the accelerations at the new time level and cycles all state vectors.
    pub fn time_update(&mut self) {
        let state = &mut self.state;
        state.accnp = compute_accelerations(&self.time, &state.velnp, &state.veln, &state.velnm, &state.accn);
        state.velnm = std::mem::replace(&mut state.veln, state.velnp.clone());
        state.accn = state.accnp.clone();
        if let Some(ale) = self.ale.as_mut() {
            ale.cycle();
        }
        self.conditions.update_state_vectors();
    }

    /// One complete time step.
    pub fn step(&mut self) -> eyre::Result<StepReport> {
        self.prepare_time_step()?;
        self.prepare_xfem_solve()?;
        let newton = self.solve()?;
        self.time_update();
        self.write_output()?;
        let report = StepReport {
            step: self.time.step,
            time: self.time.time,
            newton,
            transfer: self.last_transfer.clone(),
        };
        info!("{report}");
        Ok(report)
    }

    /// Runs time steps until `num_steps` or `max_time` is reached.
    pub fn integrate(&mut self) -> eyre::Result<Vec<StepReport>> {
        let mut reports = Vec::new();
        let time_params = &self.params.time;
        let (num_steps, max_time) = (time_params.num_steps, time_params.max_time);
        // Guard against accumulated round-off in the time
        while self.time.step < num_steps && self.time.time + 1e-12 * self.time.dt.abs() < max_time {
            reports.push(self.step()?);
        }
        Ok(reports)
    }

    /// Solves a stationary problem with a single nonlinear solve.
    pub fn solve_stationary(&mut self) -> eyre::Result<NewtonReport> {
        if !self.time.is_stationary() {
            return Err(XFluidError::Configuration(
                "solve_stationary requires the stationary time integration scheme".into(),
            )
            .into());
        }
        Ok(self.step()?.newton)
    }

    /// Hydrodynamic forces on every coupling for the current `velnp`.
    pub fn lift_drag(&self) -> Result<Vec<CouplingForce>, XFluidError> {
        compute_forces(
            &self.mesh,
            self.displacement(),
            &self.wizard,
            self.state.dofmap(),
            &self.conditions,
            &self.state.velnp,
        )
    }

    /// Error norms of `velnp` against an analytical solution at the current time.
    pub fn evaluate_errors(&self, exact: &dyn ExactSolution) -> Result<ErrorNorms, XFluidError> {
        let sigma = if self.time.is_stationary() {
            0.0
        } else {
            1.0 / (self.time.theta * self.time.dt)
        };
        let evaluation = ErrorEvaluation {
            mesh: &self.mesh,
            displacement: self.displacement(),
            wizard: &self.wizard,
            dofmap: self.state.dofmap(),
            conditions: &self.conditions,
            sigma,
        };
        let norms = evaluation.compute(&self.state.velnp, exact, self.time.time)?;
        info!("Error norms at t = {:.6}:\n{norms}", self.time.time);
        Ok(norms)
    }

    fn write_gmsh_dump(&self, name: &str, iteration: usize, vector: &DVector<f64>) -> eyre::Result<()> {
        let Some(directory) = &self.params.output.directory else {
            return Ok(());
        };
        let path = directory.join(format!("{name}_step{:04}_it{:02}.pos", self.time.step, iteration));
        gmsh::write_state_dump(&path, name, self.time.step, iteration, &self.wizard, self.state.dofmap(), vector)
    }

    fn write_output(&self) -> eyre::Result<()> {
        let output = &self.params.output;
        let Some(directory) = &output.directory else {
            return Ok(());
        };
        let step = self.time.step;
        if output.vtk_interval > 0 && step % output.vtk_interval == 0 {
            vtk::write_background_vtk(
                directory.join(format!("fluid_{step:04}.vtk")),
                &self.mesh,
                self.displacement(),
                self.state.dofmap(),
                &self.state.velnp,
            )?;
            if !self.wizard.boundary_cells().is_empty() {
                vtk::write_boundary_cells_vtk(directory.join(format!("interface_{step:04}.vtk")), &self.wizard)?;
            }
        }
        if output.restart_interval > 0 && step % output.restart_interval == 0 {
            self.write_restart(directory.join(format!("restart_{step:04}.json")))?;
        }
        if output.gmsh {
            self.write_gmsh_dump("velnp", 0, &self.state.velnp)?;
        }
        Ok(())
    }

    pub fn restart_bundle(&self) -> RestartBundle {
        let to_vec = |v: &DVector<f64>| v.as_slice().to_vec();
        let state = &self.state;
        RestartBundle {
            step: self.time.step,
            time: self.time.time,
            dt_previous: self.time.dt_previous,
            velnp: to_vec(&state.velnp),
            veln: to_vec(&state.veln),
            velnm: to_vec(&state.velnm),
            accnp: to_vec(&state.accnp),
            accn: to_vec(&state.accn),
            ale: self.ale.clone(),
            interface_states: self.conditions.interface_states(),
            dofsets_per_node: state.dofmap().dofsets_per_node(),
        }
    }

    pub fn write_restart(&self, path: impl AsRef<Path>) -> eyre::Result<()> {
        self.restart_bundle().write_json(path)
    }

    /// Restores the state of a restart bundle.
    ///
    /// The background mesh is recut at the restored interface poses; the resulting dof-set
    /// layout must match the stored one.
    pub fn restore(&mut self, bundle: RestartBundle) -> eyre::Result<()> {
        self.conditions.restore_interface_states(bundle.interface_states.clone())?;
        if let Some(ale) = &bundle.ale {
            if self.ale.is_none() {
                return Err(XFluidError::Configuration(
                    "restart data contains mesh displacements, but the background mesh is fixed".into(),
                )
                .into());
            }
            self.ale = Some(ale.clone());
        }
        let (wizard, dofmap) = cut_background(&self.mesh, self.displacement(), &self.conditions, &self.params)?;
        bundle.check_layout(&dofmap)?;

        let dofmap = Arc::new(dofmap);
        let mut state = StateSnapshot::new(0, Arc::clone(&dofmap));
        let from_vec = |v: &[f64]| DVector::from_column_slice(v);
        state.velnp = from_vec(&bundle.velnp);
        state.veln = from_vec(&bundle.veln);
        state.velnm = from_vec(&bundle.velnm);
        state.accnp = from_vec(&bundle.accnp);
        state.accn = from_vec(&bundle.accn);
        state.dirichlet = self.boundary.dirichlet_mask(&self.mesh, &dofmap);

        self.time.step = bundle.step;
        self.time.time = bundle.time;
        self.time.dt_previous = bundle.dt_previous;
        self.dofsets = DofSetManager::new(dofmap.as_ref().clone());
        self.wizard = wizard;
        self.state = state;
        self.update_projection = true;
        info!("Restarted from step {} at t = {:.6}", bundle.step, bundle.time);
        Ok(())
    }

    pub fn read_restart(&mut self, path: impl AsRef<Path>) -> eyre::Result<()> {
        let bundle = RestartBundle::read_json(path)?;
        self.restore(bundle)
    }
}
