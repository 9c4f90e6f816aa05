use super::{single_fluid, water};
use xfluid::boundary::{BoundaryConditions, BoxFace, DirichletCondition};
use xfluid::config::{
    KrylovCondition, KrylovWeights, LinearSolverKind, Predictor, TimeIntegrationScheme, XFluidParameters,
};
use xfluid::coupling::ConditionManager;
use xfluid::driver::XFluidSolver;
use xfluid::dofset::GlobalDofMap;
use xfluid::error::XFluidError;
use xfluid::function::VectorField;
use xfluid::io::restart::RestartBundle;
use xfluid::mesh::procedural::create_unit_box_uniform_hex_mesh;
use xfluid::nalgebra::{DVector, Vector3};
use xfluid::timint::compute_accelerations;

/// Plane Couette flow `u = (y, 0, 0)` driven by the walls at `y = 0` and `y = 1`.
fn couette_conditions() -> BoundaryConditions {
    let mu = water().viscosity;
    let walls = [BoxFace::YMin, BoxFace::YMax, BoxFace::ZMin, BoxFace::ZMax];
    BoundaryConditions::new()
        .with_dirichlet(DirichletCondition::new(
            walls,
            VectorField::from_fn(|x, _| Vector3::new(x.y, 0.0, 0.0)),
        ))
        .with_neumann([BoxFace::XMax], Vector3::new(0.0, mu, 0.0))
        .with_neumann([BoxFace::XMin], Vector3::new(0.0, -mu, 0.0))
}

fn couette_params(scheme: TimeIntegrationScheme) -> XFluidParameters {
    let mut params = XFluidParameters::default();
    params.time.scheme = scheme;
    params.time.dt = 0.1;
    params.linear_solver.kind = LinearSolverKind::DenseLu;
    if scheme == TimeIntegrationScheme::Stationary {
        params.time.predictor = Predictor::SteadyState;
    }
    params
}

fn couette_solver(scheme: TimeIntegrationScheme) -> XFluidSolver {
    let mesh = create_unit_box_uniform_hex_mesh(2);
    XFluidSolver::new(
        mesh,
        couette_params(scheme),
        ConditionManager::new(single_fluid()),
        couette_conditions(),
    )
    .unwrap()
}

#[test]
fn stationary_couette_flow_is_reproduced() {
    let mut solver = couette_solver(TimeIntegrationScheme::Stationary);
    let report = solver.solve_stationary().unwrap();
    assert!(report.converged);
    assert!(report.linear_solves >= 1);

    let velnp = &solver.state().velnp;
    for (node, x) in solver.mesh().vertices().iter().enumerate() {
        let u = Vector3::new(
            velnp[GlobalDofMap::dof(node, 0)],
            velnp[GlobalDofMap::dof(node, 1)],
            velnp[GlobalDofMap::dof(node, 2)],
        );
        assert!((u - Vector3::new(x.y, 0.0, 0.0)).norm() < 1e-6, "velocity {u} at {x}");
        assert!(velnp[GlobalDofMap::dof(node, 3)].abs() < 1e-6);
    }
}

#[test]
fn stationary_solve_requires_the_stationary_scheme() {
    let mut solver = couette_solver(TimeIntegrationScheme::OneStepTheta);
    assert!(solver.solve_stationary().is_err());
}

#[test]
fn krylov_projection_is_rejected_for_flows_with_outflow_boundaries() {
    for weights in [KrylovWeights::PointValues, KrylovWeights::Integration] {
        let mut params = couette_params(TimeIntegrationScheme::Stationary);
        params.krylov_conditions.push(KrylovCondition {
            mode: [false, false, false, true],
            weights,
        });
        let mesh = create_unit_box_uniform_hex_mesh(2);
        let mut solver =
            XFluidSolver::new(mesh, params, ConditionManager::new(single_fluid()), couette_conditions()).unwrap();

        // The Neumann faces at x = 0 and x = 1 determine the pressure
        let report = solver.solve_stationary().unwrap_err();
        assert!(matches!(
            report.root_cause().downcast_ref::<XFluidError>(),
            Some(XFluidError::NullspaceViolation { .. })
        ));
        assert!(report
            .chain()
            .any(|cause| cause.to_string().contains("no undetermined pressure mode")));
        assert!(solver.projector().is_some());
    }
}

#[test]
fn transient_steps_advance_time() {
    let mut solver = couette_solver(TimeIntegrationScheme::OneStepTheta);
    let first = solver.step().unwrap();
    assert_eq!(first.step, 1);
    assert!(first.newton.converged);
    assert!(first.transfer.is_none());
    let second = solver.step().unwrap();
    assert_eq!(second.step, 2);
    assert!((second.time - 0.2).abs() < 1e-12);
    assert_eq!(solver.state().veln, solver.state().velnp);
}

#[test]
fn restart_continues_from_the_stored_state() {
    let mut solver = couette_solver(TimeIntegrationScheme::OneStepTheta);
    solver.step().unwrap();
    let bundle = solver.restart_bundle();
    assert_eq!(bundle.num_dofs(), solver.dofmap().num_dofs());

    let json = bundle.to_json_string().unwrap();
    let parsed = RestartBundle::from_json_str(&json).unwrap();
    assert_eq!(parsed, bundle);

    let mut restarted = couette_solver(TimeIntegrationScheme::OneStepTheta);
    restarted.restore(parsed).unwrap();
    assert_eq!(restarted.time().step, 1);
    assert_eq!(restarted.state().velnp, solver.state().velnp);
    assert_eq!(restarted.state().veln, solver.state().veln);
    assert_eq!(restarted.state().accn, solver.state().accn);
}

#[test]
fn restart_rejects_a_different_dofset_layout() {
    let solver = couette_solver(TimeIntegrationScheme::OneStepTheta);
    let bundle = solver.restart_bundle();
    let finer = create_unit_box_uniform_hex_mesh(3);
    let other = GlobalDofMap::uncut(&finer, &single_fluid()).unwrap();
    match bundle.check_layout(&other) {
        Err(XFluidError::RestartDofMapMismatch { expected, found }) => {
            assert_eq!(expected, 27 * 4);
            assert_eq!(found, 64 * 4);
        }
        other => panic!("expected a layout mismatch, got {other:?}"),
    }
    bundle.check_layout(solver.dofmap()).unwrap();
}

/// Couette flow whose wall velocity grows linearly in time.
fn ramped_couette_solver(predictor: Predictor) -> XFluidSolver {
    let mu = water().viscosity;
    let walls = [BoxFace::YMin, BoxFace::YMax, BoxFace::ZMin, BoxFace::ZMax];
    let boundary = BoundaryConditions::new()
        .with_dirichlet(DirichletCondition::new(
            walls,
            VectorField::from_fn(|x, t| Vector3::new(t * x.y, 0.0, 0.0)),
        ))
        .with_neumann([BoxFace::XMax], VectorField::from_fn(move |_, t| Vector3::new(0.0, t * mu, 0.0)))
        .with_neumann([BoxFace::XMin], VectorField::from_fn(move |_, t| Vector3::new(0.0, -t * mu, 0.0)));
    let mut params = couette_params(TimeIntegrationScheme::OneStepTheta);
    params.time.predictor = predictor;
    let mesh = create_unit_box_uniform_hex_mesh(2);
    XFluidSolver::new(mesh, params, ConditionManager::new(single_fluid()), boundary).unwrap()
}

/// Runs one step and the preparation of the next; returns the predicted `velnp`.
fn predicted_second_step(solver: &mut XFluidSolver) -> DVector<f64> {
    solver.step().unwrap();
    solver.prepare_time_step().unwrap();
    solver.prepare_xfem_solve().unwrap();
    solver.state().velnp.clone()
}

#[test]
fn tangent_velocity_predictor_responds_to_new_dirichlet_values() {
    let mut steady = ramped_couette_solver(Predictor::SteadyState);
    let mut tangent = ramped_couette_solver(Predictor::TangVel);
    let steady_prediction = predicted_second_step(&mut steady);
    let tangent_prediction = predicted_second_step(&mut tangent);

    let state = tangent.state();
    let dirichlet = &state.dirichlet;
    // Same Dirichlet values, different free values
    let mut free_difference: f64 = 0.0;
    for dof in 0..state.num_dofs() {
        if dirichlet[dof] {
            assert!((tangent_prediction[dof] - steady_prediction[dof]).abs() < 1e-12);
        } else if !GlobalDofMap::is_pressure_dof(dof) {
            free_difference = free_difference.max((tangent_prediction[dof] - steady_prediction[dof]).abs());
        } else {
            assert_eq!(tangent_prediction[dof], state.veln[dof]);
        }
    }
    assert!(free_difference > 1e-6, "free velocities unchanged by the predictor");
    for dof in (0..steady.state().num_dofs()).filter(|&dof| !steady.state().dirichlet[dof]) {
        assert_eq!(steady_prediction[dof], steady.state().veln[dof]);
    }

    let consistent = compute_accelerations(tangent.time(), &state.velnp, &state.veln, &state.velnm, &state.accn);
    assert_eq!(state.accnp, consistent);

    // Both predictions converge to the same solution, the linearized one starts closer
    assert!(steady.solve().unwrap().converged);
    assert!(tangent.solve().unwrap().converged);
    let solution = &tangent.state().velnp;
    assert!((solution - &steady.state().velnp).amax() < 1e-6);
    let steady_error = (&steady_prediction - solution).norm();
    let tangent_error = (&tangent_prediction - solution).norm();
    assert!(tangent_error < steady_error, "TangVel {tangent_error} vs steady state {steady_error}");
}
