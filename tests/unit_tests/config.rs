use xfluid::config::{
    CouplingMethod, KrylovCondition, KrylovWeights, LinearSolverKind, NodalDofSetStrategy, Predictor,
    TimeIntegrationScheme, XFluidParameters, XFluidTimeIntScheme,
};
use xfluid::error::XFluidError;

fn assert_rejected(params: &XFluidParameters, fragment: &str) {
    match params.validate() {
        Err(XFluidError::Configuration(message)) => {
            assert!(message.contains(fragment), "unexpected message: {message}")
        }
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

fn pressure_condition() -> KrylovCondition {
    KrylovCondition {
        mode: [false, false, false, true],
        weights: KrylovWeights::Integration,
    }
}

#[test]
fn defaults_are_valid() {
    let params = XFluidParameters::default();
    params.validate().unwrap();
    assert_eq!(params.coupling_method, CouplingMethod::Nitsche);
    assert!(params.krylov_condition().is_none());
}

#[test]
fn json_round_trip_preserves_parameters() {
    let mut params = XFluidParameters::default();
    params.time.scheme = TimeIntegrationScheme::Bdf2;
    params.time.predictor = Predictor::ConstantIncrement;
    params.transfer.scheme = XFluidTimeIntScheme::StdByCopyOrSlAndGhostByCopyOrGp;
    params.linear_solver.kind = LinearSolverKind::DenseLu;
    params.krylov_conditions.push(pressure_condition());

    let json = params.to_json_string().unwrap();
    let parsed = XFluidParameters::from_json_str(&json).unwrap();
    assert_eq!(parsed, params);
}

#[test]
fn partial_json_falls_back_to_defaults() {
    let json = r#"{
        "coupling_method": "HybridLmViscousStress",
        "time": { "scheme": "Stationary" },
        "convergence": { "itemax": 25 }
    }"#;
    let params = XFluidParameters::from_json_str(json).unwrap();
    assert_eq!(params.coupling_method, CouplingMethod::HybridLmViscousStress);
    assert_eq!(params.time.scheme, TimeIntegrationScheme::Stationary);
    assert_eq!(params.convergence.itemax, 25);
    assert_eq!(params.cut, XFluidParameters::default().cut);
    params.validate().unwrap();
}

#[test]
fn malformed_json_is_reported() {
    let err = XFluidParameters::from_json_str(r#"{ "time": { "scheme": "Euler" } }"#).unwrap_err();
    assert!(format!("{err:#}").contains("failed to parse solver parameters"));
}

#[test]
fn inner_face_stabilization_requires_position_based_dofsets() {
    let mut params = XFluidParameters::default();
    params.ghost_penalty.add_inner_faces = true;
    params.validate().unwrap();
    params.dofset_strategy = NodalDofSetStrategy::ConnectedComponentBased;
    assert_rejected(&params, "inner faces");
}

#[test]
fn at_most_one_pressure_krylov_condition() {
    let mut params = XFluidParameters::default();
    params.krylov_conditions.push(pressure_condition());
    params.validate().unwrap();
    assert_eq!(params.krylov_condition(), Some(&pressure_condition()));

    params.krylov_conditions.push(pressure_condition());
    assert_rejected(&params, "more than one");

    params.krylov_conditions = vec![KrylovCondition {
        mode: [true, false, false, false],
        weights: KrylovWeights::PointValues,
    }];
    assert_rejected(&params, "pressure mode");
}

#[test]
fn invalid_time_integration_settings_are_rejected() {
    let mut params = XFluidParameters::default();
    params.time.theta = 0.0;
    assert_rejected(&params, "theta");

    let mut params = XFluidParameters::default();
    params.time.dt = -0.1;
    assert_rejected(&params, "time step size");

    let mut params = XFluidParameters::default();
    params.time.scheme = TimeIntegrationScheme::Bdf2;
    params.time.predictor = Predictor::TangVel;
    assert_rejected(&params, "TangVel");

    let mut params = XFluidParameters::default();
    params.time.scheme = TimeIntegrationScheme::Stationary;
    params.time.predictor = Predictor::ZeroAcceleration;
    assert_rejected(&params, "steady_state");

    // The step size is irrelevant for stationary problems
    let mut params = XFluidParameters::default();
    params.time.scheme = TimeIntegrationScheme::Stationary;
    params.time.dt = 0.0;
    params.validate().unwrap();
}

#[test]
fn invalid_solver_settings_are_rejected() {
    let mut params = XFluidParameters::default();
    params.convergence.itemax = 0;
    assert_rejected(&params, "itemax");

    let mut params = XFluidParameters::default();
    params.convergence.velinctol = 0.0;
    assert_rejected(&params, "tolerances");

    let mut params = XFluidParameters::default();
    params.convergence.adaptconv = true;
    params.convergence.adaptconv_better = 1.5;
    assert_rejected(&params, "ADAPTCONV_BETTER");

    let mut params = XFluidParameters::default();
    params.max_dofsets_per_node = 0;
    assert_rejected(&params, "dof-set");

    let mut params = XFluidParameters::default();
    params.nitsche.adjoint = 0.5;
    assert_rejected(&params, "adjoint");
}
