use super::single_fluid;
use matrixcompare::assert_scalar_eq;
use util::assert_approx_matrix_eq;
use xfluid::analytical::{BeltramiFlow, ExactSolution, FunctionSolution, PoiseuilleFlow};
use xfluid::coupling::ConditionManager;
use xfluid::cut::CutWizard;
use xfluid::dofset::GlobalDofMap;
use xfluid::error_norms::ErrorEvaluation;
use xfluid::function::{ScalarField, VectorField};
use xfluid::mesh::procedural::create_unit_box_uniform_hex_mesh;
use xfluid::nalgebra::{DVector, Matrix3, Point3, Vector3};

fn sample_points() -> Vec<Point3<f64>> {
    vec![
        Point3::new(0.1, 0.2, 0.3),
        Point3::new(-0.4, 0.7, 0.05),
        Point3::new(0.9, -0.3, -0.6),
    ]
}

/// Momentum residual `du/dt + (grad u) u + grad p / rho - nu lap u` by finite differences.
fn navier_stokes_residual(flow: &BeltramiFlow, x: &Point3<f64>, t: f64) -> Vector3<f64> {
    let h = 1e-3;
    let dudt = (flow.velocity(x, t + h) - flow.velocity(x, t - h)) / (2.0 * h);
    let u = flow.velocity(x, t);
    let grad_u = flow.velocity_gradient(x, t);
    let mut grad_p = Vector3::zeros();
    let mut laplacian = Vector3::zeros();
    for j in 0..3 {
        let mut e = Vector3::zeros();
        e[j] = h;
        grad_p[j] = (flow.pressure(&(x + e), t) - flow.pressure(&(x - e), t)) / (2.0 * h);
        laplacian += (flow.velocity(&(x + e), t) - 2.0 * u + flow.velocity(&(x - e), t)) / (h * h);
    }
    dudt + grad_u * u + grad_p / flow.density - laplacian * flow.kinematic_viscosity
}

#[test]
fn beltrami_flow_is_divergence_free() {
    let flow = BeltramiFlow::new(1.0, 0.1);
    for x in sample_points() {
        for t in [0.0, 0.5] {
            let divergence = flow.velocity_gradient(&x, t).trace();
            assert!(divergence.abs() < 1e-8, "divergence {divergence} at {x}");
        }
    }
}

#[test]
fn beltrami_flow_satisfies_the_momentum_equation() {
    let flow = BeltramiFlow::new(2.0, 0.05);
    for x in sample_points() {
        let residual = navier_stokes_residual(&flow, &x, 0.3);
        assert!(residual.norm() < 1e-4, "residual {residual} at {x}");
    }
}

#[test]
fn poiseuille_flow_balances_pressure_and_viscous_forces() {
    let flow = PoiseuilleFlow {
        max_velocity: 1.5,
        height: 2.0,
        viscosity: 0.1,
    };
    assert_scalar_eq!(flow.velocity(&Point3::new(0.0, 1.0, 0.0), 0.0).x, 1.5, comp = abs, tol = 1e-14);
    assert_eq!(flow.velocity(&Point3::new(0.3, 0.0, 0.0), 0.0), Vector3::zeros());

    // mu d2u/dy2 = dp/dx
    let u_yy = -8.0 * flow.max_velocity / (flow.height * flow.height);
    let dpdx = flow.pressure(&Point3::new(1.0, 0.5, 0.0), 0.0) - flow.pressure(&Point3::new(0.0, 0.5, 0.0), 0.0);
    assert_scalar_eq!(flow.viscosity * u_yy, dpdx, comp = abs, tol = 1e-14);

    // The closed-form gradient agrees with central differences
    let by_differences = FunctionSolution {
        velocity: VectorField::from_fn(move |x, t| flow.velocity(x, t)),
        pressure: ScalarField::from_fn(move |x, t| flow.pressure(x, t)),
    };
    let x = Point3::new(0.2, 0.7, 0.1);
    assert_approx_matrix_eq!(
        &flow.velocity_gradient(&x, 0.0),
        &by_differences.velocity_gradient(&x, 0.0),
        abstol = 1e-8
    );
}

#[test]
fn interpolated_linear_solution_has_no_domain_error() {
    let mesh = create_unit_box_uniform_hex_mesh(2);
    let conditions = ConditionManager::new(single_fluid());
    let wizard = CutWizard::uncut(&mesh, None);
    let dofmap = GlobalDofMap::uncut(&mesh, conditions.material()).unwrap();
    let gradient = Matrix3::new(0.0, 1.0, 0.0, -1.0, 0.0, 0.5, 0.0, 0.0, 0.0);
    let exact = FunctionSolution {
        velocity: VectorField::from_fn(move |x, _| gradient * x.coords),
        pressure: ScalarField::from_fn(|x, _| 1.0 - x.z),
    };

    let mut solution = DVector::zeros(dofmap.num_dofs());
    for (node, x) in mesh.vertices().iter().enumerate() {
        let u = exact.velocity(x, 0.0);
        for c in 0..3 {
            solution[GlobalDofMap::dof(node, c)] = u[c];
        }
        solution[GlobalDofMap::dof(node, 3)] = exact.pressure(x, 0.0);
    }

    let evaluation = ErrorEvaluation {
        mesh: &mesh,
        displacement: None,
        wizard: &wizard,
        dofmap: &dofmap,
        conditions: &conditions,
        sigma: 0.0,
    };
    let norms = evaluation.compute(&solution, &exact, 0.0).unwrap();
    assert!(norms.velocity_l2 < 1e-12);
    assert!(norms.pressure_l2 < 1e-12);
    assert!(norms.velocity_h1_semi < 1e-8);
    assert_eq!(norms.interface_velocity_h_half, 0.0);

    // A constant offset in the pressure shows up with the domain volume
    let shifted = FunctionSolution {
        velocity: exact.velocity.clone(),
        pressure: ScalarField::from_fn(|x, _| 2.0 - x.z),
    };
    let norms = evaluation.compute(&solution, &shifted, 0.0).unwrap();
    assert_scalar_eq!(norms.pressure_l2, 1.0, comp = abs, tol = 1e-12);
}
