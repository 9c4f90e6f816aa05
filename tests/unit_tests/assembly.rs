use super::single_fluid;
use xfluid::assembly::{assemble_system, empty_rows, AssemblyData, EvaluationState};
use xfluid::boundary::{BoundaryConditions, BoxFace, DirichletCondition};
use xfluid::config::{TimeIntegrationScheme, XFluidParameters};
use xfluid::coupling::{ConditionManager, InterfaceMotion, LevelSetCoupling};
use xfluid::cut::CutWizard;
use xfluid::dofset::GlobalDofMap;
use xfluid::function::VectorField;
use xfluid::geometry::sdf::SdfHalfSpace;
use xfluid::kernel::KernelContext;
use xfluid::mesh::procedural::create_unit_box_uniform_hex_mesh;
use xfluid::mesh::{HexMesh, MeshFaces};
use xfluid::nalgebra::{DVector, Point3, Vector3};
use xfluid::nalgebra_sparse::{CooMatrix, CsrMatrix};
use xfluid::state::AssembledSystem;
use xfluid::timint::TimeParams;

pub fn stationary_params() -> XFluidParameters {
    let mut params = XFluidParameters::default();
    params.time.scheme = TimeIntegrationScheme::Stationary;
    params
}

pub fn assemble(
    mesh: &HexMesh,
    wizard: &CutWizard,
    dofmap: &GlobalDofMap,
    conditions: &ConditionManager,
    params: &XFluidParameters,
    boundary: &BoundaryConditions,
    velocity: &DVector<f64>,
    dirichlet: &[bool],
) -> AssembledSystem {
    let time = TimeParams::new(&params.time);
    let body_force = VectorField::zero();
    let acceleration = DVector::zeros(velocity.len());
    let data = AssemblyData {
        mesh,
        displacement: None,
        grid_velocity: None,
        wizard,
        dofmap,
        conditions,
        params,
        context: KernelContext {
            time: &time,
            stabilization: &params.stabilization,
            linearization: params.linearization,
            body_force: &body_force,
        },
        state: EvaluationState {
            velocity,
            pressure: velocity,
            acceleration: &acceleration,
        },
    };
    assemble_system(&data, &MeshFaces::from_mesh(mesh), boundary, dirichlet).unwrap()
}

/// Velocity vector of the shear flow `u = (y, 0, 0)` with zero pressure.
fn shear_flow(mesh: &HexMesh, dofmap: &GlobalDofMap) -> DVector<f64> {
    let mut velocity = DVector::zeros(dofmap.num_dofs());
    for (node, x) in mesh.vertices().iter().enumerate() {
        velocity[GlobalDofMap::dof(node, 0)] = x.y;
    }
    velocity
}

fn is_boundary(x: &Point3<f64>) -> bool {
    x.iter().any(|&c| c.abs() < 1e-12 || (c - 1.0).abs() < 1e-12)
}

#[test]
fn shear_flow_leaves_interior_rows_in_equilibrium() {
    let mesh = create_unit_box_uniform_hex_mesh(3);
    let conditions = ConditionManager::new(single_fluid());
    let wizard = CutWizard::uncut(&mesh, None);
    let dofmap = GlobalDofMap::uncut(&mesh, conditions.material()).unwrap();
    let params = stationary_params();
    let velocity = shear_flow(&mesh, &dofmap);
    let dirichlet = vec![false; dofmap.num_dofs()];

    let system = assemble(
        &mesh,
        &wizard,
        &dofmap,
        &conditions,
        &params,
        &BoundaryConditions::new(),
        &velocity,
        &dirichlet,
    );
    assert!(system.empty_rows.iter().all(|&empty| !empty));
    for (node, x) in mesh.vertices().iter().enumerate() {
        // Continuity holds everywhere, momentum only away from the untreated boundary
        assert!(system.rhs[GlobalDofMap::dof(node, 3)].abs() < 1e-12);
        if !is_boundary(x) {
            for c in 0..3 {
                assert!(system.rhs[GlobalDofMap::dof(node, c)].abs() < 1e-12, "node {node}");
            }
        }
    }
}

#[test]
fn dirichlet_rows_are_replaced_by_identity_rows() {
    let mesh = create_unit_box_uniform_hex_mesh(2);
    let conditions = ConditionManager::new(single_fluid());
    let wizard = CutWizard::uncut(&mesh, None);
    let dofmap = GlobalDofMap::uncut(&mesh, conditions.material()).unwrap();
    let params = stationary_params();
    let boundary = BoundaryConditions::new().with_dirichlet(DirichletCondition::no_slip([BoxFace::ZMin]));
    let dirichlet = boundary.dirichlet_mask(&mesh, &dofmap);
    let velocity = DVector::from_fn(dofmap.num_dofs(), |i, _| (0.1 * i as f64).cos());

    let system = assemble(&mesh, &wizard, &dofmap, &conditions, &params, &boundary, &velocity, &dirichlet);
    let num_dirichlet = dirichlet.iter().filter(|&&d| d).count();
    assert_eq!(num_dirichlet, 9 * 3);
    for (row, &constrained) in dirichlet.iter().enumerate() {
        if constrained {
            let entries = system.matrix.row(row);
            for (&col, &value) in entries.col_indices().iter().zip(entries.values()) {
                assert_eq!(value, if col == row { 1.0 } else { 0.0 });
            }
            assert_eq!(system.rhs[row], 0.0);
        }
    }
}

#[test]
fn repeated_assembly_is_deterministic() {
    let mesh = create_unit_box_uniform_hex_mesh(3);
    let mut conditions = ConditionManager::new(single_fluid());
    conditions.add_coupling(Box::new(LevelSetCoupling::weak_dirichlet(
        "wall",
        SdfHalfSpace::from_point_and_normal(Point3::new(0.4, 0.0, 0.0), Vector3::x()),
        InterfaceMotion::Static,
    )));
    let params = stationary_params();
    conditions.setup(&params).unwrap();
    let wizard = CutWizard::cut(&mesh, None, &conditions, &params.cut).unwrap();
    let dofmap = GlobalDofMap::build(
        &mesh,
        &wizard,
        conditions.material(),
        params.dofset_strategy,
        params.max_dofsets_per_node,
    )
    .unwrap();
    let velocity = DVector::from_fn(dofmap.num_dofs(), |i, _| (0.3 * i as f64).sin());
    let dirichlet = vec![false; dofmap.num_dofs()];
    let boundary = BoundaryConditions::new();

    let first = assemble(&mesh, &wizard, &dofmap, &conditions, &params, &boundary, &velocity, &dirichlet);
    let second = assemble(&mesh, &wizard, &dofmap, &conditions, &params, &boundary, &velocity, &dirichlet);
    assert_eq!(first.matrix, second.matrix);
    assert_eq!(first.rhs, second.rhs);
    // Level-set walls are coupled without side dofs
    assert!(first.coupling_blocks.iter().all(Option::is_none));
    // Ghost dofs receive face stabilization, so no row is left empty
    assert!(first.empty_rows.iter().all(|&empty| !empty));
}

#[test]
fn empty_rows_detects_rows_of_explicit_zeros() {
    let mut coo = CooMatrix::new(3, 3);
    coo.push(0, 0, 2.0);
    coo.push(1, 1, 0.0);
    coo.push(1, 2, 0.0);
    coo.push(2, 0, -1.0);
    let matrix = CsrMatrix::from(&coo);
    assert_eq!(empty_rows(&matrix), vec![false, true, false]);
}
