use super::assembly::{assemble, stationary_params};
use super::{build_dofmap, plane_cut, single_fluid};
use matrixcompare::assert_scalar_eq;
use xfluid::boundary::{BoundaryConditions, BoxFace, DirichletCondition};
use xfluid::config::KrylovWeights;
use xfluid::coupling::ConditionManager;
use xfluid::cut::CutWizard;
use xfluid::dofset::GlobalDofMap;
use xfluid::error::XFluidError;
use xfluid::krylov_projector::KrylovProjector;
use xfluid::mesh::procedural::create_unit_box_uniform_hex_mesh;
use xfluid::nalgebra::DVector;

fn test_vector(n: usize) -> DVector<f64> {
    DVector::from_fn(n, |i, _| (1.3 * i as f64).sin() + 0.1)
}

#[test]
fn projector_requires_weights_with_support_on_the_kernel() {
    let kernel = DVector::from_column_slice(&[1.0, 0.0, 1.0]);
    let weights = DVector::from_column_slice(&[0.0, 2.0, 0.0]);
    assert!(KrylovProjector::from_vectors(kernel.clone(), weights).is_none());
    let projector = KrylovProjector::from_vectors(kernel.clone(), kernel).unwrap();
    assert_scalar_eq!(projector.weights().dot(projector.kernel()), 1.0, comp = abs, tol = 1e-14);
}

#[test]
fn projections_remove_the_pressure_mode() {
    let mesh = create_unit_box_uniform_hex_mesh(2);
    let dofmap = GlobalDofMap::uncut(&mesh, &single_fluid()).unwrap();
    let empty = vec![false; dofmap.num_dofs()];
    let projector = KrylovProjector::from_point_values(&dofmap, &empty).unwrap();
    let c = projector.kernel().clone();
    for dof in 0..dofmap.num_dofs() {
        let expected = if GlobalDofMap::is_pressure_dof(dof) { 1.0 } else { 0.0 };
        assert_eq!(c[dof], expected);
    }

    let mut pc = c.clone();
    projector.apply_p(&mut pc);
    assert!(pc.amax() < 1e-14);

    let mut x = test_vector(dofmap.num_dofs());
    projector.apply_p(&mut x);
    assert!(projector.weights().dot(&x).abs() < 1e-12);

    let mut r = test_vector(dofmap.num_dofs());
    projector.apply_pt(&mut r);
    assert!(c.dot(&r).abs() < 1e-12);
}

#[test]
fn integrated_weights_are_nodal_volumes() {
    let mesh = create_unit_box_uniform_hex_mesh(2);
    let wizard = CutWizard::uncut(&mesh, None);
    let dofmap = GlobalDofMap::uncut(&mesh, &single_fluid()).unwrap();
    let empty = vec![false; dofmap.num_dofs()];
    let projector = KrylovProjector::from_integrated_weights(&mesh, None, &wizard, &dofmap, &empty)
        .unwrap()
        .unwrap();
    let weights = projector.weights();

    // The domain has unit volume, so normalization leaves the weights unchanged
    assert_scalar_eq!(weights.sum(), 1.0, comp = abs, tol = 1e-12);
    for (node, x) in mesh.vertices().iter().enumerate() {
        let boundary_dims = x.iter().filter(|&&c| c == 0.0 || c == 1.0).count();
        let expected = 0.125 * 0.5f64.powi(boundary_dims as i32);
        assert_scalar_eq!(weights[GlobalDofMap::dof(node, 3)], expected, comp = abs, tol = 1e-12);
        for c in 0..3 {
            assert_eq!(weights[GlobalDofMap::dof(node, c)], 0.0);
        }
    }
}

#[test]
fn cut_weights_only_cover_the_physical_pressure_dofs() {
    let (mesh, wizard) = plane_cut(4, 0.4);
    let dofmap = build_dofmap(&mesh, &wizard, &single_fluid());
    let empty = vec![false; dofmap.num_dofs()];
    let projector =
        KrylovProjector::build(KrylovWeights::Integration, &mesh, None, &wizard, &dofmap, &empty)
            .unwrap()
            .unwrap();
    for (dof, (&w, &c)) in projector.weights().iter().zip(projector.kernel()).enumerate() {
        if GlobalDofMap::is_pressure_dof(dof) {
            assert_eq!(c, 1.0);
            assert!(w >= 0.0);
        } else {
            assert_eq!(w, 0.0);
        }
    }
}

#[test]
fn enclosed_flow_matrix_annihilates_constant_pressure() {
    let mesh = create_unit_box_uniform_hex_mesh(2);
    let conditions = ConditionManager::new(single_fluid());
    let wizard = CutWizard::uncut(&mesh, None);
    let dofmap = GlobalDofMap::uncut(&mesh, conditions.material()).unwrap();
    let params = stationary_params();
    let velocity = DVector::zeros(dofmap.num_dofs());
    let projector = KrylovProjector::from_point_values(&dofmap, &vec![false; dofmap.num_dofs()]).unwrap();

    let walls = BoundaryConditions::new().with_dirichlet(DirichletCondition::no_slip(BoxFace::ALL));
    let dirichlet = walls.dirichlet_mask(&mesh, &dofmap);
    let enclosed = assemble(&mesh, &wizard, &dofmap, &conditions, &params, &walls, &velocity, &dirichlet);
    let norm = projector.check_nullspace(&enclosed.matrix, 1e-10).unwrap();
    assert!(norm < 1e-10);

    // Without walls the pressure acts on the boundary velocity rows
    let open = BoundaryConditions::new();
    let free = vec![false; dofmap.num_dofs()];
    let open = assemble(&mesh, &wizard, &dofmap, &conditions, &params, &open, &velocity, &free);
    assert!(matches!(
        projector.check_nullspace(&open.matrix, 1e-10),
        Err(XFluidError::NullspaceViolation { .. })
    ));
}
