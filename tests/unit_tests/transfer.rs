use super::{build_dofmap, plane_cut, single_fluid};
use xfluid::config::{TransferParameters, XFluidTimeIntScheme};
use xfluid::cut::CutWizard;
use xfluid::dofset::GlobalDofMap;
use xfluid::mesh::{HexMesh, MeshFaces};
use xfluid::nalgebra::{DVector, Point3, Vector3};
use xfluid::transfer::{
    match_slots, Discretization, EmbeddedField, FieldTransfer, ReconstructionMethod, SemiLagrangeData,
    TransferRequest, TransferStatistics,
};

fn gradient() -> Vector3<f64> {
    Vector3::new(2.0, -1.0, 0.5)
}

fn linear_field(mesh: &HexMesh, dofmap: &GlobalDofMap) -> DVector<f64> {
    let gradient = gradient();
    let mut values = DVector::zeros(dofmap.num_dofs());
    for (slot, set) in dofmap.slots().iter().enumerate() {
        let x = mesh.vertices()[set.node];
        for c in 0..4 {
            values[GlobalDofMap::dof(slot, c)] = c as f64 + gradient.dot(&x.coords);
        }
    }
    values
}

/// Uniform velocity `u` with the linear pressure `1 + g · x`.
fn translating_field(mesh: &HexMesh, dofmap: &GlobalDofMap, u: Vector3<f64>) -> DVector<f64> {
    let mut values = DVector::zeros(dofmap.num_dofs());
    for (slot, set) in dofmap.slots().iter().enumerate() {
        let x = mesh.vertices()[set.node];
        for c in 0..3 {
            values[GlobalDofMap::dof(slot, c)] = u[c];
        }
        values[GlobalDofMap::dof(slot, 3)] = 1.0 + gradient().dot(&x.coords);
    }
    values
}

fn transfer_params(scheme: XFluidTimeIntScheme) -> TransferParameters {
    TransferParameters {
        scheme,
        gmres_tolerance: 1e-12,
        ..TransferParameters::default()
    }
}

fn request<'a>(
    scheme: XFluidTimeIntScheme,
    mesh: &'a HexMesh,
    faces: &'a MeshFaces,
    source: (&'a CutWizard, &'a GlobalDofMap),
    target: (&'a CutWizard, &'a GlobalDofMap),
    vector: &'a DVector<f64>,
    dirichlet: &'a [bool],
) -> TransferRequest<'a> {
    TransferRequest {
        scheme,
        source: Discretization {
            mesh,
            displacement: None,
            wizard: source.0,
            dofmap: source.1,
        },
        target: Discretization {
            mesh,
            displacement: None,
            wizard: target.0,
            dofmap: target.1,
        },
        faces,
        sources: vec![vector],
        dirichlet,
        semi_lagrange: None,
        embedded: None,
    }
}

#[test]
fn unchanged_cut_is_copied() {
    let (mesh, wizard) = plane_cut(4, 0.4);
    let faces = MeshFaces::from_mesh(&mesh);
    let dofmap = build_dofmap(&mesh, &wizard, &single_fluid());
    let source = DVector::from_fn(dofmap.num_dofs(), |i, _| i as f64 * 0.5);
    let dirichlet = vec![false; dofmap.num_dofs()];

    let scheme = XFluidTimeIntScheme::StdByCopyAndGhostByCopyOrGp;
    let transfer = FieldTransfer::new(transfer_params(scheme), 1.0);
    let request = request(scheme, &mesh, &faces, (&wizard, &dofmap), (&wizard, &dofmap), &source, &dirichlet);
    let output = transfer
        .transfer(&request, vec![DVector::zeros(dofmap.num_dofs())])
        .unwrap();

    assert_eq!(output.vectors[0], source);
    assert!(output.labels.iter().all(|&l| l == ReconstructionMethod::Copy));
    assert_eq!(output.statistics.copy, dofmap.num_slots());
    assert!(!output.newton_restart_required);
    assert_eq!(transfer.total_statistics(), output.statistics);
}

#[test]
fn slots_are_matched_by_node_position_and_kind() {
    let (mesh, source_wizard) = plane_cut(4, 0.4);
    let (_, target_wizard) = plane_cut(4, 0.6);
    let source = build_dofmap(&mesh, &source_wizard, &single_fluid());
    let target = build_dofmap(&mesh, &target_wizard, &single_fluid());
    let permutation = match_slots(&source, &target);
    assert_eq!(permutation.len(), target.num_slots());

    for (slot, set) in target.slots().iter().enumerate() {
        let x = mesh.vertices()[set.node].x;
        if x > 0.7 {
            let source_slot = permutation[slot].unwrap();
            assert_eq!(*source.slot(source_slot), *set);
        } else {
            // Nodes at x = 0.5 turned from standard into ghost sets
            assert!((x - 0.5).abs() < 1e-12);
            assert!(!set.standard);
            assert_eq!(permutation[slot], None);
        }
    }
}

#[test]
fn moved_interface_extends_ghost_values_by_ghost_penalty() {
    let (mesh, source_wizard) = plane_cut(4, 0.4);
    let (_, target_wizard) = plane_cut(4, 0.6);
    let faces = MeshFaces::from_mesh(&mesh);
    let source = build_dofmap(&mesh, &source_wizard, &single_fluid());
    let target = build_dofmap(&mesh, &target_wizard, &single_fluid());
    let values = linear_field(&mesh, &source);
    let dirichlet = vec![false; target.num_dofs()];

    let scheme = XFluidTimeIntScheme::StdByCopyAndGhostByCopyOrGp;
    let transfer = FieldTransfer::new(transfer_params(scheme), 1.0);
    let request = request(
        scheme,
        &mesh,
        &faces,
        (&source_wizard, &source),
        (&target_wizard, &target),
        &values,
        &dirichlet,
    );
    let output = transfer
        .transfer(&request, vec![DVector::zeros(target.num_dofs())])
        .unwrap();

    assert_eq!(output.statistics.ghost_penalty, 25);
    assert_eq!(output.statistics.copy, target.num_slots() - 25);
    assert!(output.newton_restart_required);
    let error = (&output.vectors[0] - linear_field(&mesh, &target)).amax();
    assert!(error < 1e-8, "extension error {error}");

    let node_labels = output.node_labels(&target);
    for (node, label) in node_labels.iter().enumerate() {
        let x = mesh.vertices()[node].x;
        match label {
            None => assert!(x < 0.5),
            Some(ReconstructionMethod::GhostPenalty) => assert!((x - 0.5).abs() < 1e-12),
            Some(label) => assert_eq!(*label, ReconstructionMethod::Copy),
        }
    }
}

#[test]
fn dirichlet_values_are_never_overwritten() {
    let (mesh, wizard) = plane_cut(4, 0.4);
    let faces = MeshFaces::from_mesh(&mesh);
    let dofmap = build_dofmap(&mesh, &wizard, &single_fluid());
    let source = linear_field(&mesh, &dofmap);
    let dirichlet: Vec<bool> = (0..dofmap.num_dofs()).map(|dof| dof % 4 == 0).collect();
    let initial = DVector::from_element(dofmap.num_dofs(), -7.0);

    let scheme = XFluidTimeIntScheme::StdByCopyAndGhostByGp;
    let transfer = FieldTransfer::new(transfer_params(scheme), 1.0);
    let request = request(scheme, &mesh, &faces, (&wizard, &dofmap), (&wizard, &dofmap), &source, &dirichlet);
    let output = transfer.transfer(&request, vec![initial]).unwrap();

    for (dof, &constrained) in dirichlet.iter().enumerate() {
        if constrained {
            assert_eq!(output.vectors[0][dof], -7.0);
        }
    }
    // Ghost sets are always extended by this scheme
    assert_eq!(output.statistics.ghost_penalty, 25);
    assert!(output.newton_restart_required);
}

#[test]
fn back_tracking_is_limited_to_the_first_call_of_a_step() {
    let scheme = XFluidTimeIntScheme::StdBySlAndGhostByGp;
    let transfer = FieldTransfer::new(transfer_params(scheme), 1.0);
    assert_eq!(transfer.within_step_scheme(true), scheme);
    assert_eq!(
        transfer.within_step_scheme(false),
        XFluidTimeIntScheme::StdByCopyAndGhostByCopyOrGp
    );
}

#[test]
fn ghost_sets_without_stabilized_faces_keep_their_initial_values() {
    // A single element has no interior faces, so the ghost-penalty rows of the new ghost
    // sets at x = 0 are empty
    let (mesh, source_wizard) = plane_cut(1, -0.2);
    let (_, target_wizard) = plane_cut(1, 0.6);
    let faces = MeshFaces::from_mesh(&mesh);
    assert!(faces.interior().is_empty());
    let source = build_dofmap(&mesh, &source_wizard, &single_fluid());
    let target = build_dofmap(&mesh, &target_wizard, &single_fluid());
    assert_eq!(source.num_slots(), 8);
    let values = linear_field(&mesh, &source);
    let dirichlet = vec![false; target.num_dofs()];
    let initial = DVector::from_element(target.num_dofs(), -3.0);

    let scheme = XFluidTimeIntScheme::StdByCopyAndGhostByCopyOrGp;
    let transfer = FieldTransfer::new(transfer_params(scheme), 1.0);
    let request = request(
        scheme,
        &mesh,
        &faces,
        (&source_wizard, &source),
        (&target_wizard, &target),
        &values,
        &dirichlet,
    );
    let output = transfer.transfer(&request, vec![initial]).unwrap();

    assert_eq!(output.statistics.copy, 4);
    assert_eq!(output.statistics.ghost_penalty, 4);
    let expected = linear_field(&mesh, &target);
    for (slot, set) in target.slots().iter().enumerate() {
        let x = mesh.vertices()[set.node].x;
        for c in 0..4 {
            let dof = GlobalDofMap::dof(slot, c);
            if x > 0.5 {
                assert!(set.standard);
                assert_eq!(output.labels[slot], ReconstructionMethod::Copy);
                assert_eq!(output.vectors[0][dof], expected[dof]);
            } else {
                assert!(!set.standard);
                assert_eq!(output.labels[slot], ReconstructionMethod::GhostPenalty);
                assert_eq!(output.vectors[0][dof], -3.0);
            }
        }
    }
}

#[test]
fn back_tracking_carries_a_translated_field() {
    let (mesh, source_wizard) = plane_cut(4, 0.4);
    let (_, target_wizard) = plane_cut(4, 0.6);
    let faces = MeshFaces::from_mesh(&mesh);
    let source = build_dofmap(&mesh, &source_wizard, &single_fluid());
    let target = build_dofmap(&mesh, &target_wizard, &single_fluid());
    let u = Vector3::new(0.5, 0.0, 0.0);
    let dt = 0.1;
    let values = translating_field(&mesh, &source, u);
    let dirichlet = vec![false; target.num_dofs()];

    let scheme = XFluidTimeIntScheme::StdBySlAndGhostByGp;
    let transfer = FieldTransfer::new(transfer_params(scheme), 1.0);
    let mut request = request(
        scheme,
        &mesh,
        &faces,
        (&source_wizard, &source),
        (&target_wizard, &target),
        &values,
        &dirichlet,
    );
    request.semi_lagrange = Some(SemiLagrangeData {
        dt,
        theta: 0.0,
        target_velocity: None,
    });
    let output = transfer
        .transfer(&request, vec![DVector::zeros(target.num_dofs())])
        .unwrap();

    // Standard sets at x = 0.75 are tracked, those at x = 1 copied and the ghost sets at
    // x = 0.5 extended
    let statistics = &output.statistics;
    assert_eq!(statistics.semi_lagrangean, 25);
    assert_eq!(statistics.copy, 25);
    assert_eq!(statistics.ghost_penalty, 25);
    assert_eq!(statistics.semi_lagrange_failures, 0);
    assert!(output.newton_restart_required);

    for (slot, set) in target.slots().iter().enumerate() {
        let x = mesh.vertices()[set.node];
        let vector = &output.vectors[0];
        match output.labels[slot] {
            ReconstructionMethod::SemiLagrangean => {
                assert!((x.x - 0.75).abs() < 1e-12);
                let departure = x - dt * u;
                let pressure = 1.0 + gradient().dot(&departure.coords);
                assert!((vector[GlobalDofMap::dof(slot, 3)] - pressure).abs() < 1e-10);
                for c in 0..3 {
                    assert!((vector[GlobalDofMap::dof(slot, c)] - u[c]).abs() < 1e-10);
                }
            }
            ReconstructionMethod::Copy => assert!((x.x - 1.0).abs() < 1e-12),
            ReconstructionMethod::GhostPenalty => {
                assert!((x.x - 0.5).abs() < 1e-12);
                assert!((0..4).all(|c| vector[GlobalDofMap::dof(slot, c)].is_finite()));
            }
            label => panic!("unexpected label {label:?}"),
        }
    }
}

#[test]
fn failed_back_tracking_falls_back_to_ghost_penalty() {
    let (mesh, source_wizard) = plane_cut(4, 0.4);
    let (_, target_wizard) = plane_cut(4, 0.6);
    let faces = MeshFaces::from_mesh(&mesh);
    let source = build_dofmap(&mesh, &source_wizard, &single_fluid());
    let target = build_dofmap(&mesh, &target_wizard, &single_fluid());
    // Characteristics leave the mesh through x = 0
    let values = translating_field(&mesh, &source, Vector3::new(10.0, 0.0, 0.0));
    let dirichlet = vec![false; target.num_dofs()];

    let scheme = XFluidTimeIntScheme::StdBySlAndGhostByGp;
    let transfer = FieldTransfer::new(transfer_params(scheme), 1.0);
    let mut request = request(
        scheme,
        &mesh,
        &faces,
        (&source_wizard, &source),
        (&target_wizard, &target),
        &values,
        &dirichlet,
    );
    request.semi_lagrange = Some(SemiLagrangeData {
        dt: 0.1,
        theta: 0.0,
        target_velocity: None,
    });

    let expected = TransferStatistics {
        dirichlet: 0,
        copy: 25,
        projection: 0,
        semi_lagrangean: 0,
        ghost_penalty: 50,
        semi_lagrange_failures: 25,
    };
    for _ in 0..2 {
        let output = transfer
            .transfer(&request, vec![DVector::zeros(target.num_dofs())])
            .unwrap();
        assert_eq!(output.statistics, expected);
        assert!(output.vectors[0].iter().all(|v| v.is_finite()));
        for (slot, set) in target.slots().iter().enumerate() {
            if (mesh.vertices()[set.node].x - 0.75).abs() < 1e-12 {
                assert_eq!(output.labels[slot], ReconstructionMethod::GhostPenalty);
            }
        }
    }

    let totals = transfer.total_statistics();
    assert_eq!(totals.semi_lagrange_failures, 50);
    assert_eq!(totals.ghost_penalty, 100);
    assert_eq!(totals.copy, 50);
    assert_eq!(totals.semi_lagrangean, 0);
}

/// Linear field known on the part of the domain with `y < y_max`.
struct PartialLinearField {
    y_max: f64,
}

impl EmbeddedField for PartialLinearField {
    fn evaluate(&self, vector: usize, x: &Point3<f64>) -> Option<[f64; 4]> {
        assert_eq!(vector, 0);
        let value = gradient().dot(&x.coords);
        (x.y < self.y_max).then(|| [value, 1.0 + value, 2.0 + value, 3.0 + value])
    }
}

#[test]
fn ghost_sets_are_projected_from_the_embedded_field() {
    let (mesh, source_wizard) = plane_cut(4, 0.4);
    let (_, target_wizard) = plane_cut(4, 0.6);
    let faces = MeshFaces::from_mesh(&mesh);
    let source = build_dofmap(&mesh, &source_wizard, &single_fluid());
    let target = build_dofmap(&mesh, &target_wizard, &single_fluid());
    let values = linear_field(&mesh, &source);
    let dirichlet = vec![false; target.num_dofs()];
    let expected = linear_field(&mesh, &target);

    let scheme = XFluidTimeIntScheme::StdByCopyOrProjAndGhostByProjOrCopyOrGp;
    let transfer = FieldTransfer::new(transfer_params(scheme), 1.0);

    // Covering the whole domain, every ghost set is projected
    let everywhere = PartialLinearField { y_max: 2.0 };
    let mut full = request(
        scheme,
        &mesh,
        &faces,
        (&source_wizard, &source),
        (&target_wizard, &target),
        &values,
        &dirichlet,
    );
    full.embedded = Some(&everywhere);
    let output = transfer
        .transfer(&full, vec![DVector::zeros(target.num_dofs())])
        .unwrap();
    assert_eq!(output.statistics.projection, 25);
    assert_eq!(output.statistics.copy, 50);
    assert_eq!(output.statistics.ghost_penalty, 0);
    assert!((&output.vectors[0] - &expected).amax() < 1e-12);

    // Sets outside the embedded field are extended by ghost penalty
    let lower = PartialLinearField { y_max: 0.3 };
    let mut partial = full;
    partial.embedded = Some(&lower);
    let output = transfer
        .transfer(&partial, vec![DVector::zeros(target.num_dofs())])
        .unwrap();
    assert_eq!(output.statistics.projection, 10);
    assert_eq!(output.statistics.ghost_penalty, 15);
    assert_eq!(output.statistics.copy, 50);
    for (slot, set) in target.slots().iter().enumerate() {
        if !set.standard {
            let y = mesh.vertices()[set.node].y;
            let method = output.labels[slot];
            if y < 0.3 {
                assert_eq!(method, ReconstructionMethod::ProjectionFromEmbeddedMesh);
            } else {
                assert_eq!(method, ReconstructionMethod::GhostPenalty);
            }
        }
    }
    let error = (&output.vectors[0] - &expected).amax();
    assert!(error < 1e-8, "extension error {error}");
}
