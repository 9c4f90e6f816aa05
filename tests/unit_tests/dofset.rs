use super::{build_dofmap, plane_cut, single_fluid, two_phase_fluid};
use xfluid::config::NodalDofSetStrategy;
use xfluid::cut::{CutWizard, Position};
use xfluid::dofset::{DofSetManager, GlobalDofMap, DOFS_PER_SET};
use xfluid::error::XFluidError;
use xfluid::mesh::procedural::create_unit_box_uniform_hex_mesh;
use xfluid::mesh::HexMesh;

/// Nodes of a uniform unit-cube mesh with the given x coordinate.
fn nodes_at_x(mesh: &HexMesh, x: f64) -> Vec<usize> {
    mesh.vertices()
        .iter()
        .enumerate()
        .filter(|(_, v)| (v.x - x).abs() < 1e-12)
        .map(|(i, _)| i)
        .collect()
}

#[test]
fn uncut_mesh_has_one_standard_set_per_node() {
    let mesh = create_unit_box_uniform_hex_mesh(3);
    let dofmap = GlobalDofMap::uncut(&mesh, &single_fluid()).unwrap();
    assert_eq!(dofmap.num_slots(), mesh.num_vertices());
    assert_eq!(dofmap.num_dofs(), DOFS_PER_SET * mesh.num_vertices());
    for node in 0..mesh.num_vertices() {
        assert_eq!(dofmap.num_dofsets(node), 1);
        let slot = dofmap.standard_slot(node).unwrap();
        assert_eq!(dofmap.slot(slot).node, node);
        assert_eq!(dofmap.slot(slot).position, Position::Outside);
    }
    for e in 0..mesh.num_cells() {
        assert_eq!(dofmap.cell_sets(e).len(), 1);
        assert_eq!(dofmap.cell_sets(e)[0].nds, [0; 8]);
    }
}

#[test]
fn location_vector_orders_dofs_by_node_and_component() {
    let mesh = create_unit_box_uniform_hex_mesh(1);
    let dofmap = GlobalDofMap::uncut(&mesh, &single_fluid()).unwrap();
    let lm = dofmap.location_vector(0, &[0; 8]);
    let nodes = dofmap.element_nodes(0);
    assert_eq!(lm.len(), 32);
    for (a, &node) in nodes.iter().enumerate() {
        for c in 0..4 {
            assert_eq!(lm[4 * a + c], GlobalDofMap::dof(node, c));
        }
    }
    assert!(GlobalDofMap::is_pressure_dof(lm[3]));
    assert!(!GlobalDofMap::is_pressure_dof(lm[4]));
}

#[test]
fn single_fluid_plane_cut_drops_inside_nodes_and_adds_ghost_sets() {
    let (mesh, wizard) = plane_cut(4, 0.4);
    let dofmap = build_dofmap(&mesh, &wizard, &single_fluid());

    for node in nodes_at_x(&mesh, 0.0) {
        assert_eq!(dofmap.num_dofsets(node), 0);
    }
    // Inside nodes next to the cut only carry a ghost set of the outside fluid
    for node in nodes_at_x(&mesh, 0.25) {
        assert_eq!(dofmap.num_dofsets(node), 1);
        let set = dofmap.slot(dofmap.node_slots(node).start);
        assert_eq!(set.position, Position::Outside);
        assert!(!set.standard);
        assert_eq!(dofmap.standard_slot(node), None);
    }
    for node in nodes_at_x(&mesh, 0.5) {
        assert_eq!(dofmap.num_dofsets(node), 1);
        assert!(dofmap.standard_slot(node).is_some());
    }
    // Inside elements carry no cell sets, cut elements one for the fluid side
    for e in 0..mesh.num_cells() {
        let expected = if wizard.is_cut(e) || dofmap.element_nodes(e).iter().all(|&n| mesh.vertices()[n].x >= 0.5) {
            1
        } else {
            0
        };
        assert_eq!(dofmap.cell_sets(e).len(), expected, "element {e}");
    }
}

#[test]
fn two_phase_plane_cut_doubles_sets_next_to_interface() {
    let (mesh, wizard) = plane_cut(4, 0.4);
    let dofmap = build_dofmap(&mesh, &wizard, &two_phase_fluid());
    assert_eq!(dofmap.num_slots(), 125 + 2 * 25);

    for node in nodes_at_x(&mesh, 0.25) {
        let slots: Vec<_> = dofmap.node_slots(node).map(|s| *dofmap.slot(s)).collect();
        assert_eq!(slots.len(), 2);
        // The standard set comes first
        assert!(slots[0].standard);
        assert_eq!(slots[0].position, Position::Inside);
        assert!(!slots[1].standard);
        assert_eq!(slots[1].position, Position::Outside);
    }
    for e in (0..mesh.num_cells()).filter(|&e| wizard.is_cut(e)) {
        let sets = dofmap.cell_sets(e);
        assert_eq!(sets.len(), 2);
        assert_ne!(sets[0].nds, sets[1].nds);
        assert_ne!(sets[0].position, sets[1].position);
    }
}

#[test]
fn exceeding_the_dofset_limit_is_an_error() {
    let (mesh, wizard) = plane_cut(4, 0.4);
    let result = GlobalDofMap::build(
        &mesh,
        &wizard,
        &two_phase_fluid(),
        NodalDofSetStrategy::OneDofsetPerNodeAndPosition,
        1,
    );
    assert!(matches!(
        result,
        Err(XFluidError::TooManyDofSets {
            required: 2,
            max: 1,
            ..
        })
    ));
}

#[test]
fn connected_components_separate_disjoint_patches() {
    // Two parallel slabs of the inside phase split the outside phase into three patches
    let mesh = create_unit_box_uniform_hex_mesh(6);
    let slabs = |x: &xfluid::nalgebra::Point3<f64>| xfluid::cut::CutterSample {
        phi: ((x.x - 0.35).abs() - 0.04).min((x.x - 0.65).abs() - 0.04),
        side: 0,
        coupling: 0,
    };
    let wizard = CutWizard::cut(&mesh, None, &slabs, &Default::default()).unwrap();
    let by_position =
        GlobalDofMap::build(&mesh, &wizard, &single_fluid(), NodalDofSetStrategy::OneDofsetPerNodeAndPosition, 4)
            .unwrap();
    let by_component =
        GlobalDofMap::build(&mesh, &wizard, &single_fluid(), NodalDofSetStrategy::ConnectedComponentBased, 4)
            .unwrap();

    let patches = |dofmap: &GlobalDofMap| {
        let mut patches: Vec<_> = dofmap.slots().iter().map(|s| s.patch).collect();
        patches.sort_unstable();
        patches.dedup();
        patches.len()
    };
    assert_eq!(patches(&by_position), 1);
    assert_eq!(patches(&by_component), 3);
    assert!(by_component.num_slots() >= by_position.num_slots());
}

#[test]
fn manager_tracks_layout_changes() {
    let (mesh, wizard) = plane_cut(4, 0.4);
    let (_, moved) = plane_cut(4, 0.45);
    let (_, crossed) = plane_cut(4, 0.6);
    let material = two_phase_fluid();

    let mut manager = DofSetManager::new(build_dofmap(&mesh, &wizard, &material));
    assert!(!manager.dofsets_changed());
    manager.update(build_dofmap(&mesh, &moved, &material));
    assert!(!manager.dofsets_changed());
    manager.update(build_dofmap(&mesh, &crossed, &material));
    assert!(manager.dofsets_changed());
    assert!(manager.previous().is_some());
    manager.release_previous();
    assert!(manager.previous().is_none());
    assert!(!manager.dofsets_changed());
}
