use super::{plane_cut, plane_x, sphere};
use matrixcompare::assert_scalar_eq;
use proptest::prelude::*;
use xfluid::config::CutParameters;
use xfluid::cut::{CutWizard, ElementCut, Position};
use xfluid::error::XFluidError;
use xfluid::mesh::procedural::create_unit_box_uniform_hex_mesh;
use xfluid::nalgebra::{Point3, Vector3};
use xfluid::proptest::{perturbed_unit_box_mesh, plane_through_unit_cube, sphere_in_unit_cube};

const REFERENCE_HEX_VOLUME: f64 = 8.0;

#[test]
fn uncut_wizard_classifies_everything_outside() {
    let mesh = create_unit_box_uniform_hex_mesh(2);
    let wizard = CutWizard::uncut(&mesh, None);
    assert_eq!(wizard.num_elements(), 8);
    assert_eq!(wizard.num_cut_elements(), 0);
    assert!(wizard.volume_cells().is_empty());
    assert!(wizard.boundary_cells().is_empty());
    assert!(wizard
        .node_positions()
        .iter()
        .all(|&p| p == Position::Outside));
}

#[test]
fn zero_level_set_counts_as_outside() {
    assert_eq!(Position::from_phi(0.0), Position::Outside);
    assert_eq!(Position::from_phi(-1e-14), Position::Inside);
    assert_eq!(Position::from_phi(1.0), Position::Outside);
}

#[test]
fn plane_cut_partitions_elements_into_two_cells() {
    let (mesh, wizard) = plane_cut(4, 0.4);
    // Elements between x = 0.25 and x = 0.5 are cut
    assert_eq!(wizard.num_cut_elements(), 16);

    for e in 0..mesh.num_cells() {
        let xc = mesh.element(e).unwrap().vertices().iter().map(|v| v.x).sum::<f64>() / 8.0;
        match wizard.element(e) {
            ElementCut::Uncut(position) => {
                let expected = if xc < 0.4 { Position::Inside } else { Position::Outside };
                assert_eq!(*position, expected);
            }
            ElementCut::Cut(handle) => {
                assert!(xc > 0.25 && xc < 0.5);
                assert_eq!(handle.volume_cells.len(), 2);
                assert!(handle.has_xfem_integration_rule);
                let total: f64 = handle
                    .volume_cells
                    .iter()
                    .map(|&vc| wizard.volume_cell(vc).reference_volume())
                    .sum();
                assert_scalar_eq!(total, REFERENCE_HEX_VOLUME, comp = abs, tol = 1e-10);
            }
        }
    }
}

#[test]
fn plane_cut_recovers_inside_volume_and_interface_area() {
    let n = 4;
    let (mesh, wizard) = plane_cut(n, 0.4);
    let h = 1.0 / n as f64;
    let det = (h / 2.0).powi(3);

    let mut inside_volume = 0.0;
    for e in 0..mesh.num_cells() {
        match wizard.element(e) {
            ElementCut::Uncut(Position::Inside) => inside_volume += h * h * h,
            ElementCut::Uncut(_) => {}
            ElementCut::Cut(handle) => {
                for &vc in &handle.volume_cells {
                    let cell = wizard.volume_cell(vc);
                    if cell.position == Position::Inside {
                        inside_volume += cell.reference_volume() * det;
                    }
                }
            }
        }
    }
    assert_scalar_eq!(inside_volume, 0.4, comp = abs, tol = 1e-12);

    let area: f64 = wizard.boundary_cells().iter().map(|bc| bc.area).sum();
    assert_scalar_eq!(area, 1.0, comp = abs, tol = 1e-12);
    for bc in wizard.boundary_cells() {
        // The normal points out of the fluid, towards the negative side
        assert!((bc.normal - Vector3::new(-1.0, 0.0, 0.0)).norm() < 1e-12);
        assert_scalar_eq!(bc.weights.iter().sum::<f64>(), bc.area, comp = abs, tol = 1e-14);
        assert!(bc.vertices.iter().all(|v| (v.x - 0.4).abs() < 1e-12));
        assert_eq!(wizard.volume_cell(bc.outside).position, Position::Outside);
        assert_eq!(wizard.volume_cell(bc.inside).position, Position::Inside);
    }
}

#[test]
fn position_and_distance_queries_on_cut_element() {
    let (mesh, wizard) = plane_cut(1, 0.4);
    assert!(wizard.is_cut(0));
    // x = 0.4 is xi = -0.2 in reference coordinates
    assert_eq!(wizard.position_at(0, &Point3::new(-0.5, 0.0, 0.0)), Some(Position::Inside));
    assert_eq!(wizard.position_at(0, &Point3::new(0.5, 0.0, 0.0)), Some(Position::Outside));

    let x = Point3::new(0.9, 0.5, 0.5);
    let distance = wizard.distance_to_interface(0, &x).unwrap();
    assert_scalar_eq!(distance, 0.5, comp = abs, tol = 1e-12);
    assert_eq!(mesh.num_cells(), 1);
}

#[test]
fn same_topology_detects_moved_interface() {
    let (_, a) = plane_cut(4, 0.4);
    let (_, b) = plane_cut(4, 0.45);
    let (_, c) = plane_cut(4, 0.6);
    assert!(a.same_topology(&b));
    assert!(!a.same_topology(&c));
}

#[test]
fn sphere_cut_interface_area_approximates_sphere() {
    let mesh = create_unit_box_uniform_hex_mesh(8);
    let params = CutParameters {
        refinement: 2,
        ..CutParameters::default()
    };
    let radius = 0.3;
    let wizard = CutWizard::cut(&mesh, None, &sphere(Point3::new(0.5, 0.5, 0.5), radius), &params).unwrap();
    let area: f64 = wizard.boundary_cells().iter().map(|bc| bc.area).sum();
    let exact = 4.0 * std::f64::consts::PI * radius * radius;
    assert!((area - exact).abs() / exact < 0.05, "area {area} vs {exact}");
}

#[test]
fn inverted_element_is_rejected() {
    let mut mesh = create_unit_box_uniform_hex_mesh(1);
    mesh.transform_vertices(|v| v.x = -v.x);
    let result = CutWizard::cut(&mesh, None, &plane_x(-0.5), &CutParameters::default());
    assert!(matches!(result, Err(XFluidError::NegativeJacobian { element: 0, .. })));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn volume_cells_partition_every_cut_element(
        mesh in perturbed_unit_box_mesh(3),
        cutter in sphere_in_unit_cube(),
    ) {
        let wizard = CutWizard::cut(&mesh, None, &cutter, &CutParameters::default()).unwrap();
        for e in 0..wizard.num_elements() {
            let cells = wizard.element_volume_cells(e);
            if wizard.is_cut(e) {
                let total: f64 = cells.iter().map(|&vc| wizard.volume_cell(vc).reference_volume()).sum();
                prop_assert!((total - REFERENCE_HEX_VOLUME).abs() < 1e-9);
            } else {
                prop_assert!(cells.is_empty());
            }
        }
        for bc in wizard.boundary_cells() {
            prop_assert!(bc.area > 0.0);
            prop_assert!((bc.normal.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn boundary_cells_lie_on_planar_interface(cutter in plane_through_unit_cube()) {
        let mesh = create_unit_box_uniform_hex_mesh(3);
        let wizard = CutWizard::cut(&mesh, None, &cutter, &CutParameters::default()).unwrap();
        for bc in wizard.boundary_cells() {
            for v in &bc.vertices {
                prop_assert!((v - cutter.point).dot(&cutter.normal).abs() < 1e-9);
            }
            if bc.area > 1e-6 {
                prop_assert!((bc.normal + cutter.normal).norm() < 1e-9);
            }
        }
    }
}
