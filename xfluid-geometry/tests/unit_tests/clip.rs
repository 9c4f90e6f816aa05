use matrixcompare::assert_scalar_eq;
use nalgebra::Point3;
use proptest::prelude::*;
use xfluid_geometry::proptest::{half_space, nondegenerate_tetrahedron};
use xfluid_geometry::sdf::SignedDistanceFunction3d;
use xfluid_geometry::{clip_tetrahedron, kuhn_tetrahedra, ClipVertexKey, LevelSetSide, Tetrahedron};

fn unit_tet_vertices() -> [Point3<f64>; 4] {
    [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
    ]
}

#[test]
fn uncut_tetrahedron_is_single_piece() {
    let clip = clip_tetrahedron(&unit_tet_vertices(), &[0, 1, 2, 3], &[1.0, 2.0, 0.5, 3.0]);
    assert_eq!(clip.pieces.len(), 1);
    assert_eq!(clip.pieces[0].side, LevelSetSide::Positive);
    assert!(clip.iso_polygon.is_none());
}

#[test]
fn corner_cut_has_triangle_interface() {
    // Plane x + y + z = 0.5 cuts off the corner at the origin
    let vertices = unit_tet_vertices();
    let phi = vertices.map(|v| v.x + v.y + v.z - 0.5);
    let clip = clip_tetrahedron(&vertices, &[10, 11, 12, 13], &phi);

    assert_eq!(clip.pieces.len(), 2);
    let negative = clip.pieces.iter().find(|p| p.side == LevelSetSide::Negative).unwrap();
    assert_scalar_eq!(negative.volume(), 0.125 / 6.0, comp = abs, tol = 1e-15);

    let iso = clip.iso_polygon.unwrap();
    assert_eq!(iso.triangles.len(), 1);
    assert!(iso.vertices.iter().any(|(key, _)| *key == ClipVertexKey::Edge(10, 11)));
    let normal = iso.triangle(0).normal();
    assert!(normal.x > 0.0 && normal.y > 0.0 && normal.z > 0.0);
}

#[test]
fn kuhn_tetrahedra_fill_the_cube() {
    let corners: Vec<Point3<f64>> = (0..8)
        .map(|i| Point3::new((i & 1) as f64, ((i >> 1) & 1) as f64, ((i >> 2) & 1) as f64))
        .collect();
    let total: f64 = kuhn_tetrahedra()
        .iter()
        .map(|t| Tetrahedron::from_vertices(t.map(|v| corners[v])).volume())
        .sum();
    assert_scalar_eq!(total, 1.0, comp = abs, tol = 1e-14);
    for tet in kuhn_tetrahedra() {
        assert_eq!(tet[0], 0);
        assert_eq!(tet[3], 7);
    }
}

proptest! {
    #[test]
    fn clipped_volumes_sum_to_tetrahedron_volume(tet in nondegenerate_tetrahedron(), plane in half_space(1.0)) {
        let vertices = *tet.vertices();
        let phi = vertices.map(|v| plane.eval(&v));
        let clip = clip_tetrahedron(&vertices, &[0, 1, 2, 3], &phi);
        let total: f64 = clip.pieces.iter().map(|p| p.volume()).sum();
        prop_assert!((total - tet.volume()).abs() <= 1e-12 * (1.0 + tet.volume()));

        if let Some(iso) = clip.iso_polygon {
            for i in 0..iso.triangles.len() {
                let triangle = iso.triangle(i);
                let alignment = triangle.normal_dir().dot(&plane.normal);
                prop_assert!(alignment >= -1e-12);
                for v in &triangle.0 {
                    prop_assert!(plane.eval(v).abs() <= 1e-10);
                }
            }
        }
    }
}
