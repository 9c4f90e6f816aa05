use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{Point3, Vector3};
use xfluid_geometry::{winding_number, Tetrahedron, Triangle3d, TriangleFeature};

fn unit_tet() -> Tetrahedron<f64> {
    Tetrahedron::from_vertices([
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
    ])
}

#[test]
fn tetrahedron_volume_and_centroid() {
    let tet = unit_tet();
    assert_scalar_eq!(tet.signed_volume(), 1.0 / 6.0, comp = abs, tol = 1e-15);
    assert_matrix_eq!(tet.centroid().coords, Vector3::repeat(0.25), comp = abs, tol = 1e-15);

    let [a, b, c, d] = *tet.vertices();
    let flipped = Tetrahedron::from_vertices([a, c, b, d]);
    assert_scalar_eq!(flipped.signed_volume(), -1.0 / 6.0, comp = abs, tol = 1e-15);
    assert_scalar_eq!(flipped.volume(), 1.0 / 6.0, comp = abs, tol = 1e-15);
}

#[test]
fn tetrahedron_barycentric_coordinates_reproduce_point() {
    let tet = Tetrahedron::from_vertices([
        Point3::new(0.1, 0.0, -0.3),
        Point3::new(1.2, 0.1, 0.0),
        Point3::new(0.0, 0.9, 0.2),
        Point3::new(0.3, 0.2, 1.1),
    ]);
    let p = Point3::new(0.3, 0.3, 0.2);
    let lambda = tet.barycentric_coordinates(&p).unwrap();
    assert_scalar_eq!(lambda.iter().sum::<f64>(), 1.0, comp = abs, tol = 1e-14);
    let reproduced = tet
        .vertices()
        .iter()
        .zip(lambda)
        .fold(Vector3::zeros(), |acc, (v, l)| acc + v.coords * l);
    assert_matrix_eq!(reproduced, p.coords, comp = abs, tol = 1e-14);
}

#[test]
fn triangle_closest_point_features() {
    let triangle = Triangle3d([
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ]);
    assert_scalar_eq!(triangle.area(), 0.5, comp = abs, tol = 1e-15);
    assert_matrix_eq!(triangle.normal(), Vector3::z(), comp = abs, tol = 1e-15);

    let (p, feature) = triangle.closest_point(&Point3::new(0.2, 0.2, 1.0));
    assert_eq!(feature, TriangleFeature::Face);
    assert_matrix_eq!(p.coords, Vector3::new(0.2, 0.2, 0.0), comp = abs, tol = 1e-15);

    let (p, feature) = triangle.closest_point(&Point3::new(-1.0, -1.0, 0.5));
    assert_eq!(feature, TriangleFeature::Vertex(0));
    assert_eq!(p, Point3::origin());

    let (p, feature) = triangle.closest_point(&Point3::new(0.5, -2.0, 0.0));
    assert_eq!(feature, TriangleFeature::Edge(0));
    assert_matrix_eq!(p.coords, Vector3::new(0.5, 0.0, 0.0), comp = abs, tol = 1e-15);

    let (p, feature) = triangle.closest_point(&Point3::new(1.0, 1.0, 0.0));
    assert_eq!(feature, TriangleFeature::Edge(1));
    assert_matrix_eq!(p.coords, Vector3::new(0.5, 0.5, 0.0), comp = abs, tol = 1e-15);
    assert_scalar_eq!(triangle.distance(&Point3::new(1.0, 1.0, 0.0)), 0.5f64.sqrt(), comp = abs, tol = 1e-15);
}

#[test]
fn winding_number_of_tetrahedron_boundary() {
    let [a, b, c, d] = *unit_tet().vertices();
    // Outward oriented faces
    let faces = vec![
        Triangle3d([a, c, b]),
        Triangle3d([a, b, d]),
        Triangle3d([a, d, c]),
        Triangle3d([b, c, d]),
    ];
    let inside = winding_number(faces.clone(), &Point3::new(0.1, 0.1, 0.1));
    let outside = winding_number(faces, &Point3::new(1.0, 1.0, 1.0));
    assert_scalar_eq!(inside, 1.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(outside, 0.0, comp = abs, tol = 1e-12);
}
