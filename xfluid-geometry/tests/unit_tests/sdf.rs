use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{Point3, Unit, Vector3};
use xfluid_geometry::sdf::{SdfAxisAlignedBox, SdfCylinder, SdfHalfSpace, SdfSphere, SignedDistanceFunction3d};
use xfluid_geometry::AxisAlignedBoundingBox;

#[test]
fn sphere_distance_and_gradient() {
    let sphere = SdfSphere {
        center: Point3::new(1.0, 0.0, 0.0),
        radius: 0.5,
    };
    assert_scalar_eq!(sphere.eval(&Point3::new(1.0, 0.0, 0.0)), -0.5, comp = abs, tol = 1e-15);
    assert_scalar_eq!(sphere.eval(&Point3::new(3.0, 0.0, 0.0)), 1.5, comp = abs, tol = 1e-15);
    assert_matrix_eq!(
        sphere.gradient(&Point3::new(1.0, 2.0, 0.0)).unwrap(),
        Vector3::y(),
        comp = abs,
        tol = 1e-15
    );
    assert!(sphere.gradient(&Point3::new(1.0, 0.0, 0.0)).is_none());
}

#[test]
fn union_and_complement() {
    let a = SdfSphere {
        center: Point3::new(-1.0, 0.0, 0.0),
        radius: 0.5,
    };
    let b = SdfSphere {
        center: Point3::new(1.0, 0.0, 0.0),
        radius: 0.5,
    };
    let union = a.union(b);
    assert!(union.eval(&Point3::new(-1.0, 0.0, 0.0)) < 0.0);
    assert!(union.eval(&Point3::new(1.0, 0.0, 0.0)) < 0.0);
    assert_scalar_eq!(union.eval(&Point3::origin()), 0.5, comp = abs, tol = 1e-15);

    let complement = union.complement();
    assert_scalar_eq!(complement.eval(&Point3::origin()), -0.5, comp = abs, tol = 1e-15);
}

#[test]
fn half_space_and_cylinder() {
    let plane = SdfHalfSpace::from_point_and_normal(Point3::new(0.0, 0.0, 0.5), Vector3::new(0.0, 0.0, 2.0));
    assert_scalar_eq!(plane.eval(&Point3::new(3.0, -1.0, 0.75)), 0.25, comp = abs, tol = 1e-15);

    let cylinder = SdfCylinder {
        point: Point3::origin(),
        axis: Unit::new_normalize(Vector3::z()),
        radius: 1.0,
    };
    assert_scalar_eq!(cylinder.eval(&Point3::new(2.0, 0.0, 10.0)), 1.0, comp = abs, tol = 1e-15);
    assert_matrix_eq!(
        cylinder.gradient(&Point3::new(0.0, 3.0, -4.0)).unwrap(),
        Vector3::y(),
        comp = abs,
        tol = 1e-15
    );
}

#[test]
fn axis_aligned_box_distance() {
    let sdf = SdfAxisAlignedBox {
        aabb: AxisAlignedBoundingBox::new(Vector3::repeat(-1.0), Vector3::repeat(1.0)),
    };
    assert_scalar_eq!(sdf.eval(&Point3::origin()), -1.0, comp = abs, tol = 1e-15);
    assert_scalar_eq!(sdf.eval(&Point3::new(2.0, 0.0, 0.0)), 1.0, comp = abs, tol = 1e-15);
    assert_scalar_eq!(sdf.eval(&Point3::new(2.0, 2.0, 0.0)), 2.0f64.sqrt(), comp = abs, tol = 1e-15);
    assert_matrix_eq!(
        sdf.gradient(&Point3::new(0.5, 0.0, 0.0)).unwrap(),
        Vector3::x(),
        comp = abs,
        tol = 1e-6
    );
}
