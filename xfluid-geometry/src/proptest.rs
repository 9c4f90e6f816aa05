//! Proptest strategies for geometric test inputs.
use crate::sdf::SdfHalfSpace;
use crate::Tetrahedron;
use nalgebra::{Point3, Vector3};
use proptest::prelude::*;

pub fn point3_in_box(half_width: f64) -> impl Strategy<Value = Point3<f64>> {
    let range = -half_width..half_width;
    [range.clone(), range.clone(), range].prop_map(|[x, y, z]| Point3::new(x, y, z))
}

pub fn unit_vector3() -> impl Strategy<Value = Vector3<f64>> {
    [-1.0..1.0, -1.0..1.0, -1.0..1.0f64]
        .prop_map(|[x, y, z]| Vector3::new(x, y, z))
        .prop_filter("vector must not be too short", |v| v.norm() > 1e-2)
        .prop_map(|v| v.normalize())
}

/// Planes passing through a box of the given half width around the origin.
pub fn half_space(half_width: f64) -> impl Strategy<Value = SdfHalfSpace<f64>> {
    (point3_in_box(half_width), unit_vector3())
        .prop_map(|(point, normal)| SdfHalfSpace::from_point_and_normal(point, normal))
}

/// Tetrahedra with volume bounded away from zero.
pub fn nondegenerate_tetrahedron() -> impl Strategy<Value = Tetrahedron<f64>> {
    [point3_in_box(1.0), point3_in_box(1.0), point3_in_box(1.0), point3_in_box(1.0)]
        .prop_map(Tetrahedron::from_vertices)
        .prop_filter("tetrahedron must not be degenerate", |tet| tet.volume() > 1e-2)
}
