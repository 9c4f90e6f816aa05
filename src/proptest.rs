//! Proptest strategies for cut configurations and background meshes.
use crate::cut::{CutterSample, LevelSetSampler};
use crate::mesh::procedural::create_unit_box_uniform_hex_mesh;
use crate::mesh::HexMesh;
use crate::nalgebra::{Point3, Vector3};
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use xfluid_geometry::proptest::{point3_in_box, unit_vector3};

/// A spherical interface, inside is negative.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SphereCutter {
    pub center: Point3<f64>,
    pub radius: f64,
}

impl LevelSetSampler for SphereCutter {
    fn sample(&self, x: &Point3<f64>) -> CutterSample {
        CutterSample {
            phi: (x - self.center).norm() - self.radius,
            side: 0,
            coupling: 0,
        }
    }
}

/// A planar interface with the normal pointing to the outside.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PlaneCutter {
    pub point: Point3<f64>,
    pub normal: Vector3<f64>,
}

impl LevelSetSampler for PlaneCutter {
    fn sample(&self, x: &Point3<f64>) -> CutterSample {
        CutterSample {
            phi: (x - self.point).dot(&self.normal),
            side: 0,
            coupling: 0,
        }
    }
}

/// Spheres that intersect the unit cube.
pub fn sphere_in_unit_cube() -> impl Strategy<Value = SphereCutter> {
    (point3_in_box(0.2), 0.15..0.45).prop_map(|(offset, radius)| SphereCutter {
        center: Point3::new(0.5, 0.5, 0.5) + offset.coords,
        radius,
    })
}

/// Planes passing close to the center of the unit cube.
pub fn plane_through_unit_cube() -> impl Strategy<Value = PlaneCutter> {
    (point3_in_box(0.3), unit_vector3()).prop_map(|(offset, normal)| PlaneCutter {
        point: Point3::new(0.5, 0.5, 0.5) + offset.coords,
        normal,
    })
}

/// Uniform unit-cube meshes whose interior nodes are randomly displaced by less than a
/// quarter of the mesh size, which keeps every element valid.
pub fn perturbed_unit_box_mesh(cells_per_dim: usize) -> impl Strategy<Value = HexMesh> {
    let mesh = create_unit_box_uniform_hex_mesh(cells_per_dim);
    let h = 1.0 / cells_per_dim as f64;
    let num_vertices = mesh.num_vertices();
    vec(point3_in_box(0.2 * h), num_vertices).prop_map(move |offsets| {
        let mut mesh = mesh.clone();
        let boundary = mesh.find_boundary_vertices();
        for (index, (vertex, offset)) in mesh.vertices_mut().iter_mut().zip(offsets).enumerate() {
            if boundary.binary_search(&index).is_err() {
                *vertex += offset.coords;
            }
        }
        mesh
    })
}
