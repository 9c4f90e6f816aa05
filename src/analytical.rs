//! Analytical flow solutions for initial fields and error evaluation.
use crate::function::{ScalarField, VectorField};
use crate::nalgebra::{Matrix3, Point3, Vector3};
use std::f64::consts::PI;

/// A velocity and pressure field given in closed form.
pub trait ExactSolution: Send + Sync {
    fn velocity(&self, x: &Point3<f64>, t: f64) -> Vector3<f64>;

    fn pressure(&self, x: &Point3<f64>, t: f64) -> f64;

    /// `(grad u)_ij = du_i / dx_j`, by central differences unless overridden.
    fn velocity_gradient(&self, x: &Point3<f64>, t: f64) -> Matrix3<f64> {
        const STEP: f64 = 1e-6;
        let mut gradient = Matrix3::zeros();
        for j in 0..3 {
            let mut offset = Vector3::zeros();
            offset[j] = STEP;
            let forward = self.velocity(&(x + offset), t);
            let backward = self.velocity(&(x - offset), t);
            gradient.set_column(j, &((forward - backward) / (2.0 * STEP)));
        }
        gradient
    }
}

/// Three-dimensional Beltrami flow (Ethier and Steinman), an exact solution of the unsteady
/// Navier-Stokes equations on all of space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BeltramiFlow {
    pub a: f64,
    pub d: f64,
    pub density: f64,
    pub kinematic_viscosity: f64,
}

impl BeltramiFlow {
    pub fn new(density: f64, kinematic_viscosity: f64) -> Self {
        Self {
            a: PI / 4.0,
            d: PI / 2.0,
            density,
            kinematic_viscosity,
        }
    }

    fn decay(&self, t: f64) -> f64 {
        (-self.kinematic_viscosity * self.d * self.d * t).exp()
    }
}

impl ExactSolution for BeltramiFlow {
    fn velocity(&self, x: &Point3<f64>, t: f64) -> Vector3<f64> {
        let (a, d) = (self.a, self.d);
        let (x, y, z) = (x.x, x.y, x.z);
        let decay = self.decay(t);
        Vector3::new(
            -a * ((a * x).exp() * (a * y + d * z).sin() + (a * z).exp() * (a * x + d * y).cos()),
            -a * ((a * y).exp() * (a * z + d * x).sin() + (a * x).exp() * (a * y + d * z).cos()),
            -a * ((a * z).exp() * (a * x + d * y).sin() + (a * y).exp() * (a * z + d * x).cos()),
        ) * decay
    }

    fn pressure(&self, x: &Point3<f64>, t: f64) -> f64 {
        let (a, d) = (self.a, self.d);
        let (x, y, z) = (x.x, x.y, x.z);
        let decay = self.decay(t);
        let bracket = (2.0 * a * x).exp()
            + (2.0 * a * y).exp()
            + (2.0 * a * z).exp()
            + 2.0 * (a * x + d * y).sin() * (a * z + d * x).cos() * (a * (y + z)).exp()
            + 2.0 * (a * y + d * z).sin() * (a * x + d * y).cos() * (a * (z + x)).exp()
            + 2.0 * (a * z + d * x).sin() * (a * y + d * z).cos() * (a * (x + y)).exp();
        -0.5 * a * a * self.density * bracket * decay * decay
    }
}

/// Plane Poiseuille flow in `x` direction between the walls `y = 0` and `y = height`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PoiseuilleFlow {
    pub max_velocity: f64,
    pub height: f64,
    pub viscosity: f64,
}

impl PoiseuilleFlow {
    /// Magnitude of the constant pressure gradient driving the flow.
    pub fn pressure_gradient(&self) -> f64 {
        8.0 * self.viscosity * self.max_velocity / (self.height * self.height)
    }
}

impl ExactSolution for PoiseuilleFlow {
    fn velocity(&self, x: &Point3<f64>, _t: f64) -> Vector3<f64> {
        let h = self.height;
        Vector3::new(4.0 * self.max_velocity * x.y * (h - x.y) / (h * h), 0.0, 0.0)
    }

    fn pressure(&self, x: &Point3<f64>, _t: f64) -> f64 {
        -self.pressure_gradient() * x.x
    }

    fn velocity_gradient(&self, x: &Point3<f64>, _t: f64) -> Matrix3<f64> {
        let h = self.height;
        let mut gradient = Matrix3::zeros();
        gradient[(0, 1)] = 4.0 * self.max_velocity * (h - 2.0 * x.y) / (h * h);
        gradient
    }
}

/// A user-supplied solution.
#[derive(Debug, Clone)]
pub struct FunctionSolution {
    pub velocity: VectorField,
    pub pressure: ScalarField,
}

impl ExactSolution for FunctionSolution {
    fn velocity(&self, x: &Point3<f64>, t: f64) -> Vector3<f64> {
        self.velocity.eval(x, t)
    }

    fn pressure(&self, x: &Point3<f64>, t: f64) -> f64 {
        self.pressure.eval(x, t)
    }
}
