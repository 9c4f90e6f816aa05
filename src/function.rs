//! Space-time functions used for boundary values, body forces and initial fields.
use crate::nalgebra::{Point3, Vector3};
use std::fmt;
use std::sync::Arc;

pub type VectorFunction = dyn Fn(&Point3<f64>, f64) -> Vector3<f64> + Send + Sync;
pub type ScalarFunction = dyn Fn(&Point3<f64>, f64) -> f64 + Send + Sync;

/// Vector-valued field `f(x, t)`.
#[derive(Clone)]
pub enum VectorField {
    Constant(Vector3<f64>),
    Function(Arc<VectorFunction>),
}

impl VectorField {
    pub fn zero() -> Self {
        Self::Constant(Vector3::zeros())
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Point3<f64>, f64) -> Vector3<f64> + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    pub fn eval(&self, x: &Point3<f64>, t: f64) -> Vector3<f64> {
        match self {
            Self::Constant(value) => *value,
            Self::Function(f) => f(x, t),
        }
    }
}

impl fmt::Debug for VectorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl From<Vector3<f64>> for VectorField {
    fn from(value: Vector3<f64>) -> Self {
        Self::Constant(value)
    }
}

/// Scalar-valued field `f(x, t)`.
#[derive(Clone)]
pub enum ScalarField {
    Constant(f64),
    Function(Arc<ScalarFunction>),
}

impl ScalarField {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Point3<f64>, f64) -> f64 + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    pub fn eval(&self, x: &Point3<f64>, t: f64) -> f64 {
        match self {
            Self::Constant(value) => *value,
            Self::Function(f) => f(x, t),
        }
    }
}

impl fmt::Debug for ScalarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}
