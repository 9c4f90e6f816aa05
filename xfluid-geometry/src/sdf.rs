//! Analytic signed distance functions in three dimensions.
//!
//! The sign convention is negative inside and positive outside.
use crate::{AxisAlignedBoundingBox, Real};
use nalgebra::{Point3, Scalar, Unit, Vector3};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

pub trait SignedDistanceFunction3d<T>
where
    T: Scalar,
{
    fn eval(&self, x: &Point3<T>) -> T;
    fn gradient(&self, x: &Point3<T>) -> Option<Vector3<T>>;

    fn union<Other>(self, other: Other) -> SdfUnion<Self, Other>
    where
        Self: Sized,
        Other: Sized + SignedDistanceFunction3d<T>,
    {
        SdfUnion {
            left: self,
            right: other,
        }
    }

    fn complement(self) -> SdfComplement<Self>
    where
        Self: Sized,
    {
        SdfComplement { inner: self }
    }
}

impl<T, S> SignedDistanceFunction3d<T> for Box<S>
where
    T: Scalar,
    S: ?Sized + SignedDistanceFunction3d<T>,
{
    fn eval(&self, x: &Point3<T>) -> T {
        S::eval(self, x)
    }

    fn gradient(&self, x: &Point3<T>) -> Option<Vector3<T>> {
        S::gradient(self, x)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize, Point3<T>: Serialize"))]
#[serde(bound(deserialize = "T: Deserialize<'de>, Point3<T>: Deserialize<'de>"))]
pub struct SdfSphere<T>
where
    T: Scalar,
{
    pub center: Point3<T>,
    pub radius: T,
}

impl<T: Real> SignedDistanceFunction3d<T> for SdfSphere<T> {
    fn eval(&self, x: &Point3<T>) -> T {
        (x - self.center).norm() - self.radius
    }

    fn gradient(&self, x: &Point3<T>) -> Option<Vector3<T>> {
        let d = x - self.center;
        let d_norm = d.norm();
        if d_norm > T::zero() {
            Some(d / d_norm)
        } else {
            None
        }
    }
}

/// The half space `{x : n · (x - p) < 0}`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SdfHalfSpace<T>
where
    T: Scalar,
{
    pub point: Point3<T>,
    pub normal: Unit<Vector3<T>>,
}

impl<T: Real> SdfHalfSpace<T> {
    pub fn from_point_and_normal(point: Point3<T>, normal: Vector3<T>) -> Self {
        Self {
            point,
            normal: Unit::new_normalize(normal),
        }
    }
}

impl<T: Real> SignedDistanceFunction3d<T> for SdfHalfSpace<T> {
    fn eval(&self, x: &Point3<T>) -> T {
        self.normal.dot(&(x - self.point))
    }

    fn gradient(&self, _x: &Point3<T>) -> Option<Vector3<T>> {
        Some(self.normal.into_inner())
    }
}

/// Infinite circular cylinder around the line through `point` along `axis`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SdfCylinder<T>
where
    T: Scalar,
{
    pub point: Point3<T>,
    pub axis: Unit<Vector3<T>>,
    pub radius: T,
}

impl<T: Real> SdfCylinder<T> {
    fn radial(&self, x: &Point3<T>) -> Vector3<T> {
        let d = x - self.point;
        let axial = self.axis.dot(&d);
        d - self.axis.as_ref() * axial
    }
}

impl<T: Real> SignedDistanceFunction3d<T> for SdfCylinder<T> {
    fn eval(&self, x: &Point3<T>) -> T {
        self.radial(x).norm() - self.radius
    }

    fn gradient(&self, x: &Point3<T>) -> Option<Vector3<T>> {
        let r = self.radial(x);
        let r_norm = r.norm();
        if r_norm > T::zero() {
            Some(r / r_norm)
        } else {
            None
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SdfAxisAlignedBox<T>
where
    T: Scalar,
{
    pub aabb: AxisAlignedBoundingBox<T>,
}

impl<T> SignedDistanceFunction3d<T> for SdfAxisAlignedBox<T>
where
    T: Real,
{
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn eval(&self, x: &Point3<T>) -> T {
        let b = self.aabb.extents() / 2.0;
        let p = x - self.aabb.center();
        let d = p.abs() - b;

        // Outside part
        let outside = d.map(|d_i| d_i.max(0.0)).norm();
        // Inside part
        let inside = d.max().min(0.0);
        outside + inside
    }

    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn gradient(&self, x: &Point3<T>) -> Option<Vector3<T>> {
        let h = T::default_epsilon().sqrt() * (1.0 + self.aabb.max_extent());
        let mut grad = Vector3::zeros();
        for i in 0..3 {
            let mut x_plus = *x;
            let mut x_minus = *x;
            x_plus[i] += h;
            x_minus[i] -= h;
            grad[i] = (self.eval(&x_plus) - self.eval(&x_minus)) / (2.0 * h);
        }
        Some(grad)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct SdfUnion<Left, Right> {
    pub left: Left,
    pub right: Right,
}

impl<T, Left, Right> SignedDistanceFunction3d<T> for SdfUnion<Left, Right>
where
    T: Real,
    Left: SignedDistanceFunction3d<T>,
    Right: SignedDistanceFunction3d<T>,
{
    fn eval(&self, x: &Point3<T>) -> T {
        self.left.eval(x).min(self.right.eval(x))
    }

    fn gradient(&self, x: &Point3<T>) -> Option<Vector3<T>> {
        if self.left.eval(x) <= self.right.eval(x) {
            self.left.gradient(x)
        } else {
            self.right.gradient(x)
        }
    }
}

/// Swaps inside and outside.
#[derive(Copy, Clone, Debug)]
pub struct SdfComplement<Inner> {
    pub inner: Inner,
}

impl<T, Inner> SignedDistanceFunction3d<T> for SdfComplement<Inner>
where
    T: Real,
    Inner: SignedDistanceFunction3d<T>,
{
    fn eval(&self, x: &Point3<T>) -> T {
        -self.inner.eval(x)
    }

    fn gradient(&self, x: &Point3<T>) -> Option<Vector3<T>> {
        self.inner.gradient(x).map(|g| -g)
    }
}
