//! Geometry for cut-cell computations.
//!
//! Contains the scalar trait used by generic code in `xfluid`, bounding boxes, the
//! tetrahedron and triangle primitives, signed distance functions describing interfaces,
//! triangulated cutter surfaces and the clipping of tetrahedra by a linear level set.
use nalgebra::{Point3, RealField, Scalar, Vector3};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

mod clip;
mod primitives;
pub use clip::*;
pub use primitives::*;

pub mod sdf;
pub mod surface;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub use nalgebra;

/// Real scalar type used throughout the geometry code.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

pub trait BoundedGeometry<T>
where
    T: Scalar,
{
    fn bounding_box(&self) -> AxisAlignedBoundingBox<T>;
}

/// An axis-aligned box in three dimensions.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "Vector3<T>: Serialize"))]
#[serde(bound(deserialize = "Vector3<T>: Deserialize<'de>"))]
pub struct AxisAlignedBoundingBox<T>
where
    T: Scalar,
{
    min: Vector3<T>,
    max: Vector3<T>,
}

impl<T> AxisAlignedBoundingBox<T>
where
    T: Real,
{
    pub fn new(min: Vector3<T>, max: Vector3<T>) -> Self {
        for i in 0..3 {
            assert!(min[i] <= max[i], "Min coordinates must be smaller than max coordinates");
        }
        Self { min, max }
    }

    pub fn min(&self) -> &Vector3<T> {
        &self.min
    }

    pub fn max(&self) -> &Vector3<T> {
        &self.max
    }

    pub fn enclose(&self, other: &Self) -> Self {
        Self::new(self.min.inf(&other.min), self.max.sup(&other.max))
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<T>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((first.coords, first.coords), |(min, max), p| {
            (min.inf(&p.coords), max.sup(&p.coords))
        });
        Some(Self::new(min, max))
    }

    pub fn extents(&self) -> Vector3<T> {
        self.max - self.min
    }

    pub fn max_extent(&self) -> T {
        self.extents().max()
    }

    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn center(&self) -> Point3<T> {
        Point3::from((self.min + self.max) * 0.5)
    }

    pub fn contains_point(&self, point: &Point3<T>) -> bool {
        (0..3).all(|i| self.min[i] <= point[i] && point[i] <= self.max[i])
    }

    pub fn intersects(&self, other: &Self) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }

    /// Grow the box by `distance` in every direction.
    pub fn grow_uniformly(&self, distance: T) -> Self {
        let d = Vector3::repeat(distance);
        Self::new(self.min - d, self.max + d)
    }
}
