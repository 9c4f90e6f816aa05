//! Quadrature rules on quadrilaterals and hexahedra formed as tensor products of 1D rules.
use super::univariate::gauss;
use super::{QuadraturePair2d, QuadraturePair3d};
use nalgebra::{Point2, Point3};

/// Gauss rule on `[-1, 1]^2` with the given number of points per dimension.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> QuadraturePair2d {
    let n = num_points_per_dim;
    let (weights1d, points1d) = gauss(n);
    let mut weights2d = Vec::with_capacity(n * n);
    let mut points2d = Vec::with_capacity(n * n);

    let rule1d_iter = || weights1d.iter().zip(&points1d);

    for (&wx, &x) in rule1d_iter() {
        for (&wy, &y) in rule1d_iter() {
            weights2d.push(wx * wy);
            points2d.push(Point2::new(x, y));
        }
    }

    (weights2d, points2d)
}

/// Gauss rule on `[-1, 1]^3` with the given number of points per dimension.
pub fn hexahedron_gauss(num_points_per_dim: usize) -> QuadraturePair3d {
    let n = num_points_per_dim;
    let (weights1d, points1d) = gauss(n);
    let mut weights3d = Vec::with_capacity(n * n * n);
    let mut points3d = Vec::with_capacity(n * n * n);

    let rule1d_iter = || weights1d.iter().zip(&points1d);

    for (&wx, &x) in rule1d_iter() {
        for (&wy, &y) in rule1d_iter() {
            for (&wz, &z) in rule1d_iter() {
                weights3d.push(wx * wy * wz);
                points3d.push(Point3::new(x, y, z));
            }
        }
    }

    (weights3d, points3d)
}
