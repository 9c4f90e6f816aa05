//! Quadrature rules on the unit triangle and the unit tetrahedron.
//!
//! Low degrees use classical symmetric rules. Higher degrees use collapsed (Duffy) tensor
//! products of Gauss rules, which are exact but use more points than optimal rules.
use super::univariate::gauss_unit_interval;
use super::{QuadraturePair2d, QuadraturePair3d};
use nalgebra::{Point2, Point3};

/// Rule on the unit tetrahedron exact for polynomials of the given total degree.
///
/// Weights sum to the reference volume `1/6`.
pub fn tetrahedron(degree: usize) -> QuadraturePair3d {
    match degree {
        0 | 1 => (vec![1.0 / 6.0], vec![Point3::new(0.25, 0.25, 0.25)]),
        2 => {
            let a = 0.585_410_196_624_968_5;
            let b = 0.138_196_601_125_010_5;
            let points = vec![
                Point3::new(b, b, b),
                Point3::new(a, b, b),
                Point3::new(b, a, b),
                Point3::new(b, b, a),
            ];
            (vec![1.0 / 24.0; 4], points)
        }
        _ => collapsed_tetrahedron(degree),
    }
}

/// Rule on the unit triangle exact for polynomials of the given total degree.
///
/// Weights sum to the reference area `1/2`.
pub fn triangle(degree: usize) -> QuadraturePair2d {
    match degree {
        0 | 1 => (vec![0.5], vec![Point2::new(1.0 / 3.0, 1.0 / 3.0)]),
        2 => {
            let points = vec![
                Point2::new(1.0 / 6.0, 1.0 / 6.0),
                Point2::new(2.0 / 3.0, 1.0 / 6.0),
                Point2::new(1.0 / 6.0, 2.0 / 3.0),
            ];
            (vec![1.0 / 6.0; 3], points)
        }
        _ => collapsed_triangle(degree),
    }
}

fn collapsed_triangle(degree: usize) -> QuadraturePair2d {
    // The Jacobian (1 - b) raises the degree in b by one
    let n = (degree + 3) / 2;
    let (weights1d, points1d) = gauss_unit_interval(n);
    let mut weights = Vec::with_capacity(n * n);
    let mut points = Vec::with_capacity(n * n);
    for (&wa, &a) in weights1d.iter().zip(&points1d) {
        for (&wb, &b) in weights1d.iter().zip(&points1d) {
            weights.push(wa * wb * (1.0 - b));
            points.push(Point2::new(a * (1.0 - b), b));
        }
    }
    (weights, points)
}

fn collapsed_tetrahedron(degree: usize) -> QuadraturePair3d {
    // The Jacobian (1 - b)(1 - c)^2 raises the degree in c by two
    let n = (degree + 4) / 2;
    let (weights1d, points1d) = gauss_unit_interval(n);
    let rule = || weights1d.iter().zip(&points1d);
    let mut weights = Vec::with_capacity(n * n * n);
    let mut points = Vec::with_capacity(n * n * n);
    for (&wa, &a) in rule() {
        for (&wb, &b) in rule() {
            for (&wc, &c) in rule() {
                weights.push(wa * wb * wc * (1.0 - b) * (1.0 - c) * (1.0 - c));
                points.push(Point3::new(a * (1.0 - b) * (1.0 - c), b * (1.0 - c), c));
            }
        }
    }
    (weights, points)
}
