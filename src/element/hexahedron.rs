use itertools::Itertools;
use numeric_literals::replace_float_literals;

use crate::connectivity::{Hex8Connectivity, HEX8_FACE_NODES};
use crate::element::{phi_linear_1d, phi_linear_1d_grad, FiniteElement, Quad4d3Element};
use crate::nalgebra::{distance, Matrix3, Point2, Point3, SMatrix, Vector3};
use crate::Real;

/// Trilinear hexahedron on the reference domain `[-1, 1]^3`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Hex8Element<T: Real> {
    vertices: [Point3<T>; 8],
}

impl<T: Real> Hex8Element<T> {
    pub fn from_vertices(vertices: [Point3<T>; 8]) -> Self {
        Self { vertices }
    }

    /// Builds the element from mesh vertices, or `None` if an index is out of bounds.
    pub fn from_connectivity(connectivity: &Hex8Connectivity, vertices: &[Point3<T>]) -> Option<Self> {
        let mut element_vertices = [Point3::origin(); 8];
        for (v, &idx) in element_vertices.iter_mut().zip(&connectivity.0) {
            *v = *vertices.get(idx)?;
        }
        Some(Self::from_vertices(element_vertices))
    }

    pub fn vertices(&self) -> &[Point3<T>; 8] {
        &self.vertices
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn reference() -> Self {
        Self::from_vertices(Self::reference_vertices())
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn reference_vertices() -> [Point3<T>; 8] {
        [
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(1.0, 1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
            Point3::new(1.0, -1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(-1.0, 1.0, 1.0),
        ]
    }

    #[rustfmt::skip]
    pub fn evaluate_basis(&self, xi: &Point3<T>) -> SMatrix<T, 1, 8> {
        // N_{alpha, beta, gamma} is one at the reference vertex (alpha, beta, gamma)
        let phi = |[alpha, beta, gamma]: [T; 3]|
            phi_linear_1d(alpha, xi[0]) * phi_linear_1d(beta, xi[1]) * phi_linear_1d(gamma, xi[2]);
        SMatrix::<T, 1, 8>::from_iterator(reference_signs::<T>().into_iter().map(phi))
    }

    #[rustfmt::skip]
    pub fn gradients(&self, xi: &Point3<T>) -> SMatrix<T, 3, 8> {
        let phi_1d = phi_linear_1d;
        let grad_1d = phi_linear_1d_grad;
        let phi_grad = |[alpha, beta, gamma]: [T; 3]|
            Vector3::new(
                grad_1d(alpha) * phi_1d(beta, xi[1]) * phi_1d(gamma, xi[2]),
                phi_1d(alpha, xi[0]) * grad_1d(beta) * phi_1d(gamma, xi[2]),
                phi_1d(alpha, xi[0]) * phi_1d(beta, xi[1]) * grad_1d(gamma)
            );
        SMatrix::<T, 3, 8>::from_columns(&reference_signs::<T>().map(phi_grad))
    }

    /// Second derivatives of each basis function with respect to reference coordinates.
    ///
    /// The pure second derivatives of a trilinear function vanish, only the mixed ones remain.
    pub fn reference_hessians(&self, xi: &Point3<T>) -> [Matrix3<T>; 8] {
        reference_signs::<T>().map(|signs| {
            let mut hessian = Matrix3::zeros();
            for (i, j) in (0..3).tuple_combinations() {
                let k = 3 - i - j;
                let value = phi_linear_1d_grad(signs[i]) * phi_linear_1d_grad(signs[j]) * phi_linear_1d(signs[k], xi[k]);
                hessian[(i, j)] = value;
                hessian[(j, i)] = value;
            }
            hessian
        })
    }

    /// Physical basis gradients, stored as columns, and the Jacobian determinant.
    ///
    /// Returns `None` if the Jacobian is singular.
    pub fn physical_gradients(&self, xi: &Point3<T>) -> Option<(SMatrix<T, 3, 8>, T)> {
        let jacobian = self.reference_jacobian(xi);
        let det = jacobian.determinant();
        let inv_t = jacobian.try_inverse()?.transpose();
        Some((inv_t * self.gradients(xi), det))
    }

    /// Physical second derivatives of the basis functions.
    ///
    /// The geometry is treated as affine at `xi`, which is exact for parallelepipeds.
    pub fn physical_hessians(&self, xi: &Point3<T>) -> Option<[Matrix3<T>; 8]> {
        let inv = self.reference_jacobian(xi).try_inverse()?;
        let inv_t = inv.transpose();
        Some(self.reference_hessians(xi).map(|h| inv_t * h * inv))
    }

    /// Length of a cube with the same volume as the element.
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn volume_equivalent_length(&self) -> T {
        let det = self.reference_jacobian(&Point3::origin()).determinant();
        (8.0 * det.abs()).cbrt()
    }

    /// The quadrilateral of local face `face`, following [`HEX8_FACE_NODES`].
    pub fn face(&self, face: usize) -> Quad4d3Element<T> {
        Quad4d3Element::from_vertices(HEX8_FACE_NODES[face].map(|i| self.vertices[i]))
    }

    /// Maps face reference coordinates `(s, t)` of local face `face` to element reference
    /// coordinates by bilinear interpolation of the reference vertices of the face nodes.
    pub fn face_to_reference(face: usize, st: &Point2<T>) -> Point3<T> {
        let reference_face = Quad4d3Element::from_vertices(HEX8_FACE_NODES[face].map(|i| Self::reference_vertices()[i]));
        reference_face.map_reference_coords(st)
    }
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn reference_signs<T: Real>() -> [[T; 3]; 8] {
    [
        [-1.0, -1.0, -1.0],
        [1.0, -1.0, -1.0],
        [1.0, 1.0, -1.0],
        [-1.0, 1.0, -1.0],
        [-1.0, -1.0, 1.0],
        [1.0, -1.0, 1.0],
        [1.0, 1.0, 1.0],
        [-1.0, 1.0, 1.0],
    ]
}

impl<T: Real> FiniteElement<T> for Hex8Element<T> {
    #[allow(non_snake_case)]
    fn map_reference_coords(&self, xi: &Point3<T>) -> Point3<T> {
        let X = SMatrix::<T, 3, 8>::from_fn(|i, j| self.vertices[j][i]);
        let N = self.evaluate_basis(xi);
        Point3::from(X * N.transpose())
    }

    #[allow(non_snake_case)]
    fn reference_jacobian(&self, xi: &Point3<T>) -> Matrix3<T> {
        let X = SMatrix::<T, 3, 8>::from_fn(|i, j| self.vertices[j][i]);
        let G = self.gradients(xi);
        X * G.transpose()
    }

    fn diameter(&self) -> T {
        self.vertices
            .iter()
            .tuple_combinations()
            .map(|(x, y)| distance(x, y))
            .fold(T::zero(), |a, b| a.max(b))
    }
}
