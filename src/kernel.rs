//! Element kernels of the fluid formulation.
//!
//! Every kernel evaluates the time-discrete force residual `F` of a cell set (or an interface
//! or face patch) together with its linearization. The assembled matrix holds
//! `s * dF/dU_{n+1}` and the assembled right-hand side `-s * F`, where `s` is the residual
//! scaling of the time integration scheme.
//!
//! Local element dofs are ordered `4 * node + component` with the pressure as fourth
//! component.
use crate::config::{Linearization, StabilizationParameters};
use crate::element::Hex8Element;
use crate::error::XFluidError;
use crate::function::VectorField;
use crate::nalgebra::{DMatrix, DVector, Matrix3, Point3, SMatrix, Vector3};
use crate::timint::TimeParams;

pub mod face;
pub mod fluid;
pub mod hybrid;
pub mod interface;

/// Number of dofs of a Hex8 element with one dof-set per node.
pub const ELEMENT_DOFS: usize = 32;

/// Reference shapes for which kernels exist.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShapeTag {
    Hex8,
}

impl ShapeTag {
    pub fn num_nodes(&self) -> usize {
        match self {
            Self::Hex8 => 8,
        }
    }

    /// Order of the standard rule used for uncut elements.
    pub fn standard_quadrature_order(&self) -> usize {
        match self {
            Self::Hex8 => 3,
        }
    }
}

/// Parameters shared by all kernels of one assembly pass.
#[derive(Debug, Clone, Copy)]
pub struct KernelContext<'a> {
    pub time: &'a TimeParams,
    pub stabilization: &'a StabilizationParameters,
    pub linearization: Linearization,
    pub body_force: &'a VectorField,
}

impl<'a> KernelContext<'a> {
    /// Residual scaling `s`.
    pub fn scaling(&self) -> f64 {
        self.time.residual_scaling()
    }

    /// Derivative of the evaluated velocity with respect to `velnp`.
    pub fn velocity_factor(&self) -> f64 {
        self.time.velocity_factor()
    }

    /// Derivative of the evaluated acceleration with respect to `velnp`.
    pub fn mass_factor(&self) -> f64 {
        self.time.mass_factor()
    }

    pub fn is_newton(&self) -> bool {
        self.linearization == Linearization::Newton
    }
}

/// Nodal values of the fields of one cell set.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementFields {
    /// Velocity at the evaluation state.
    pub velocity: [Vector3<f64>; 8],
    /// Pressure at the end of the step.
    pub pressure: [f64; 8],
    /// Acceleration at the evaluation state.
    pub acceleration: [Vector3<f64>; 8],
    pub grid_velocity: [Vector3<f64>; 8],
}

impl ElementFields {
    pub fn zeros() -> Self {
        Self {
            velocity: [Vector3::zeros(); 8],
            pressure: [0.0; 8],
            acceleration: [Vector3::zeros(); 8],
            grid_velocity: [Vector3::zeros(); 8],
        }
    }

    /// Gathers the element values from global vectors through the location vector `lm`.
    pub fn gather(
        lm: &[usize],
        velocity: &DVector<f64>,
        pressure: &DVector<f64>,
        acceleration: Option<&DVector<f64>>,
    ) -> Self {
        let mut fields = Self::zeros();
        for a in 0..8 {
            for i in 0..3 {
                fields.velocity[a][i] = velocity[lm[4 * a + i]];
                if let Some(acceleration) = acceleration {
                    fields.acceleration[a][i] = acceleration[lm[4 * a + i]];
                }
            }
            fields.pressure[a] = pressure[lm[4 * a + 3]];
        }
        fields
    }

    pub fn with_grid_velocity(mut self, grid_velocity: [Vector3<f64>; 8]) -> Self {
        self.grid_velocity = grid_velocity;
        self
    }
}

/// Basis functions of a Hex8 element at one reference point.
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct BasisPoint {
    pub N: SMatrix<f64, 1, 8>,
    /// Physical gradients as columns.
    pub G: SMatrix<f64, 3, 8>,
    pub det: f64,
}

impl BasisPoint {
    /// Evaluates the basis, failing on a non-positive Jacobian determinant.
    pub fn evaluate(element_index: usize, element: &Hex8Element<f64>, xi: &Point3<f64>) -> Result<Self, XFluidError> {
        let (gradients, det) = element
            .physical_gradients(xi)
            .ok_or(XFluidError::NegativeJacobian {
                element: element_index,
                determinant: 0.0,
            })?;
        if det <= 0.0 {
            return Err(XFluidError::NegativeJacobian {
                element: element_index,
                determinant: det,
            });
        }
        Ok(Self {
            N: element.evaluate_basis(xi),
            G: gradients,
            det,
        })
    }

    pub fn gradient(&self, a: usize) -> Vector3<f64> {
        self.G.column(a).into_owned()
    }

    pub fn interpolate_vector(&self, values: &[Vector3<f64>; 8]) -> Vector3<f64> {
        (0..8).map(|a| values[a] * self.N[a]).sum()
    }

    pub fn interpolate_scalar(&self, values: &[f64; 8]) -> f64 {
        (0..8).map(|a| values[a] * self.N[a]).sum()
    }

    /// Velocity gradient `(grad u)_ij = du_i / dx_j`.
    pub fn vector_gradient(&self, values: &[Vector3<f64>; 8]) -> Matrix3<f64> {
        (0..8)
            .map(|a| values[a] * self.gradient(a).transpose())
            .sum()
    }

    pub fn scalar_gradient(&self, values: &[f64; 8]) -> Vector3<f64> {
        (0..8).map(|a| self.gradient(a) * values[a]).sum()
    }
}

/// Local matrix and right-hand side over a list of global dofs.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSystem {
    pub dofs: Vec<usize>,
    pub matrix: DMatrix<f64>,
    pub rhs: DVector<f64>,
}

impl LocalSystem {
    pub fn zeros(dofs: Vec<usize>) -> Self {
        let n = dofs.len();
        Self {
            dofs,
            matrix: DMatrix::zeros(n, n),
            rhs: DVector::zeros(n),
        }
    }
}

/// `(grad v + grad v^T) n` for the velocity `v = N_B e_k`.
///
/// Component `i` is `delta_ik (grad N_B . n) + dN_B/dx_i n_k`.
pub(crate) fn unit_strain_traction(gradient: &Vector3<f64>, k: usize, normal: &Vector3<f64>) -> Vector3<f64> {
    let mut t = gradient * normal[k];
    t[k] += gradient.dot(normal);
    t
}
