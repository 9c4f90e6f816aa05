//! Sparse linear algebra for the xfluid solver.
//!
//! Provides the [`LinearOperator`] abstraction, a preconditioned conjugate gradient method,
//! restarted GMRES, Jacobi and ILU(0) preconditioners and a few CSR utilities used when
//! setting up and scaling the monolithic fluid system.
pub mod csr;
pub mod krylov;
pub mod precond;

pub use krylov::*;
pub use precond::*;

pub use nalgebra_sparse;
