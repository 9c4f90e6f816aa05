//! Unfitted extended finite element (XFEM) solver for incompressible Navier-Stokes flow on
//! background hexahedral meshes cut by embedded interfaces.
pub mod analytical;
pub mod assembly;
pub mod boundary;
pub mod config;
pub mod connectivity;
pub mod coupling;
pub mod cut;
pub mod dofset;
pub mod driver;
pub mod element;
pub mod error;
pub mod error_norms;
pub mod face_stabilization;
pub mod function;
pub mod initial;
pub mod io;
pub mod kernel;
pub mod krylov_projector;
pub mod lift_drag;
pub mod material;
pub mod mesh;
pub mod quadrature;
pub mod state;
pub mod timint;
pub mod transfer;
pub mod util;

pub(crate) mod workspace;

pub mod geometry {
    pub use xfluid_geometry::*;
}

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
pub extern crate vtkio;

pub use xfluid_geometry::Real;
