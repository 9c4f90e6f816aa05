//! Mesh input, result output and restart data.
pub mod gmsh;
pub mod msh;
pub mod restart;
pub mod vtk;
