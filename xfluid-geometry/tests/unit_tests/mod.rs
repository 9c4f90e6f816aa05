mod clip;
mod primitives;
mod sdf;
