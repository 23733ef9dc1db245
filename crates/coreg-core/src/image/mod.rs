//! Volumes with physical metadata.

pub mod image;

pub use image::{geometry_from_affine, Image};
