//! Spatial types for representing points, vectors, spacing, and direction matrices.
//!
//! All types are thin wrappers over nalgebra and carry `f64` coordinates.

pub mod point;
pub mod vector;
pub mod spacing;
pub mod direction;

pub use point::Point;
pub use vector::Vector;
pub use spacing::Spacing;
pub use direction::Direction;
