//! Spatial transforms mapping output physical space to input physical space.

pub mod trait_;
pub mod affine;

pub use trait_::Transform;
pub use affine::AffineTransform;
