//! Interpolation methods for sampling volumes at continuous indices.

pub mod trait_;
pub mod linear;
pub mod nearest;
pub mod bspline;

pub use trait_::Interpolator;
pub use linear::LinearInterpolator;
pub use nearest::NearestNeighborInterpolator;
pub use bspline::BSplineInterpolator;

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Interpolation mode used when resampling in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Interpolating cubic B-spline.
    #[default]
    Continuous,
    /// Trilinear.
    Linear,
    /// Nearest neighbour; keeps label values intact.
    Nearest,
}

impl Interpolation {
    /// Whether resampled values are clamped to the source intensity range
    /// (widened to include zero).
    ///
    /// Nearest neighbour only ever returns stored values, so it never
    /// needs clipping.
    pub fn clips(&self) -> bool {
        !matches!(self, Interpolation::Nearest)
    }
}

impl std::fmt::Display for Interpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Interpolation::Continuous => "continuous",
            Interpolation::Linear => "linear",
            Interpolation::Nearest => "nearest",
        };
        f.write_str(name)
    }
}

impl<B: Backend> Interpolator<B> for Interpolation {
    fn interpolate<const D: usize>(
        &self,
        data: &Tensor<B, D>,
        indices: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        match self {
            Interpolation::Continuous => BSplineInterpolator::new().interpolate(data, indices),
            Interpolation::Linear => LinearInterpolator::new().interpolate(data, indices),
            Interpolation::Nearest => NearestNeighborInterpolator::new().interpolate(data, indices),
        }
    }
}
