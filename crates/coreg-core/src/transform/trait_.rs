//! The transform seam used by the resampler.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Maps world-space points of an output grid into the world space of the
/// volume being sampled.
pub trait Transform<B: Backend, const D: usize> {
    /// `points` and the result are `[N, D]`, one `(x, y, z)` row per point.
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}
