//! The sampling seam used by the resampler.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Samples a volume at continuous voxel indices.
pub trait Interpolator<B: Backend> {
    /// Values of `data` (laid out `[Z, Y, X]`) at `indices`, an `[N, 3]`
    /// tensor of `(x, y, z)` continuous indices. Returns `[N]`.
    ///
    /// Indices outside the grid still produce a value; masking them is the
    /// caller's job.
    fn interpolate<const D: usize>(
        &self,
        data: &Tensor<B, D>,
        indices: Tensor<B, 2>,
    ) -> Tensor<B, 1>;
}
