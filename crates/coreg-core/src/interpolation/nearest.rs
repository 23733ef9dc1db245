//! Nearest neighbour interpolation.
//!
//! Returns stored voxel values only, so label volumes keep their label set.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use super::trait_::Interpolator;

/// Rounds each index to the nearest voxel (clamped to the grid).
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighborInterpolator;

impl NearestNeighborInterpolator {
    /// Create a new nearest neighbor interpolator.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for NearestNeighborInterpolator {
    fn interpolate<const D: usize>(
        &self,
        data: &Tensor<B, D>,
        indices: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        assert_eq!(D, 3, "NearestNeighborInterpolator only supports 3D volumes");

        let shape = data.shape();
        let (d0, d1, d2) = (shape.dims[0], shape.dims[1], shape.dims[2]); // Z, Y, X
        let n = indices.dims()[0];

        let x = indices.clone().slice([0..n, 0..1]).squeeze::<1>(1);
        let y = indices.clone().slice([0..n, 1..2]).squeeze::<1>(1);
        let z = indices.slice([0..n, 2..3]).squeeze::<1>(1);

        let x_i = x.round().clamp(0.0, (d2 - 1) as f64).int();
        let y_i = y.round().clamp(0.0, (d1 - 1) as f64).int();
        let z_i = z.round().clamp(0.0, (d0 - 1) as f64).int();

        let stride_z = (d1 * d2) as i32;
        let stride_y = d2 as i32;

        let idx = z_i * stride_z + y_i * stride_y + x_i;
        let flat_data = data.clone().reshape([d0 * d1 * d2]);
        flat_data.gather(0, idx)
    }
}
