//! Trilinear interpolation.

use burn::tensor::{Int, Tensor};
use burn::tensor::backend::Backend;
use super::trait_::Interpolator;

/// Trilinear interpolator. Neighbours outside the grid are clamped to the
/// nearest edge voxel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

/// Lower and upper neighbour along one axis plus the weight of the upper one.
struct Bracket<B: Backend> {
    lo: Tensor<B, 1, Int>,
    hi: Tensor<B, 1, Int>,
    frac: Tensor<B, 1>,
}

impl<B: Backend> Bracket<B> {
    fn new(coord: Tensor<B, 1>, len: usize) -> Self {
        let last = (len - 1) as f64;
        let floor = coord.clone().floor();
        Self {
            lo: floor.clone().clamp(0.0, last).int(),
            hi: (floor.clone() + 1.0).clamp(0.0, last).int(),
            frac: coord - floor,
        }
    }

    fn pick(&self, upper: bool) -> (Tensor<B, 1, Int>, Tensor<B, 1>) {
        if upper {
            (self.hi.clone(), self.frac.clone())
        } else {
            (self.lo.clone(), self.frac.clone().neg().add_scalar(1.0))
        }
    }
}

impl LinearInterpolator {
    /// Create a new linear interpolator.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate<const D: usize>(
        &self,
        data: &Tensor<B, D>,
        indices: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        assert_eq!(D, 3, "LinearInterpolator only supports 3D volumes");

        let shape = data.shape();
        let (nz, ny, nx) = (shape.dims[0], shape.dims[1], shape.dims[2]);
        let n = indices.dims()[0];

        let axis = |i: usize, len: usize| {
            Bracket::new(indices.clone().narrow(1, i, 1).squeeze::<1>(1), len)
        };
        let (bx, by, bz) = (axis(0, nx), axis(1, ny), axis(2, nz));

        let flat = data.clone().reshape([nz * ny * nx]);
        let mut acc = Tensor::<B, 1>::zeros([n], &indices.device());

        // Sum the eight corners of the enclosing cell, each weighted by the
        // product of its per-axis weights.
        for corner in 0..8u8 {
            let (xi, wx) = bx.pick(corner & 1 != 0);
            let (yi, wy) = by.pick(corner & 2 != 0);
            let (zi, wz) = bz.pick(corner & 4 != 0);

            let offset = zi * (ny * nx) as i32 + yi * nx as i32 + xi;
            acc = acc + flat.clone().gather(0, offset) * wx * wy * wz;
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_trilinear_midpoint_is_mean() {
        let device = Default::default();
        let data = Tensor::<TestBackend, 3>::from_floats(
            [
                [[1.0, 2.0], [3.0, 4.0]],
                [[5.0, 6.0], [7.0, 8.0]],
            ],
            &device,
        );
        let indices = Tensor::<TestBackend, 2>::from_floats([[0.5, 0.5, 0.5]], &device);

        let values = LinearInterpolator::new().interpolate(&data, indices).into_data();
        assert!((values.as_slice::<f32>().unwrap()[0] - 4.5).abs() < 1e-6);
    }

    #[test]
    fn test_linear_along_x() {
        let device = Default::default();
        let data = Tensor::<TestBackend, 3>::from_floats([[[0.0, 10.0, 20.0]]], &device);
        let indices =
            Tensor::<TestBackend, 2>::from_floats([[0.25, 0.0, 0.0], [1.5, 0.0, 0.0]], &device);

        let values = LinearInterpolator::new().interpolate(&data, indices).into_data();
        let slice = values.as_slice::<f32>().unwrap();
        assert!((slice[0] - 2.5).abs() < 1e-5);
        assert!((slice[1] - 15.0).abs() < 1e-5);
    }
}
