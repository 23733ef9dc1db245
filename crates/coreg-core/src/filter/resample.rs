//! Resample image filter.
//!
//! [`ResampleImageFilter`] resamples a volume onto a new grid using a
//! transform and an interpolator. Output voxels whose source location
//! falls outside the input's data extent get the default pixel value, and
//! values can optionally be clamped to the input's intensity range widened
//! to include zero.

use std::marker::PhantomData;
use burn::tensor::{Int, Shape, Tensor, TensorData};
use burn::tensor::backend::Backend;
use nalgebra::Matrix4;
use crate::image::{geometry_from_affine, Image};
use crate::spatial::{Point, Spacing, Direction};
use crate::transform::trait_::Transform;
use crate::interpolation::trait_::Interpolator;

/// Slack, in voxels, when deciding whether a sample lies inside the input grid.
const EXTENT_TOLERANCE: f64 = 1e-3;

/// Resample image filter.
///
/// The transform maps Output Physical Space -> Input Physical Space.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `T` - The transform type
/// * `I` - The interpolator type
pub struct ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B, 3>,
    I: Interpolator<B>,
{
    shape: [usize; 3],
    origin: Point<3>,
    spacing: Spacing<3>,
    direction: Direction<3>,
    transform: T,
    interpolator: I,
    default_pixel_value: f64,
    clip: bool,
    _phantom: PhantomData<B>,
}

impl<B, T, I> ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B, 3>,
    I: Interpolator<B>,
{
    /// Create a new resample filter.
    ///
    /// # Arguments
    /// * `shape` - Output tensor shape, `[Z, Y, X]`
    /// * `origin` - Output origin
    /// * `spacing` - Output spacing
    /// * `direction` - Output direction
    /// * `transform` - Transform from output space to input space
    /// * `interpolator` - Interpolator for input sampling
    pub fn new(
        shape: [usize; 3],
        origin: Point<3>,
        spacing: Spacing<3>,
        direction: Direction<3>,
        transform: T,
        interpolator: I,
    ) -> Self {
        Self {
            shape,
            origin,
            spacing,
            direction,
            transform,
            interpolator,
            default_pixel_value: 0.0,
            clip: false,
            _phantom: PhantomData,
        }
    }

    /// Output grid described by a tensor shape and a voxel-to-world affine.
    pub fn new_from_affine(
        shape: [usize; 3],
        affine: &Matrix4<f64>,
        transform: T,
        interpolator: I,
    ) -> Self {
        let (origin, spacing, direction) = geometry_from_affine(affine);
        Self::new(shape, origin, spacing, direction, transform, interpolator)
    }

    /// Output grid copied from a reference image.
    pub fn new_from_reference(reference: &Image<B, 3>, transform: T, interpolator: I) -> Self {
        Self::new(
            reference.shape(),
            *reference.origin(),
            *reference.spacing(),
            *reference.direction(),
            transform,
            interpolator,
        )
    }

    /// Value for voxels that map outside the input's data extent.
    pub fn with_default_pixel_value(mut self, value: f64) -> Self {
        self.default_pixel_value = value;
        self
    }

    /// Clamp interpolated values to `[min(lo, 0), max(hi, 0)]`, where
    /// `[lo, hi]` is the input's intensity range.
    ///
    /// Zero stays representable because outside voxels are zero-filled.
    pub fn with_clipping(mut self, clip: bool) -> Self {
        self.clip = clip;
        self
    }

    /// Apply filter to an input image.
    pub fn apply(&self, input: &Image<B, 3>) -> Image<B, 3> {
        let device = input.data().device();

        let output_indices = self.generate_grid_indices(&device);
        let output_points = self.indices_to_physical(output_indices, &device);
        let input_points = self.transform.transform_points(output_points);
        let input_indices = input.world_to_index_tensor(input_points);

        let inside = Self::inside_mask(&input_indices, input.size());
        let mut values = self.interpolator.interpolate(input.data(), input_indices);

        if self.clip {
            let (min, max) = input.intensity_range();
            values = values.clamp(min.min(0.0), max.max(0.0));
        }

        let outside = inside.lower_elem(0.5);
        let values = values.mask_fill(outside, self.default_pixel_value);

        Image::new(
            values.reshape(Shape::new(self.shape)),
            self.origin,
            self.spacing,
            self.direction,
        )
    }

    /// 1.0 where the continuous index lies within the input grid, else 0.0.
    fn inside_mask(indices: &Tensor<B, 2>, size: [usize; 3]) -> Tensor<B, 1> {
        let n = indices.dims()[0];
        let mut inside = Tensor::<B, 1>::ones([n], &indices.device());
        for (axis, &len) in size.iter().enumerate() {
            let upper = (len - 1) as f64 + EXTENT_TOLERANCE;
            let coord = indices.clone().narrow(1, axis, 1).squeeze::<1>(1);
            let above = coord.clone().greater_equal_elem(-EXTENT_TOLERANCE).float();
            let below = coord.lower_equal_elem(upper).float();
            inside = inside * above * below;
        }
        inside
    }

    fn generate_grid_indices(&self, device: &B::Device) -> Tensor<B, 2> {
        let [d, h, w] = self.shape;

        let z_range = Tensor::<B, 1, Int>::arange(0..d as i64, device);
        let y_range = Tensor::<B, 1, Int>::arange(0..h as i64, device);
        let x_range = Tensor::<B, 1, Int>::arange(0..w as i64, device);

        let z_grid = z_range.reshape([d, 1, 1]).repeat(&[1, h, w]).reshape([d * h * w]);
        let y_grid = y_range.reshape([1, h, 1]).repeat(&[d, 1, w]).reshape([d * h * w]);
        let x_grid = x_range.reshape([1, 1, w]).repeat(&[d, h, 1]).reshape([d * h * w]);

        Tensor::cat(vec![
            x_grid.float().unsqueeze_dim(1),
            y_grid.float().unsqueeze_dim(1),
            z_grid.float().unsqueeze_dim(1),
        ], 1)
    }

    fn indices_to_physical(&self, indices: Tensor<B, 2>, device: &B::Device) -> Tensor<B, 2> {
        // point = origin + Direction * (index * spacing)
        let origin_vec: Vec<f32> = (0..3).map(|i| self.origin[i] as f32).collect();
        let origin_tensor = Tensor::<B, 1>::from_data(
            TensorData::new(origin_vec, Shape::new([3])),
            device,
        ).reshape([1, 3]);

        let spacing_vec: Vec<f32> = (0..3).map(|i| self.spacing[i] as f32).collect();
        let spacing_tensor = Tensor::<B, 1>::from_data(
            TensorData::new(spacing_vec, Shape::new([3])),
            device,
        ).reshape([1, 3]);

        let scaled_indices = indices * spacing_tensor;

        // Row vectors need D^T.
        let mut dir_data = Vec::with_capacity(9);
        for c in 0..3 {
            for r in 0..3 {
                dir_data.push(self.direction[(r, c)] as f32);
            }
        }
        let dir_t_tensor = Tensor::<B, 2>::from_data(
            TensorData::new(dir_data, Shape::new([3, 3])),
            device,
        );

        origin_tensor + scaled_indices.matmul(dir_t_tensor)
    }
}
