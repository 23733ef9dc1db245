//! Translation-only alignment of volume centres.
//!
//! The centre of a volume is the world position of voxel
//! `(nx/2, ny/2, nz/2)` (integer division). Re-centring resamples a volume
//! onto the reference grid shifted by the offset between two centres.

use burn::tensor::backend::Backend;
use nalgebra::Matrix4;
use tracing::info;

use coreg_core::filter::ResampleImageFilter;
use coreg_core::transform::AffineTransform;
use coreg_core::{Image, Interpolation, Point, Vector};

/// World coordinates of the centre voxel.
pub fn image_center<B: Backend>(image: &Image<B, 3>) -> Point<3> {
    let [nx, ny, nz] = image.size();
    let index = Point::new([(nx / 2) as f64, (ny / 2) as f64, (nz / 2) as f64]);
    image.transform_continuous_index_to_physical_point(&index)
}

/// `image_center(reference) - image_center(moving)`.
pub fn translation_offset<B: Backend>(reference: &Image<B, 3>, moving: &Image<B, 3>) -> Vector<3> {
    image_center(reference) - image_center(moving)
}

/// Reference affine shifted in world space by `offset`.
pub fn target_affine<B: Backend>(reference: &Image<B, 3>, offset: &Vector<3>) -> Matrix4<f64> {
    let mut shift = Matrix4::identity();
    for i in 0..3 {
        shift[(i, 3)] = offset[i];
    }
    shift * reference.affine()
}

/// Resample `moving` onto the reference shape with affine `target_affine(reference, offset)`.
///
/// Voxels that fall outside `moving` are zero. Unless `interpolation` is
/// nearest neighbour, values are clamped to the intensity range of
/// `moving` extended to include zero.
pub fn recenter<B: Backend>(
    reference: &Image<B, 3>,
    moving: &Image<B, 3>,
    offset: &Vector<3>,
    interpolation: Interpolation,
) -> Image<B, 3> {
    let device = moving.data().device();
    let affine = target_affine(reference, offset);

    let filter = ResampleImageFilter::new_from_affine(
        reference.shape(),
        &affine,
        AffineTransform::<B, 3>::identity(&device),
        interpolation,
    )
    .with_default_pixel_value(0.0)
    .with_clipping(interpolation.clips());

    let resampled = filter.apply(moving);

    info!(
        %interpolation,
        before = %image_center(reference),
        after = %image_center(&resampled),
        "recentred volume"
    );
    resampled
}
