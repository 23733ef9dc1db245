//! Image type with physical metadata and coordinate transformations.
//!
//! An [`Image`] couples a burn tensor with the origin, spacing and direction
//! that map voxel indices to world coordinates. Tensors are laid out
//! `[Z, Y, X]` while indices and points are expressed in `(x, y, z)` order,
//! matching the NIfTI convention on disk.

use burn::tensor::{ElementConversion, Tensor, TensorData};
use burn::tensor::backend::Backend;
use nalgebra::{Matrix3, Matrix4, Vector3};
use crate::spatial::{Point, Spacing, Direction, Vector};

/// Medical image with physical metadata.
///
/// # Coordinate Systems
/// * **Index Space**: continuous voxel indices, `(x, y, z)`
/// * **Physical Space**: world coordinates in millimetres
///
/// The voxel-to-world mapping is `point = origin + Direction * (index * spacing)`,
/// which is exactly the 4x4 affine returned by [`Image::affine`].
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    /// The voxel data, `[Z, Y, X]` for volumes.
    data: Tensor<B, D>,
    /// Physical coordinate of voxel index 0.
    origin: Point<D>,
    /// Physical distance between voxels along each index axis.
    spacing: Spacing<D>,
    /// Orientation of the index axes.
    direction: Direction<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create a new image with the given data and metadata.
    pub fn new(
        data: Tensor<B, D>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Self {
        Self {
            data,
            origin,
            spacing,
            direction,
        }
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    /// Get the origin (physical coordinate of the first voxel).
    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    /// Get the spacing.
    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    /// Get the direction matrix.
    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Tensor shape, slowest axis first.
    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }

    /// Number of voxels along each index axis, in `(x, y, z)` order.
    ///
    /// This is [`Image::shape`] reversed.
    pub fn size(&self) -> [usize; D] {
        let shape = self.shape();
        std::array::from_fn(|i| shape[D - 1 - i])
    }

    /// Minimum and maximum voxel value.
    pub fn intensity_range(&self) -> (f32, f32) {
        let min = self.data.clone().min().into_scalar().elem::<f32>();
        let max = self.data.clone().max().into_scalar().elem::<f32>();
        (min, max)
    }

    /// Voxel values in tensor order, converted to `f32`.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data
            .to_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap_or_default()
    }

    /// Convert a physical point to a continuous index.
    ///
    /// `index = (Direction^-1 * (point - origin)) / spacing`
    ///
    /// # Panics
    /// If the direction matrix is singular.
    pub fn transform_physical_point_to_continuous_index(&self, point: &Point<D>) -> Point<D> {
        let diff = *point - self.origin;
        let inv_dir = self.direction.try_inverse().expect("Direction matrix must be invertible");
        let rotated = inv_dir * diff;

        let mut index = Point::<D>::origin();
        for i in 0..D {
            index[i] = rotated[i] / self.spacing[i];
        }
        index
    }

    /// Convert a continuous index to a physical point.
    ///
    /// `point = origin + Direction * (index * spacing)`
    pub fn transform_continuous_index_to_physical_point(&self, index: &Point<D>) -> Point<D> {
        let mut scaled_index = Vector::<D>::zeros();
        for i in 0..D {
            scaled_index[i] = index[i] * self.spacing[i];
        }

        let rotated = self.direction * scaled_index;
        self.origin + rotated
    }

    /// Batch transform physical points to continuous indices.
    ///
    /// # Arguments
    /// * `points` - `[Batch, D]` physical points
    ///
    /// # Returns
    /// `[Batch, D]` continuous indices
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();

        let origin_vec: Vec<f32> = (0..D).map(|i| self.origin[i] as f32).collect();
        let origin_tensor = Tensor::<B, 1>::from_data(
            TensorData::new(origin_vec, burn::tensor::Shape::new([D])),
            &device,
        ).reshape([1, D]);

        // I = (P - O) @ T with T_rc = (D^-1)_cr / S_c
        let inv_dir = self.direction.try_inverse().expect("Direction matrix must be invertible");

        let mut t_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                t_data.push((inv_dir[(c, r)] / self.spacing[c]) as f32);
            }
        }

        let t_tensor = Tensor::<B, 2>::from_data(
            TensorData::new(t_data, burn::tensor::Shape::new([D, D])),
            &device,
        );

        let diff = points - origin_tensor;
        diff.matmul(t_tensor)
    }
}

impl<B: Backend> Image<B, 3> {
    /// Build a volume from a voxel-to-world affine.
    pub fn from_affine(data: Tensor<B, 3>, affine: &Matrix4<f64>) -> Self {
        let (origin, spacing, direction) = geometry_from_affine(affine);
        Self::new(data, origin, spacing, direction)
    }

    /// Voxel-to-world affine.
    pub fn affine(&self) -> Matrix4<f64> {
        let mut affine = Matrix4::identity();
        for r in 0..3 {
            for c in 0..3 {
                affine[(r, c)] = self.direction[(r, c)] * self.spacing[c];
            }
            affine[(r, 3)] = self.origin[r];
        }
        affine
    }
}

/// Split a voxel-to-world affine into origin, spacing and direction.
///
/// Spacing is the norm of each column of the upper-left 3x3 block and the
/// direction holds the normalised columns. A degenerate column falls back
/// to the corresponding unit axis with unit spacing.
pub fn geometry_from_affine(affine: &Matrix4<f64>) -> (Point<3>, Spacing<3>, Direction<3>) {
    let origin = Point::new([affine[(0, 3)], affine[(1, 3)], affine[(2, 3)]]);

    let mut spacing = Spacing::<3>::uniform(1.0);
    let mut columns = [Vector3::x(), Vector3::y(), Vector3::z()];
    for (c, column) in columns.iter_mut().enumerate() {
        let col = Vector3::new(affine[(0, c)], affine[(1, c)], affine[(2, c)]);
        let norm = col.norm();
        if norm > 1e-9 {
            spacing[c] = norm;
            *column = col / norm;
        }
    }

    (origin, spacing, Direction(Matrix3::from_columns(&columns)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;
    type Point3 = Point<3>;
    type Spacing3 = Spacing<3>;
    type Direction3 = Direction<3>;

    fn zeros(shape: [usize; 3]) -> Tensor<Backend, 3> {
        Tensor::<Backend, 3>::zeros(shape, &Default::default())
    }

    #[test]
    fn test_image_creation() {
        let origin = Point3::new([0.0, 0.0, 0.0]);
        let spacing = Spacing3::new([1.0, 1.0, 1.0]);
        let direction = Direction3::identity();

        let image = Image::new(zeros([4, 5, 6]), origin, spacing, direction);

        assert_eq!(image.shape(), [4, 5, 6]);
        assert_eq!(image.size(), [6, 5, 4]);
        assert_eq!(image.origin(), &origin);
        assert_eq!(image.spacing(), &spacing);
        assert_eq!(image.direction(), &direction);
    }

    #[test]
    fn test_non_zero_origin_and_spacing() {
        let origin = Point3::new([10.0, 20.0, 30.0]);
        let spacing = Spacing3::new([2.0, 2.0, 2.0]);
        let image = Image::new(zeros([10, 10, 10]), origin, spacing, Direction3::identity());

        let point = Point3::new([20.0, 30.0, 40.0]);
        let index = image.transform_physical_point_to_continuous_index(&point);

        assert!((index[0] - 5.0).abs() < 1e-6);
        assert!((index[1] - 5.0).abs() < 1e-6);
        assert!((index[2] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_affine_matches_point_mapping() {
        let mut direction = Direction3::identity();
        direction[(0, 0)] = -1.0;
        direction[(1, 1)] = -1.0;
        let image = Image::new(
            zeros([3, 4, 5]),
            Point3::new([90.0, 126.0, -72.0]),
            Spacing3::new([1.0, 1.5, 2.0]),
            direction,
        );

        let affine = image.affine();
        let index = Point3::new([2.0, 3.0, 1.0]);
        let expected = image.transform_continuous_index_to_physical_point(&index);
        let mapped = affine * nalgebra::Vector4::new(2.0, 3.0, 1.0, 1.0);

        for i in 0..3 {
            assert!((mapped[i] - expected[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_from_affine_recovers_geometry() {
        let affine = Matrix4::new(
            -2.0, 0.0, 0.0, 90.0,
            0.0, 2.0, 0.0, -126.0,
            0.0, 0.0, 3.0, -72.0,
            0.0, 0.0, 0.0, 1.0,
        );
        let image = Image::from_affine(zeros([2, 2, 2]), &affine);

        assert_eq!(image.spacing(), &Spacing3::new([2.0, 2.0, 3.0]));
        assert_eq!(image.origin(), &Point3::new([90.0, -126.0, -72.0]));
        assert_eq!(image.direction()[(0, 0)], -1.0);
        assert_eq!(image.affine(), affine);
    }

    #[test]
    fn test_world_to_index_tensor_matches_scalar_path() {
        let device = Default::default();
        let image = Image::new(
            zeros([10, 10, 10]),
            Point3::new([5.0, -5.0, 2.0]),
            Spacing3::new([2.0, 1.0, 0.5]),
            Direction3::identity(),
        );

        let points = Tensor::<Backend, 2>::from_floats([[9.0, -2.0, 3.0]], &device);
        let indices = image.world_to_index_tensor(points).into_data();
        let slice = indices.as_slice::<f32>().unwrap();

        assert!((slice[0] - 2.0).abs() < 1e-5);
        assert!((slice[1] - 3.0).abs() < 1e-5);
        assert!((slice[2] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_intensity_range() {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::from_floats([[[1.0, -3.0], [7.5, 0.0]]], &device);
        let image = Image::new(
            data,
            Point3::origin(),
            Spacing3::uniform(1.0),
            Direction3::identity(),
        );

        assert_eq!(image.intensity_range(), (-3.0, 7.5));
    }
}
