//! Affine transform (linear part + translation) in world space.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use burn::module::{Module, Param};
use super::trait_::Transform;

/// Affine transform `T(x) = A x + t`.
#[derive(Module, Debug)]
pub struct AffineTransform<B: Backend, const D: usize> {
    matrix: Param<Tensor<B, 2>>,      // [D, D]
    translation: Param<Tensor<B, 1>>, // [D]
}

impl<B: Backend, const D: usize> AffineTransform<B, D> {
    /// Create a new affine transform.
    ///
    /// # Arguments
    /// * `matrix` - `[D, D]` linear part
    /// * `translation` - `[D]` translation
    pub fn new(matrix: Tensor<B, 2>, translation: Tensor<B, 1>) -> Self {
        Self {
            matrix: Param::from_tensor(matrix),
            translation: Param::from_tensor(translation),
        }
    }

    /// The identity transform.
    pub fn identity(device: &B::Device) -> Self {
        Self::new(
            Tensor::<B, 2>::eye(D, device),
            Tensor::<B, 1>::zeros([D], device),
        )
    }
}

impl<B: Backend, const D: usize> Transform<B, D> for AffineTransform<B, D> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // Row vectors: y = x @ A^T + t
        let t = self.translation.val().reshape([1, D]);
        points.matmul(self.matrix.val().transpose()) + t
    }
}
