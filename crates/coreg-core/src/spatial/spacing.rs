//! Physical distance between adjacent voxels along each axis.

use super::Vector;

/// Voxel spacing, one component per axis. Alias of [`Vector`].
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    /// Same spacing along every axis.
    pub fn uniform(value: f64) -> Self {
        let mut spacing = Vector::zeros();
        for i in 0..D {
            spacing[i] = value;
        }
        spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spacing_uniform() {
        assert_eq!(Spacing::<3>::uniform(2.0), Spacing::new([2.0, 2.0, 2.0]));
    }
}
