//! Point type for positions in physical (world) space.

use nalgebra::Point as NaPoint;
use serde::{Serialize, Deserialize};
use super::Vector;

/// A point in D-dimensional space, in millimetres.
///
/// Used for image origins, voxel centres mapped to world space and the
/// geometric centre of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point<const D: usize>(pub NaPoint<f64, D>);

impl<const D: usize> Point<D> {
    /// Create a new point from coordinates.
    pub fn new(coords: [f64; D]) -> Self {
        Self(NaPoint::from(coords))
    }

    /// The point with all coordinates zero.
    pub fn origin() -> Self {
        Self(NaPoint::origin())
    }

    /// Largest absolute per-axis difference to `other`.
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        (0..D)
            .map(|i| (self[i] - other[i]).abs())
            .fold(0.0, f64::max)
    }
}

impl<const D: usize> std::fmt::Display for Point<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for i in 0..D {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.3}", self[i])?;
        }
        write!(f, "]")
    }
}

impl<const D: usize> std::ops::Index<usize> for Point<D> {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0.coords[index]
    }
}

impl<const D: usize> std::ops::IndexMut<usize> for Point<D> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0.coords[index]
    }
}

impl<const D: usize> std::ops::Sub for Point<D> {
    type Output = Vector<D>;

    fn sub(self, other: Self) -> Self::Output {
        Vector(self.0.coords - other.0.coords)
    }
}

impl<const D: usize> std::ops::Add<Vector<D>> for Point<D> {
    type Output = Self;

    fn add(self, vector: Vector<D>) -> Self::Output {
        Self(self.0 + vector.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Point3 = Point<3>;
    type Vector3 = Vector<3>;

    #[test]
    fn test_point_subtraction_yields_vector() {
        let p1 = Point3::new([5.0, 5.0, 5.0]);
        let p2 = Point3::new([2.0, 3.0, 4.0]);
        assert_eq!(p1 - p2, Vector3::new([3.0, 2.0, 1.0]));
    }

    #[test]
    fn test_point_vector_addition() {
        let p = Point3::new([1.0, 2.0, 3.0]);
        let v = Vector3::new([4.0, 5.0, 6.0]);
        assert_eq!(p + v, Point3::new([5.0, 7.0, 9.0]));
    }

    #[test]
    fn test_max_abs_diff() {
        let a = Point3::new([1.0, 2.0, 3.0]);
        let b = Point3::new([1.5, 1.0, 3.0]);
        assert_eq!(a.max_abs_diff(&b), 1.0);
    }

    #[test]
    fn test_display() {
        let p = Point3::new([1.0, -2.5, 0.125]);
        assert_eq!(p.to_string(), "[1.000, -2.500, 0.125]");
    }
}
