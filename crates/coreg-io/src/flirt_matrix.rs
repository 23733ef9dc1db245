//! FLIRT transform matrix files (`.mat`).
//!
//! FLIRT stores its 4x4 affine as four lines of whitespace-separated
//! numbers. The matrix maps between FSL's scaled-voxel coordinate systems
//! of the input and reference volumes; it is kept verbatim here and never
//! reinterpreted as a world-space transform.

use anyhow::{bail, Context, Result};
use nalgebra::Matrix4;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A 4x4 matrix as read from or written to a FLIRT `.mat` file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlirtMatrix(pub Matrix4<f64>);

impl FlirtMatrix {
    /// The identity transform.
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// Read a matrix file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read matrix file {}", path.display()))?;
        text.parse()
            .with_context(|| format!("Malformed matrix file {}", path.display()))
    }

    /// Write the matrix in FLIRT's layout.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_string())
            .with_context(|| format!("Failed to write matrix file {}", path.display()))
    }
}

impl FromStr for FlirtMatrix {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<f64>()
                    .with_context(|| format!("Invalid matrix entry {token:?}"))
            })
            .collect::<Result<Vec<_>>>()?;

        if values.len() != 16 {
            bail!("Expected 16 matrix entries, found {}", values.len());
        }
        if values[12..] != [0.0, 0.0, 0.0, 1.0] {
            bail!("Last matrix row must be 0 0 0 1, found {:?}", &values[12..]);
        }

        Ok(Self(Matrix4::from_row_slice(&values)))
    }
}

impl fmt::Display for FlirtMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..4 {
            for c in 0..4 {
                write!(f, "{}  ", self.0[(r, c)])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLIRT_OUTPUT: &str = "\
1.002  0.013  -0.021  -3.51  
-0.011  0.998  0.04  7.25  
0.02  -0.041  1.001  -1.125  
0  0  0  1  
";

    #[test]
    fn test_parse_flirt_output() {
        let m: FlirtMatrix = FLIRT_OUTPUT.parse().unwrap();
        assert_eq!(m.0[(0, 0)], 1.002);
        assert_eq!(m.0[(1, 0)], -0.011);
        assert_eq!([m.0[(0, 3)], m.0[(1, 3)], m.0[(2, 3)]], [-3.51, 7.25, -1.125]);
    }

    #[test]
    fn test_display_parses_back() {
        let m: FlirtMatrix = FLIRT_OUTPUT.parse().unwrap();
        let again: FlirtMatrix = m.to_string().parse().unwrap();
        assert_eq!(m, again);
    }

    #[test]
    fn test_rejects_wrong_entry_count() {
        let err = "1 0 0 0\n0 1 0 0\n0 0 1 0\n".parse::<FlirtMatrix>().unwrap_err();
        assert!(err.to_string().contains("16"));
    }

    #[test]
    fn test_rejects_non_numeric() {
        assert!("1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 x".parse::<FlirtMatrix>().is_err());
    }

    #[test]
    fn test_rejects_projective_row() {
        assert!("1 0 0 0 0 1 0 0 0 0 1 0 0 0 1 1".parse::<FlirtMatrix>().is_err());
    }

    #[test]
    fn test_read_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.mat");
        FlirtMatrix::identity().write(&path).unwrap();
        assert_eq!(FlirtMatrix::read(&path).unwrap(), FlirtMatrix::identity());
    }
}
