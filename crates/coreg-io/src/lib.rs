pub mod nifti_io;
pub mod flirt_matrix;

pub use nifti_io::{read_nifti, write_nifti};
pub use flirt_matrix::FlirtMatrix;
