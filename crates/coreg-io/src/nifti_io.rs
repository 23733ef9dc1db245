//! NIfTI-1 volume I/O.
//!
//! Volumes are read into `[Z, Y, X]` tensors with geometry taken from the
//! sform (preferred), the qform, or `pixdim` alone. Writing stores float32
//! voxels with both sform and qform describing the image affine; the file is
//! gzip-compressed when the path ends in `.gz`.

use anyhow::{bail, Context, Result};
use burn::tensor::{Shape, Tensor, TensorData};
use burn::tensor::backend::Backend;
use coreg_core::image::Image;
use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion};
use ndarray::{Array3, Axis, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use nifti::writer::WriterOptions;
use std::path::Path;

/// `NIFTI_XFORM_SCANNER_ANAT`
const XFORM_SCANNER_ANAT: i16 = 1;
/// `NIFTI_UNITS_MM | NIFTI_UNITS_SEC`
const UNITS_MM_SEC: u8 = 2 | 8;

/// Read a 3-D NIfTI volume.
///
/// 4-D files are accepted when every axis past the third has length 1.
pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B, 3>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let affine = header_affine(obj.header());

    let mut volume = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;

    while volume.ndim() > 3 {
        let last = volume.ndim() - 1;
        if volume.len_of(Axis(last)) != 1 {
            bail!(
                "Only single-frame volumes are supported: {} has shape {:?} \
                 (axis {} has {} entries)",
                path.display(),
                volume.shape(),
                last,
                volume.len_of(Axis(last))
            );
        }
        volume = volume.index_axis_move(Axis(last), 0);
    }
    let volume = volume
        .into_dimensionality::<Ix3>()
        .with_context(|| format!("Expected a 3-D volume in {}", path.display()))?;

    let (nx, ny, nz) = volume.dim();
    // Logical iteration over the reversed view yields x fastest: [Z, Y, X].
    let voxels: Vec<f32> = volume.reversed_axes().iter().copied().collect();

    let data = TensorData::new(voxels, Shape::new([nz, ny, nx]));
    let tensor = Tensor::<B, 3>::from_data(data, device);

    tracing::debug!(path = %path.display(), size = ?[nx, ny, nz], "read NIfTI volume");
    Ok(Image::from_affine(tensor, &affine))
}

/// Write an image to a NIfTI file.
pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B, 3>) -> Result<()> {
    let path = path.as_ref();
    let [nz, ny, nx] = image.shape();

    let array = Array3::from_shape_vec((nz, ny, nx), image.to_vec())
        .context("Image data does not match its shape")?
        .reversed_axes();

    let header = header_for(image);
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;

    tracing::debug!(path = %path.display(), size = ?[nx, ny, nz], "wrote NIfTI volume");
    Ok(())
}

/// Voxel-to-world affine from the header: sform, then qform, then pixdim.
fn header_affine(header: &NiftiHeader) -> Matrix4<f64> {
    if header.sform_code > 0 {
        let rows = [header.srow_x, header.srow_y, header.srow_z];
        let mut affine = Matrix4::identity();
        for (r, row) in rows.iter().enumerate() {
            for c in 0..4 {
                affine[(r, c)] = row[c] as f64;
            }
        }
        return affine;
    }

    let dx = header.pixdim[1] as f64;
    let dy = header.pixdim[2] as f64;
    let dz = header.pixdim[3] as f64;

    if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };

        let rotation = Matrix3::new(
            a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c),
            2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b),
            2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - c * c - b * b,
        );
        let scale = Matrix3::from_diagonal(&nalgebra::Vector3::new(dx, dy, dz * qfac));

        let mut affine = Matrix4::identity();
        affine.fixed_view_mut::<3, 3>(0, 0).copy_from(&(rotation * scale));
        affine[(0, 3)] = header.quatern_x as f64;
        affine[(1, 3)] = header.quatern_y as f64;
        affine[(2, 3)] = header.quatern_z as f64;
        return affine;
    }

    Matrix4::from_diagonal(&nalgebra::Vector4::new(dx, dy, dz, 1.0))
}

/// Header carrying the image geometry as both sform and qform.
fn header_for<B: Backend>(image: &Image<B, 3>) -> NiftiHeader {
    let affine = image.affine();
    let spacing = image.spacing();

    let mut header = NiftiHeader::default();
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    header.xyzt_units = UNITS_MM_SEC;

    header.sform_code = XFORM_SCANNER_ANAT;
    header.srow_x = row(&affine, 0);
    header.srow_y = row(&affine, 1);
    header.srow_z = row(&affine, 2);

    header.pixdim[1] = spacing[0] as f32;
    header.pixdim[2] = spacing[1] as f32;
    header.pixdim[3] = spacing[2] as f32;

    let mut direction = *image.direction().inner();
    let qfac = if direction.determinant() < 0.0 {
        let flipped = -direction.column(2);
        direction.set_column(2, &flipped);
        -1.0
    } else {
        1.0
    };
    header.pixdim[0] = qfac;

    if image.direction().is_orthogonal() {
        let rotation = Rotation3::from_matrix_unchecked(direction);
        let q = UnitQuaternion::from_rotation_matrix(&rotation);
        // The NIfTI qform stores b, c, d with a >= 0.
        let sign = if q.w < 0.0 { -1.0 } else { 1.0 };
        header.qform_code = XFORM_SCANNER_ANAT;
        header.quatern_b = (sign * q.i) as f32;
        header.quatern_c = (sign * q.j) as f32;
        header.quatern_d = (sign * q.k) as f32;
        header.quatern_x = affine[(0, 3)] as f32;
        header.quatern_y = affine[(1, 3)] as f32;
        header.quatern_z = affine[(2, 3)] as f32;
    } else {
        header.qform_code = 0;
    }

    header
}

fn row(affine: &Matrix4<f64>, r: usize) -> [f32; 4] {
    [
        affine[(r, 0)] as f32,
        affine[(r, 1)] as f32,
        affine[(r, 2)] as f32,
        affine[(r, 3)] as f32,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use coreg_core::spatial::{Direction, Point, Spacing};
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    fn oblique_image() -> Image<TestBackend, 3> {
        let device = Default::default();
        let data: Vec<f32> = (0..3 * 4 * 5).map(|v| v as f32).collect();
        let tensor = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(data, Shape::new([5, 4, 3])),
            &device,
        );

        // LPS-style flip of x and y.
        let mut direction = Direction::identity();
        direction[(0, 0)] = -1.0;
        direction[(1, 1)] = -1.0;
        Image::new(
            tensor,
            Point::new([90.0, 126.0, -72.0]),
            Spacing::new([1.0, 1.5, 2.0]),
            direction,
        )
    }

    #[test]
    fn test_read_nifti_axis_order() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.nii");

        // value = x + 10 y + 100 z, written in (x, y, z) logical order
        let array = Array3::from_shape_fn((3, 4, 5), |(x, y, z)| (x + 10 * y + 100 * z) as f32);
        WriterOptions::new(&file_path).write_nifti(&array)?;

        let device = Default::default();
        let image = read_nifti::<TestBackend, _>(&file_path, &device)?;

        assert_eq!(image.shape(), [5, 4, 3]);
        assert_eq!(image.size(), [3, 4, 5]);

        let voxels = image.to_vec();
        let at = |x: usize, y: usize, z: usize| voxels[(z * 4 + y) * 3 + x];
        assert_eq!(at(0, 0, 0), 0.0);
        assert_eq!(at(2, 0, 0), 2.0);
        assert_eq!(at(0, 3, 0), 30.0);
        assert_eq!(at(1, 2, 4), 421.0);
        Ok(())
    }

    #[test]
    fn test_header_affine_prefers_sform() {
        let mut header = NiftiHeader::default();
        header.pixdim = [1.0, 9.0, 9.0, 9.0, 1.0, 1.0, 1.0, 1.0];
        header.sform_code = 2;
        header.srow_x = [2.0, 0.0, 0.0, 10.0];
        header.srow_y = [0.0, 2.0, 0.0, 20.0];
        header.srow_z = [0.0, 0.0, 2.0, 30.0];

        let affine = header_affine(&header);
        assert_eq!(affine[(0, 0)], 2.0);
        assert_eq!(affine[(2, 3)], 30.0);
    }

    #[test]
    fn test_header_affine_pixdim_fallback() {
        let mut header = NiftiHeader::default();
        header.sform_code = 0;
        header.qform_code = 0;
        header.pixdim = [1.0, 1.0, 2.0, 3.0, 1.0, 1.0, 1.0, 1.0];

        let affine = header_affine(&header);
        assert_eq!(affine, Matrix4::from_diagonal(&nalgebra::Vector4::new(1.0, 2.0, 3.0, 1.0)));
    }

    #[test]
    fn test_qform_matches_sform() {
        let image = oblique_image();
        let mut header = header_for(&image);
        assert_eq!(header.qform_code, XFORM_SCANNER_ANAT);

        let from_sform = header_affine(&header);
        header.sform_code = 0;
        let from_qform = header_affine(&header);

        assert!((from_sform - from_qform).abs().max() < 1e-5);
        assert!((from_sform - image.affine()).abs().max() < 1e-5);
    }

    #[test]
    fn test_write_then_read_preserves_geometry() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("oblique.nii.gz");
        let image = oblique_image();

        write_nifti(&file_path, &image)?;
        let loaded = read_nifti::<TestBackend, _>(&file_path, &Default::default())?;

        assert_eq!(loaded.shape(), image.shape());
        assert_eq!(loaded.to_vec(), image.to_vec());
        assert!((loaded.affine() - image.affine()).abs().max() < 1e-5);
        Ok(())
    }
}
