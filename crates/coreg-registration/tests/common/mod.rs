#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use burn::tensor::{Shape, Tensor, TensorData};
use burn_ndarray::NdArray;
use nalgebra::Matrix4;

use coreg_core::filter::ResampleImageFilter;
use coreg_core::transform::AffineTransform;
use coreg_core::{Image, Interpolation};
use coreg_io::{read_nifti, write_nifti, FlirtMatrix};
use coreg_registration::{
    ApplyRequest, FlirtInterp, LinearRegistration, RegisterRequest, RegistrationError,
};

pub type TestBackend = NdArray<f32>;

pub fn device() -> <TestBackend as burn::tensor::backend::Backend>::Device {
    Default::default()
}

/// In-process stand-in for FLIRT.
///
/// Both operations resample the input with an identity world transform
/// onto the reference grid translated by `grid_shift`, and `register`
/// saves an identity matrix.
#[derive(Default)]
pub struct ResampleRegistration {
    /// Requests whose output file name contains one of these fail.
    pub fail_outputs: Vec<&'static str>,
    /// World-space shift of every output grid relative to the reference.
    pub grid_shift: [f64; 3],
    pub calls: RefCell<Vec<String>>,
}

impl ResampleRegistration {
    pub fn failing(outputs: &[&'static str]) -> Self {
        Self {
            fail_outputs: outputs.to_vec(),
            ..Self::default()
        }
    }

    pub fn shifted(grid_shift: [f64; 3]) -> Self {
        Self {
            grid_shift,
            ..Self::default()
        }
    }

    fn check(&self, output: &Path) -> coreg_registration::Result<()> {
        let name = output.file_name().unwrap().to_string_lossy().into_owned();
        self.calls.borrow_mut().push(name.clone());
        if self.fail_outputs.iter().any(|f| name.contains(f)) {
            return Err(RegistrationError::MissingOutput {
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }

    fn resample(
        &self,
        reference: &Path,
        input: &Path,
        output: &Path,
        interp: FlirtInterp,
    ) -> coreg_registration::Result<()> {
        let reference = read_nifti::<TestBackend, _>(reference, &device())?;
        let input = read_nifti::<TestBackend, _>(input, &device())?;
        let interpolation = match interp {
            FlirtInterp::NearestNeighbour => Interpolation::Nearest,
            _ => Interpolation::Linear,
        };
        let [dx, dy, dz] = self.grid_shift;
        let grid = translation(dx, dy, dz) * reference.affine();
        let filter = ResampleImageFilter::new_from_affine(
            reference.shape(),
            &grid,
            AffineTransform::<TestBackend, 3>::identity(&device()),
            interpolation,
        );
        write_nifti(output, &filter.apply(&input))?;
        Ok(())
    }
}

impl LinearRegistration for ResampleRegistration {
    fn register(&self, request: &RegisterRequest) -> coreg_registration::Result<()> {
        self.check(&request.output)?;
        self.resample(&request.reference, &request.moving, &request.output, request.interp)?;
        FlirtMatrix::identity().write(request.matrix())?;
        Ok(())
    }

    fn apply(&self, request: &ApplyRequest) -> coreg_registration::Result<()> {
        self.check(&request.output)?;
        let matrix = FlirtMatrix::read(&request.matrix)?;
        assert_eq!(matrix, FlirtMatrix::identity());
        self.resample(&request.reference, &request.input, &request.output, request.interp)
    }
}

pub fn volume(
    shape: [usize; 3],
    affine: &Matrix4<f64>,
    fill: impl Fn(usize, usize, usize) -> f32,
) -> Image<TestBackend, 3> {
    let [nz, ny, nx] = shape;
    let mut values = Vec::with_capacity(nz * ny * nx);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                values.push(fill(x, y, z));
            }
        }
    }
    let data = Tensor::<TestBackend, 3>::from_data(
        TensorData::new(values, Shape::new(shape)),
        &device(),
    );
    Image::from_affine(data, affine)
}

pub fn translation(x: f64, y: f64, z: f64) -> Matrix4<f64> {
    let mut affine = Matrix4::identity();
    affine[(0, 3)] = x;
    affine[(1, 3)] = y;
    affine[(2, 3)] = z;
    affine
}

pub fn labels(path: &Path) -> BTreeSet<i64> {
    read_nifti::<TestBackend, _>(path, &device())
        .unwrap()
        .to_vec()
        .into_iter()
        .map(|v| v.round() as i64)
        .collect()
}

/// Subject directory with `nifti/` and `temp/` populated.
pub struct Fixture {
    pub root: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let nifti = root.path().join("nifti");
        let temp = root.path().join("temp");
        fs::create_dir_all(&nifti).unwrap();
        fs::create_dir_all(&temp).unwrap();

        let reference_affine = translation(1.0, -2.0, 0.5);
        let pre = volume([8, 8, 8], &reference_affine, |x, y, z| (x + 2 * y + 3 * z) as f32);
        let post = volume([8, 8, 8], &reference_affine, |x, y, z| (2 * x + y + z) as f32 + 5.0);
        write_nifti(nifti.join("sub01_MPRAGE.nii.gz"), &pre).unwrap();
        write_nifti(nifti.join("sub01_MPRAGE_FSGAD.nii.gz"), &post).unwrap();

        let template_affine = translation(-1.0, -3.0, -1.5);
        let anatomy = volume([10, 10, 10], &template_affine, |x, y, z| {
            100.0 + (x * y) as f32 - z as f32
        });
        let mask = volume([10, 10, 10], &template_affine, |x, y, z| {
            let inside = (2..8).contains(&x) && (2..8).contains(&y) && (2..8).contains(&z);
            if inside { 1.0 } else { 0.0 }
        });
        let atlas = volume([10, 10, 10], &template_affine, |x, y, z| {
            if x < 3 {
                0.0
            } else {
                (1 + (y >= 5) as usize + 2 * (z >= 5) as usize) as f32
            }
        });
        write_nifti(temp.join("MNI_template.nii.gz"), &anatomy).unwrap();
        write_nifti(temp.join("MNI_mask_brain.nii.gz"), &mask).unwrap();
        write_nifti(temp.join("MNI_atlas.nii.gz"), &atlas).unwrap();

        Self { root }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.root.path().join("output").join(name)
    }

    pub fn remove_input(&self, relative: &str) {
        fs::remove_file(self.root.path().join(relative)).unwrap();
    }
}
