//! Linear registration through FSL FLIRT.
//!
//! [`LinearRegistration`] is the seam between the pipeline and the tool
//! that does the actual optimisation. [`Flirt`] runs the `flirt` binary
//! as a child process with an explicit argument vector and checks what it
//! leaves behind.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::error::{RegistrationError, Result};

/// Lines of stderr kept in [`RegistrationError::ToolFailed`].
const STDERR_TAIL_LINES: usize = 20;

/// Degrees of freedom of the fitted transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dof {
    /// Rotation and translation.
    Rigid,
    /// Full affine.
    Affine,
}

impl Dof {
    pub fn count(self) -> u8 {
        match self {
            Dof::Rigid => 6,
            Dof::Affine => 12,
        }
    }
}

/// Interpolation used by FLIRT when writing its output volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlirtInterp {
    Trilinear,
    NearestNeighbour,
    Sinc,
    Spline,
}

impl FlirtInterp {
    pub fn as_str(self) -> &'static str {
        match self {
            FlirtInterp::Trilinear => "trilinear",
            FlirtInterp::NearestNeighbour => "nearestneighbour",
            FlirtInterp::Sinc => "sinc",
            FlirtInterp::Spline => "spline",
        }
    }
}

impl fmt::Display for FlirtInterp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimate a transform from `moving` to `reference` and write the resampled result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub reference: PathBuf,
    pub moving: PathBuf,
    pub output: PathBuf,
    pub dof: Dof,
    pub interp: FlirtInterp,
}

impl RegisterRequest {
    /// Where the estimated matrix is saved.
    pub fn matrix(&self) -> PathBuf {
        matrix_path_for(&self.output)
    }
}

/// Resample `input` into `reference` space with a previously saved matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    pub reference: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub matrix: PathBuf,
    pub interp: FlirtInterp,
}

/// Matrix file written next to a registration output.
///
/// `flirt_x.nii.gz` and `flirt_x.nii` both become `flirt_x.mat`; any
/// other name gets its last extension replaced.
pub fn matrix_path_for(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .map(str::to_owned);

    match stem {
        Some(stem) => output.with_file_name(format!("{stem}.mat")),
        None => output.with_extension("mat"),
    }
}

/// A linear registration backend.
pub trait LinearRegistration {
    /// Estimate and apply a transform; writes `request.output` and its matrix.
    fn register(&self, request: &RegisterRequest) -> Result<()>;

    /// Apply a saved matrix; writes `request.output`.
    fn apply(&self, request: &ApplyRequest) -> Result<()>;
}

/// How to reach the FLIRT executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlirtConfig {
    /// Executable name or path.
    pub program: PathBuf,
    /// Cost function passed to `-cost` when registering.
    pub cost: String,
}

impl Default for FlirtConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("flirt"),
            cost: "mutualinfo".to_string(),
        }
    }
}

/// FLIRT run as a child process.
#[derive(Debug, Clone)]
pub struct Flirt {
    config: FlirtConfig,
}

impl Flirt {
    pub fn new(config: FlirtConfig) -> Result<Self> {
        if config.program.as_os_str().is_empty() {
            return Err(RegistrationError::invalid_configuration(
                "FLIRT program must not be empty",
            ));
        }
        if config.cost.trim().is_empty() {
            return Err(RegistrationError::invalid_configuration(
                "FLIRT cost function must not be empty",
            ));
        }
        Ok(Self { config })
    }

    /// Arguments for `register`, without the program name.
    pub fn register_args(&self, request: &RegisterRequest) -> Vec<OsString> {
        vec![
            "-in".into(),
            request.moving.clone().into(),
            "-ref".into(),
            request.reference.clone().into(),
            "-out".into(),
            request.output.clone().into(),
            "-omat".into(),
            request.matrix().into(),
            "-dof".into(),
            request.dof.count().to_string().into(),
            "-cost".into(),
            self.config.cost.clone().into(),
            "-interp".into(),
            request.interp.as_str().into(),
        ]
    }

    /// Arguments for `apply`, without the program name.
    pub fn apply_args(&self, request: &ApplyRequest) -> Vec<OsString> {
        vec![
            "-in".into(),
            request.input.clone().into(),
            "-ref".into(),
            request.reference.clone().into(),
            "-out".into(),
            request.output.clone().into(),
            "-applyxfm".into(),
            "-init".into(),
            request.matrix.clone().into(),
            "-interp".into(),
            request.interp.as_str().into(),
        ]
    }

    fn run(&self, args: Vec<OsString>, expected: &[PathBuf]) -> Result<()> {
        let program = self.config.program.display().to_string();
        debug!(%program, ?args, "spawning");

        let output = Command::new(&self.config.program)
            .args(&args)
            .output()
            .map_err(|source| RegistrationError::ToolLaunch {
                program: program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!(%program, stdout = %stdout.trim_end(), "tool stdout");
        }
        if !stderr.trim().is_empty() {
            debug!(%program, stderr = %stderr.trim_end(), "tool stderr");
        }

        if !output.status.success() {
            return Err(RegistrationError::ToolFailed {
                program,
                status: output.status,
                stderr: tail(&stderr, STDERR_TAIL_LINES),
            });
        }

        for path in expected {
            if !path.is_file() {
                return Err(RegistrationError::MissingOutput { path: path.clone() });
            }
        }
        Ok(())
    }
}

impl LinearRegistration for Flirt {
    fn register(&self, request: &RegisterRequest) -> Result<()> {
        info!(
            moving = %request.moving.display(),
            reference = %request.reference.display(),
            dof = request.dof.count(),
            "flirt register"
        );
        self.run(
            self.register_args(request),
            &[request.output.clone(), request.matrix()],
        )
    }

    fn apply(&self, request: &ApplyRequest) -> Result<()> {
        info!(
            input = %request.input.display(),
            matrix = %request.matrix.display(),
            interp = %request.interp,
            "flirt applyxfm"
        );
        self.run(self.apply_args(request), &[request.output.clone()])
    }
}

fn tail(text: &str, lines: usize) -> String {
    let kept: Vec<&str> = text.trim_end().lines().rev().take(lines).collect();
    kept.into_iter().rev().collect::<Vec<_>>().join("\n")
}
