//! The coregistration pipeline.
//!
//! Two stages run against one reference scan found under `<root>/nifti`:
//!
//! * post to pre: the post-contrast scan is rigidly registered to the
//!   reference.
//! * template to pre: the template anatomy is affinely registered to the
//!   reference, the matrix is carried over to the template mask and atlas,
//!   and the registered anatomy and mask are re-centred onto the reference
//!   grid in-process.
//!
//! All outputs land in `<root>/output`. Stages are independent: a failure
//! in one is recorded in the [`PipelineReport`] and the next still runs.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use tracing::{error, info, warn};

use coreg_core::{Image, Interpolation, Vector};
use coreg_io::{read_nifti, write_nifti};

use crate::center::{image_center, recenter, translation_offset};
use crate::discovery::{find_unique, TemplateAssets};
use crate::error::{RegistrationError, Result};
use crate::flirt::{
    ApplyRequest, Dof, Flirt, FlirtConfig, FlirtInterp, LinearRegistration, RegisterRequest,
};

pub const NIFTI_DIR: &str = "nifti";
pub const TEMPLATE_DIR: &str = "temp";
pub const OUTPUT_DIR: &str = "output";

/// Suffix of the pre-contrast reference scan.
pub const REFERENCE_SUFFIX: &str = "MPRAGE.nii.gz";
/// Suffix of the post-contrast scan.
pub const MOVING_SUFFIX: &str = "MPRAGE_FSGAD.nii.gz";

pub const POST_TO_PRE: &str = "flirt_post_to_pre.nii.gz";
pub const TEMPLATE_T1: &str = "flirt_Template_T1_in_pre_space.nii.gz";
pub const TEMPLATE_MASK: &str = "flirt_Template_mask_in_pre_space.nii.gz";
pub const TEMPLATE_ATLAS: &str = "flirt_Template_atlas_in_pre_space.nii.gz";
pub const RECENTRED_T1: &str = "python_Template_T1_in_pre_space.nii.gz";
pub const RECENTRED_MASK: &str = "python_Template_mask_in_pre_space.nii.gz";

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Directory holding `nifti/`, `temp/` and `output/`.
    pub root: PathBuf,
    pub flirt: FlirtConfig,
}

impl PipelineConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            flirt: FlirtConfig::default(),
        }
    }

    pub fn nifti_dir(&self) -> PathBuf {
        self.root.join(NIFTI_DIR)
    }

    pub fn template_dir(&self) -> PathBuf {
        self.root.join(TEMPLATE_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PostToPre,
    TemplateToPre,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::PostToPre => f.write_str("post-to-pre"),
            Stage::TemplateToPre => f.write_str("template-to-pre"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Every step ran; `outputs` lists the files written.
    Completed { outputs: Vec<PathBuf> },
    /// Inputs for the stage could not be located.
    Skipped { reason: String },
    /// At least one step failed.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub outcome: StageOutcome,
}

impl StageReport {
    fn completed(stage: Stage, outputs: Vec<PathBuf>) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Completed { outputs },
        }
    }

    fn skipped(stage: Stage, reason: impl fmt::Display) -> Self {
        warn!(%stage, %reason, "stage skipped");
        Self {
            stage,
            outcome: StageOutcome::Skipped {
                reason: reason.to_string(),
            },
        }
    }

    fn failed(stage: Stage, error: impl fmt::Display) -> Self {
        error!(%stage, %error, "stage failed");
        Self {
            stage,
            outcome: StageOutcome::Failed {
                error: error.to_string(),
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, StageOutcome::Completed { .. })
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            StageOutcome::Completed { outputs } => {
                write!(f, "{}: completed ({} files)", self.stage, outputs.len())
            }
            StageOutcome::Skipped { reason } => write!(f, "{}: skipped: {reason}", self.stage),
            StageOutcome::Failed { error } => write!(f, "{}: failed: {error}", self.stage),
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    /// True when every stage completed.
    pub fn succeeded(&self) -> bool {
        self.stages.iter().all(StageReport::is_completed)
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }
}

/// Outputs and errors collected across the steps of one stage.
#[derive(Default)]
struct StepLog {
    outputs: Vec<PathBuf>,
    errors: Vec<String>,
}

impl StepLog {
    fn record(&mut self, step: &str, result: Result<Vec<PathBuf>>) {
        match result {
            Ok(paths) => {
                for path in &paths {
                    info!(step, path = %path.display(), "wrote");
                }
                self.outputs.extend(paths);
            }
            Err(e) => self.fail(step, e),
        }
    }

    fn fail(&mut self, step: &str, e: impl fmt::Display) {
        error!(step, error = %e, "step failed");
        self.errors.push(format!("{step}: {e}"));
    }

    fn into_report(self, stage: Stage) -> StageReport {
        if self.errors.is_empty() {
            StageReport::completed(stage, self.outputs)
        } else {
            StageReport::failed(stage, self.errors.join("; "))
        }
    }
}

/// Reference and registered template, loaded for re-centring.
struct Centring<B: Backend> {
    reference: Image<B, 3>,
    anatomy: Image<B, 3>,
    offset: Vector<3>,
}

/// Runs both stages against one root directory.
pub struct Pipeline<B: Backend, R: LinearRegistration> {
    config: PipelineConfig,
    registration: R,
    device: B::Device,
}

impl<B: Backend> Pipeline<B, Flirt> {
    /// Pipeline backed by the FLIRT executable named in `config`.
    pub fn from_config(config: PipelineConfig, device: B::Device) -> Result<Self> {
        let flirt = Flirt::new(config.flirt.clone())?;
        Ok(Self::new(config, flirt, device))
    }
}

impl<B: Backend, R: LinearRegistration> Pipeline<B, R> {
    pub fn new(config: PipelineConfig, registration: R, device: B::Device) -> Self {
        Self {
            config,
            registration,
            device,
        }
    }

    /// Run every stage.
    ///
    /// Returns an error only when nothing can run: the output directory
    /// cannot be created or the reference scan cannot be located. Stage
    /// failures are reported in the returned [`PipelineReport`].
    pub fn run(&self) -> Result<PipelineReport> {
        let output_dir = self.config.output_dir();
        fs::create_dir_all(&output_dir).map_err(|e| RegistrationError::io(&output_dir, e))?;

        let reference = find_unique(&self.config.nifti_dir(), REFERENCE_SUFFIX)?;
        info!(reference = %reference.display(), "reference scan");

        let stages = vec![
            self.post_to_pre(&reference),
            self.template_to_pre(&reference),
        ];
        Ok(PipelineReport { stages })
    }

    fn post_to_pre(&self, reference: &Path) -> StageReport {
        let stage = Stage::PostToPre;
        let moving = match find_unique(&self.config.nifti_dir(), MOVING_SUFFIX) {
            Ok(path) => path,
            Err(e) => return StageReport::skipped(stage, e),
        };

        let request = RegisterRequest {
            reference: reference.to_path_buf(),
            moving,
            output: self.config.output_dir().join(POST_TO_PRE),
            dof: Dof::Rigid,
            interp: FlirtInterp::Trilinear,
        };
        match self.registration.register(&request) {
            Ok(()) => {
                info!(output = %request.output.display(), "post-contrast scan registered");
                StageReport::completed(stage, vec![request.output.clone(), request.matrix()])
            }
            Err(e) => StageReport::failed(stage, e),
        }
    }

    fn template_to_pre(&self, reference: &Path) -> StageReport {
        let stage = Stage::TemplateToPre;
        let assets = match TemplateAssets::discover(&self.config.template_dir()) {
            Ok(assets) => assets,
            Err(e) => return StageReport::skipped(stage, e),
        };
        let output_dir = self.config.output_dir();

        let register = RegisterRequest {
            reference: reference.to_path_buf(),
            moving: assets.anatomy.clone(),
            output: output_dir.join(TEMPLATE_T1),
            dof: Dof::Affine,
            interp: FlirtInterp::Trilinear,
        };
        if let Err(e) = self.registration.register(&register) {
            return StageReport::failed(stage, format!("register template: {e}"));
        }

        let mut log = StepLog::default();
        log.record(
            "register template",
            Ok(vec![register.output.clone(), register.matrix()]),
        );

        let centring = match self.centring(reference, &register.output) {
            Ok(centring) => Some(centring),
            Err(e) => {
                log.fail("centre offset", e);
                None
            }
        };

        let mask = ApplyRequest {
            reference: reference.to_path_buf(),
            input: assets.mask.clone(),
            output: output_dir.join(TEMPLATE_MASK),
            matrix: register.matrix(),
            interp: FlirtInterp::Trilinear,
        };
        log.record("propagate mask", self.apply(&mask));

        let atlas = ApplyRequest {
            reference: reference.to_path_buf(),
            input: assets.atlas.clone(),
            output: output_dir.join(TEMPLATE_ATLAS),
            matrix: register.matrix(),
            interp: FlirtInterp::NearestNeighbour,
        };
        log.record("propagate atlas", self.apply(&atlas));

        if let Some(centring) = &centring {
            log.record(
                "recentre template",
                self.write_recentred(
                    centring,
                    &centring.anatomy,
                    Interpolation::Continuous,
                    output_dir.join(RECENTRED_T1),
                ),
            );

            let recentred_mask = read_nifti::<B, _>(&mask.output, &self.device)
                .map_err(RegistrationError::from)
                .and_then(|image| {
                    self.write_recentred(
                        centring,
                        &image,
                        Interpolation::Nearest,
                        output_dir.join(RECENTRED_MASK),
                    )
                });
            log.record("recentre mask", recentred_mask);
        }

        log.into_report(stage)
    }

    fn apply(&self, request: &ApplyRequest) -> Result<Vec<PathBuf>> {
        self.registration.apply(request)?;
        Ok(vec![request.output.clone()])
    }

    fn centring(&self, reference: &Path, anatomy: &Path) -> Result<Centring<B>> {
        let reference = read_nifti::<B, _>(reference, &self.device)?;
        let anatomy = read_nifti::<B, _>(anatomy, &self.device)?;
        let offset = translation_offset(&reference, &anatomy);
        info!(
            reference_centre = %image_center(&reference),
            template_centre = %image_center(&anatomy),
            offset = ?[offset[0], offset[1], offset[2]],
            "centre offset"
        );
        Ok(Centring {
            reference,
            anatomy,
            offset,
        })
    }

    fn write_recentred(
        &self,
        centring: &Centring<B>,
        moving: &Image<B, 3>,
        interpolation: Interpolation,
        output: PathBuf,
    ) -> Result<Vec<PathBuf>> {
        let resampled = recenter(&centring.reference, moving, &centring.offset, interpolation);
        write_nifti(&output, &resampled)?;
        Ok(vec![output])
    }
}
