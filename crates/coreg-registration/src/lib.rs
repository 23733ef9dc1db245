//! File discovery, FLIRT invocation, centre alignment and the pipeline
//! that ties them together.

pub mod error;
pub mod discovery;
pub mod flirt;
pub mod center;
pub mod pipeline;

pub use error::{RegistrationError, Result};
pub use discovery::{find_unique, TemplateAssets};
pub use flirt::{
    matrix_path_for, ApplyRequest, Dof, Flirt, FlirtConfig, FlirtInterp, LinearRegistration,
    RegisterRequest,
};
pub use center::{image_center, recenter, target_affine, translation_offset};
pub use pipeline::{Pipeline, PipelineConfig, PipelineReport, Stage, StageOutcome, StageReport};
