//! Error types for the coregistration pipeline.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// A suffix search did not find exactly one file.
    #[error("Expected one file ending with {suffix:?} in {}, found {count}", .dir.display())]
    Discovery {
        dir: PathBuf,
        suffix: String,
        count: usize,
    },

    /// Filesystem error.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external tool could not be started.
    #[error("Failed to launch {program}: {source}")]
    ToolLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external tool ran and reported failure.
    #[error("{program} failed ({status}): {stderr}")]
    ToolFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    /// The external tool exited successfully without writing an expected file.
    #[error("Expected output {} was not produced", .path.display())]
    MissingOutput { path: PathBuf },

    /// Reading, resampling or writing a volume failed.
    #[error("Image error: {0:#}")]
    Image(#[from] anyhow::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create an I/O error tied to a path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
