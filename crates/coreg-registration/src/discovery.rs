//! Locating input volumes by filename suffix.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{RegistrationError, Result};

/// Suffix of the template anatomy volume.
pub const TEMPLATE_ANATOMY_SUFFIX: &str = "template.nii.gz";
/// Suffix of the template brain mask.
pub const TEMPLATE_MASK_SUFFIX: &str = "mask_brain.nii.gz";
/// Suffix of the template label atlas.
pub const TEMPLATE_ATLAS_SUFFIX: &str = "atlas.nii.gz";

/// Find the single regular file in `dir` whose name ends with `suffix`.
///
/// The scan is not recursive. No match and several matches are both
/// reported as [`RegistrationError::Discovery`].
pub fn find_unique(dir: &Path, suffix: &str) -> Result<PathBuf> {
    let entries = fs::read_dir(dir).map_err(|e| RegistrationError::io(dir, e))?;

    let mut matches = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RegistrationError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().ends_with(suffix) {
            matches.push(path);
        }
    }

    if matches.len() == 1 {
        let found = matches.remove(0);
        debug!(suffix, path = %found.display(), "found input");
        return Ok(found);
    }

    matches.sort();
    debug!(suffix, candidates = ?matches, "ambiguous or missing input");
    Err(RegistrationError::Discovery {
        dir: dir.to_path_buf(),
        suffix: suffix.to_string(),
        count: matches.len(),
    })
}

/// The three template volumes that get carried into reference space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateAssets {
    pub anatomy: PathBuf,
    pub mask: PathBuf,
    pub atlas: PathBuf,
}

impl TemplateAssets {
    /// Locate anatomy, mask and atlas in `dir`. The first lookup that fails is returned.
    pub fn discover(dir: &Path) -> Result<Self> {
        Ok(Self {
            anatomy: find_unique(dir, TEMPLATE_ANATOMY_SUFFIX)?,
            mask: find_unique(dir, TEMPLATE_MASK_SUFFIX)?,
            atlas: find_unique(dir, TEMPLATE_ATLAS_SUFFIX)?,
        })
    }
}
