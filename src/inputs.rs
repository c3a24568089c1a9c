//! Resolved subject inputs
//!
//! Dataset querying happens elsewhere; this crate receives already resolved
//! file handles, either constructed directly or read from a TOML manifest.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bids::{BidsName, Entities};
use crate::error::{PipelineError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DwiInputs {
    pub nii: PathBuf,
    pub bval: PathBuf,
    pub bvec: PathBuf,
    pub mask: PathBuf,
    /// JSON sidecar with acquisition metadata.
    #[serde(default)]
    pub json: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct T1wInputs {
    pub nii: PathBuf,
}

/// One acquisition's handles, keyed by role.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputGroup {
    pub entities: Entities,
    pub dwi: DwiInputs,
    #[serde(default)]
    pub t1w: Option<T1wInputs>,
}

impl InputGroup {
    /// Base name for this group's diffusion derivatives.
    pub fn bids(&self) -> BidsName {
        BidsName::new(&self.entities).datatype("dwi")
    }
}

/// Results of externally executed kernels that later stages consume.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedInputs {
    /// Linear dwi-to-T1w transform (4x4 text matrix).
    #[serde(default)]
    pub transform: Option<PathBuf>,
    /// Normalized white-matter FOD volume.
    #[serde(default)]
    pub fod: Option<PathBuf>,
    /// Concatenated b=0 frames used for field estimation.
    #[serde(default)]
    pub b0: Option<PathBuf>,
}

/// Everything the command-line front end needs for one subject.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputManifest {
    pub acquisitions: Vec<InputGroup>,
    #[serde(default)]
    pub derived: DerivedInputs,
}

impl InputManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let manifest: InputManifest = toml::from_str(&text)
            .map_err(|source| PipelineError::ConfigParse { path: path.to_path_buf(), source })?;
        if manifest.acquisitions.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "{} lists no acquisitions",
                path.display()
            )));
        }
        Ok(manifest)
    }
}
