//! Pipeline error taxonomy
//!
//! Every fatal condition of a subject run is a variant of [`PipelineError`].
//! Nothing in the crate retries; errors propagate to the top-level caller.

use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Echo spacing or phase-encoding direction could not be resolved.
    #[error("missing acquisition metadata '{field}' for acquisition {index}")]
    MetadataMissing { field: &'static str, index: usize },

    #[error("invalid phase-encoding direction '{0}' (expected one of i, j, k with optional '-')")]
    InvalidDirection(String),

    #[error("cannot group phase-encoding directions {0:?}: no LR pair and no AP acquisition")]
    UngroupablePhaseEncoding(Vec<String>),

    #[error("{indices} eddy group indices given for {volumes} volumes")]
    IndexCountMismatch { indices: usize, volumes: usize },

    /// No path component carries the subject marker.
    #[error("unable to find subject-relative components in '{}'", .0.display())]
    UnresolvedPath(PathBuf),

    #[error("{kernel} did not produce expected output '{}'", .path.display())]
    ExpectedOutputMissing { kernel: &'static str, path: PathBuf },

    #[error("unsupported tractography method '{0}'")]
    UnsupportedMethod(String),

    #[error("invalid table '{}': {reason}", .path.display())]
    InvalidTable { path: PathBuf, reason: String },

    #[error("invalid volume '{}': {reason}", .path.display())]
    InvalidVolume { path: PathBuf, reason: String },

    #[error("scratch directory '{}' already exists", .0.display())]
    ScratchCollision(PathBuf),

    #[error("kernel '{program}' failed with {status}")]
    KernelFailed { program: String, status: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse '{}': {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to read NIfTI '{}': {source}", .path.display())]
    Nifti {
        path: PathBuf,
        #[source]
        source: nifti::NiftiError,
    },

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        PipelineError::Io { path: path.to_path_buf(), source }
    }

    pub(crate) fn nifti(path: &Path, source: nifti::NiftiError) -> Self {
        PipelineError::Nifti { path: path.to_path_buf(), source }
    }

    pub(crate) fn table(path: &Path, reason: impl Into<String>) -> Self {
        PipelineError::InvalidTable { path: path.to_path_buf(), reason: reason.into() }
    }

    pub(crate) fn volume(path: &Path, reason: impl Into<String>) -> Self {
        PipelineError::InvalidVolume { path: path.to_path_buf(), reason: reason.into() }
    }
}
