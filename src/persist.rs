//! Copying derivatives into the output tree
//!
//! Artifacts carry their structured name, so their destination is built
//! from it directly. Paths produced outside the crate are mirrored from
//! their first `sub-` component.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::info;

use crate::error::{PipelineError, Result};
use crate::scratch::Artifact;

const SUBJECT_MARKER: &str = "sub-";

#[derive(Clone, Debug)]
pub struct OutputPersister {
    output_dir: PathBuf,
}

impl OutputPersister {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        OutputPersister { output_dir: output_dir.into() }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Copy an artifact to `<output>/<entity dirs>/<file name>`.
    pub fn persist(&self, artifact: &Artifact) -> Result<PathBuf> {
        let target = self.output_dir.join(artifact.name().relative_path());
        copy_into(artifact.path(), &target)?;
        Ok(target)
    }

    pub fn persist_all<'a>(&self, artifacts: impl IntoIterator<Item = &'a Artifact>) -> Result<Vec<PathBuf>> {
        artifacts.into_iter().map(|a| self.persist(a)).collect()
    }

    /// Copy an arbitrary working path, mirroring it from the subject component.
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        let target = self.output_dir.join(subject_relative(path)?);
        copy_into(path, &target)?;
        Ok(target)
    }
}

/// Everything from the first component containing `sub-` onward.
pub fn subject_relative(path: &Path) -> Result<PathBuf> {
    let components: Vec<Component> = path.components().collect();
    let start = components
        .iter()
        .position(|c| match c {
            Component::Normal(part) => part.to_string_lossy().contains(SUBJECT_MARKER),
            _ => false,
        })
        .ok_or_else(|| PipelineError::UnresolvedPath(path.to_path_buf()))?;
    Ok(components[start..].iter().collect())
}

fn copy_into(src: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    fs::copy(src, target).map_err(|e| PipelineError::io(src, e))?;
    info!(from = %src.display(), to = %target.display(), "saved output");
    Ok(())
}
