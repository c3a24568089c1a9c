//! Scratch directory allocation
//!
//! Each computed artifact gets its own `<hash>_<label>` directory under the
//! working directory. Directories are created eagerly; if one already exists
//! the allocation fails rather than reusing it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::bids::BidsName;
use crate::error::{PipelineError, Result};

/// Hex characters kept from the uuid tag.
const TAG_LEN: usize = 12;

/// A file produced by a kernel or stage, with the name it was built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    name: BidsName,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &BidsName {
        &self.name
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Another artifact in the same scratch directory.
    pub fn sibling(&self, name: BidsName) -> Artifact {
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        Artifact { path: dir.join(name.filename()), name }
    }
}

#[derive(Clone, Debug)]
pub struct ScratchAllocator {
    working_dir: PathBuf,
}

impl ScratchAllocator {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        ScratchAllocator { working_dir: working_dir.into() }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Create a fresh `<hash>_<label>` directory.
    pub fn allocate(&self, label: &str) -> Result<PathBuf> {
        self.allocate_tagged(&fresh_tag(), label)
    }

    fn allocate_tagged(&self, tag: &str, label: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.working_dir)
            .map_err(|e| PipelineError::io(&self.working_dir, e))?;

        let dir = self.working_dir.join(format!("{tag}_{label}"));
        match fs::create_dir(&dir) {
            Ok(()) => {
                debug!(dir = %dir.display(), "allocated scratch directory");
                Ok(dir)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(PipelineError::ScratchCollision(dir)),
            Err(e) => Err(PipelineError::io(&dir, e)),
        }
    }

    /// Allocate a directory and place `name`'s file name inside it.
    ///
    /// The file itself is not created.
    pub fn artifact(&self, label: &str, name: BidsName) -> Result<Artifact> {
        let dir = self.allocate(label)?;
        Ok(Artifact { path: dir.join(name.filename()), name })
    }
}

fn fresh_tag() -> String {
    let mut tag = Uuid::new_v4().simple().to_string();
    tag.truncate(TAG_LEN);
    tag
}
