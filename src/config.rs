//! Typed run configuration
//!
//! Loaded once from TOML, grouped by stage, and validated before any stage
//! runs. Stages only ever read it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::phase_encoding::PeDirection;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub io: IoConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub denoise: DenoiseConfig,
    #[serde(default)]
    pub tractography: TractographyConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoConfig {
    pub working_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Dataset index location, consumed by the external input resolver.
    #[serde(default)]
    pub index_path: Option<PathBuf>,
}

/// Overrides applied before the JSON sidecars are consulted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataConfig {
    #[serde(default)]
    pub pe_dirs: Option<Vec<String>>,
    #[serde(default)]
    pub echo_spacing: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DenoiseConfig {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub estimator: DenoiseEstimator,
    /// Also write the estimated noise map.
    #[serde(default)]
    pub map: bool,
    #[serde(default)]
    pub extent: Option<[u32; 3]>,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        DenoiseConfig { skip: false, estimator: DenoiseEstimator::default(), map: false, extent: None }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenoiseEstimator {
    Exp1,
    #[default]
    Exp2,
}

impl DenoiseEstimator {
    pub fn as_str(self) -> &'static str {
        match self {
            DenoiseEstimator::Exp1 => "Exp1",
            DenoiseEstimator::Exp2 => "Exp2",
        }
    }
}

impl fmt::Display for DenoiseEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TractographyConfig {
    #[serde(default)]
    pub method: TractographyMethod,
    /// Step size in mm.
    #[serde(default)]
    pub steps: Option<f64>,
    #[serde(default)]
    pub cutoff: Option<f64>,
    #[serde(default = "default_streamlines")]
    pub streamlines: u64,
}

impl Default for TractographyConfig {
    fn default() -> Self {
        TractographyConfig {
            method: TractographyMethod::default(),
            steps: None,
            cutoff: None,
            streamlines: default_streamlines(),
        }
    }
}

/// Seeding/tracking strategy.
///
/// Parsing rejects unknown names, so an unsupported string never reaches
/// dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TractographyMethod {
    /// Dynamic seeding from the white-matter FOD.
    #[default]
    Wm,
    /// Anatomically-constrained tracking.
    Act,
}

impl TractographyMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            TractographyMethod::Wm => "wm",
            TractographyMethod::Act => "act",
        }
    }
}

impl FromStr for TractographyMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "wm" => Ok(TractographyMethod::Wm),
            "act" => Ok(TractographyMethod::Act),
            other => Err(PipelineError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl TryFrom<String> for TractographyMethod {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TractographyMethod> for String {
    fn from(method: TractographyMethod) -> Self {
        method.as_str().to_string()
    }
}

impl fmt::Display for TractographyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_threads() -> usize {
    1
}

fn default_streamlines() -> u64 {
    10_000
}

impl Config {
    /// Minimal valid configuration rooted at the given directories.
    pub fn new(working_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Config {
            io: IoConfig {
                working_dir: working_dir.into(),
                output_dir: output_dir.into(),
                threads: default_threads(),
                index_path: None,
            },
            metadata: MetadataConfig::default(),
            denoise: DenoiseConfig::default(),
            tractography: TractographyConfig::default(),
        }
    }

    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self> {
        let cfg: Config = toml::from_str(text)
            .map_err(|source| PipelineError::ConfigParse { path: origin.to_path_buf(), source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_toml_str(&text, path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.io.threads == 0 {
            return Err(PipelineError::InvalidConfig("io.threads must be at least 1".into()));
        }
        if self.io.working_dir.as_os_str().is_empty() || self.io.output_dir.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "io.working_dir and io.output_dir must be set".into(),
            ));
        }
        if let Some(extent) = self.denoise.extent {
            if extent.iter().any(|&e| e == 0 || e % 2 == 0) {
                return Err(PipelineError::InvalidConfig(format!(
                    "denoise.extent must be odd and positive, got {:?}",
                    extent
                )));
            }
        }
        if let Some(dirs) = &self.metadata.pe_dirs {
            for dir in dirs {
                dir.parse::<PeDirection>()?;
            }
        }
        if let Some(spacing) = self.metadata.echo_spacing {
            if !(spacing > 0.0) {
                return Err(PipelineError::InvalidConfig("metadata.echo_spacing must be positive".into()));
            }
        }
        let t = &self.tractography;
        if t.streamlines == 0 {
            return Err(PipelineError::InvalidConfig("tractography.streamlines must be at least 1".into()));
        }
        for (key, value) in [("steps", t.steps), ("cutoff", t.cutoff)] {
            if let Some(v) = value {
                if !(v > 0.0) {
                    return Err(PipelineError::InvalidConfig(format!(
                        "tractography.{} must be positive, got {}",
                        key, v
                    )));
                }
            }
        }
        Ok(())
    }
}
