//! Denoising stage
//!
//! Runs `dwidenoise` unless configuration asks to skip it or the acquisition
//! has too few diffusion-weighted directions for the estimator to be useful.
//! Skipping is a logged decision, not an error.

use std::fmt;
use std::path::PathBuf;

use tracing::info;

use crate::config::{Config, DenoiseConfig};
use crate::error::{PipelineError, Result};
use crate::execution::{ExecutionContext, Invocation};
use crate::inputs::InputGroup;
use crate::persist::OutputPersister;
use crate::scratch::{Artifact, ScratchAllocator};
use crate::tables;

/// Fewest non-zero b-value volumes for which denoising runs.
pub const MIN_DIRECTIONS: usize = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Requested,
    TooFewDirections { found: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Requested => f.write_str("skip requested by configuration"),
            SkipReason::TooFewDirections { found } => {
                write!(f, "less than {} directions ({} found)", MIN_DIRECTIONS, found)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenoiseDecision {
    Skip(SkipReason),
    Run,
}

/// Decide from configuration and the acquisition's b-values.
pub fn decide(cfg: &DenoiseConfig, bvals: &[f64]) -> DenoiseDecision {
    if cfg.skip {
        return DenoiseDecision::Skip(SkipReason::Requested);
    }
    let found = bvals.iter().filter(|&&b| b != 0.0).count();
    if found < MIN_DIRECTIONS {
        DenoiseDecision::Skip(SkipReason::TooFewDirections { found })
    } else {
        DenoiseDecision::Run
    }
}

#[derive(Clone, Debug)]
pub struct DenoiseOutput {
    pub decision: DenoiseDecision,
    /// Denoised volume, or the input volume when skipped.
    pub dwi: PathBuf,
    pub noise_map: Option<Artifact>,
}

pub fn denoise(
    group: &InputGroup,
    cfg: &Config,
    scratch: &ScratchAllocator,
    ctx: &ExecutionContext,
    persister: &OutputPersister,
) -> Result<DenoiseOutput> {
    let bvals = tables::read_vector(&group.dwi.bval)?;
    let decision = decide(&cfg.denoise, &bvals);

    if let DenoiseDecision::Skip(reason) = decision {
        info!(entities = %group.entities, %reason, "skipping denoising");
        return Ok(DenoiseOutput { decision, dwi: group.dwi.nii.clone(), noise_map: None });
    }

    info!(entities = %group.entities, "performing denoising");
    let estimator = cfg.denoise.estimator;
    let bids = group.bids();

    let out = scratch.artifact(
        "dwidenoise",
        bids.clone().desc("denoise").suffix("dwi").ext(".nii.gz"),
    )?;
    let noise_map = cfg.denoise.map.then(|| {
        out.sibling(
            bids.algorithm(estimator.as_str())
                .param("noise")
                .suffix("dwimap")
                .ext(".nii.gz"),
        )
    });

    let extent = cfg
        .denoise
        .extent
        .map(|e| e.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","));
    let invocation = Invocation::new("dwidenoise")
        .arg(&group.dwi.nii)
        .arg(out.path())
        .option("-estimator", estimator.as_str())
        .option_if("-noise", noise_map.as_ref().map(|n| n.path()))
        .option_if("-extent", extent);
    ctx.run(&invocation)?;

    if let Some(noise_map) = &noise_map {
        if !noise_map.exists() {
            return Err(PipelineError::ExpectedOutputMissing {
                kernel: "dwidenoise",
                path: noise_map.path().to_path_buf(),
            });
        }
        persister.persist(noise_map)?;
    }

    Ok(DenoiseOutput { decision, dwi: out.into_path(), noise_map })
}
