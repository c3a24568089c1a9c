//! Tractography stage
//!
//! Generates streamlines from a white-matter FOD, computes SIFT2 weights and
//! builds raw and weighted track-density images on the FOD grid.
//!
//! # Methods
//! - `wm`: iFOD2 tracking with dynamic seeding from the FOD
//! - `act`: anatomically-constrained tracking, not yet supported

use std::path::Path;

use tracing::info;

use crate::bids::BidsName;
use crate::config::{Config, TractographyConfig, TractographyMethod};
use crate::error::{PipelineError, Result};
use crate::execution::{ExecutionContext, Invocation};
use crate::inputs::InputGroup;
use crate::persist::OutputPersister;
use crate::scratch::{Artifact, ScratchAllocator};

/// Produces a track file from an FOD volume.
pub trait TrackingStrategy {
    fn generate(
        &self,
        fod: &Path,
        base: &BidsName,
        cfg: &TractographyConfig,
        scratch: &ScratchAllocator,
        ctx: &ExecutionContext,
    ) -> Result<Artifact>;
}

/// iFOD2 seeded dynamically from the FOD itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct WhiteMatterSeeding;

impl TrackingStrategy for WhiteMatterSeeding {
    fn generate(
        &self,
        fod: &Path,
        base: &BidsName,
        cfg: &TractographyConfig,
        scratch: &ScratchAllocator,
        ctx: &ExecutionContext,
    ) -> Result<Artifact> {
        let tracks = scratch.artifact(
            "tckgen",
            base.clone().method("iFOD2").suffix("tractography").ext(".tck"),
        )?;

        let invocation = Invocation::new("tckgen")
            .arg(fod)
            .arg(tracks.path())
            .option("-algorithm", "iFOD2")
            .option("-seed_dynamic", fod)
            .option_if("-step", cfg.steps.map(|v| v.to_string()))
            .option_if("-cutoff", cfg.cutoff.map(|v| v.to_string()))
            .option("-select", cfg.streamlines.to_string())
            .option("-nthreads", ctx.threads().to_string());
        ctx.run(&invocation)?;
        Ok(tracks)
    }
}

/// Strategy for `method`; unsupported variants fail here, before any kernel runs.
pub fn strategy(method: TractographyMethod) -> Result<Box<dyn TrackingStrategy>> {
    match method {
        TractographyMethod::Wm => Ok(Box::new(WhiteMatterSeeding)),
        TractographyMethod::Act => Err(PipelineError::UnsupportedMethod(method.to_string())),
    }
}

#[derive(Clone, Debug)]
pub struct TractographyOutputs {
    pub tracks: Artifact,
    pub weights: Artifact,
    /// Unweighted density; kept in scratch.
    pub tdi_raw: Artifact,
    pub tdi_weighted: Artifact,
}

pub fn generate_tractography(
    group: &InputGroup,
    fod: &Path,
    cfg: &Config,
    scratch: &ScratchAllocator,
    ctx: &ExecutionContext,
    persister: &OutputPersister,
) -> Result<TractographyOutputs> {
    let tracker = strategy(cfg.tractography.method)?;
    let base = group.bids();
    let threads = ctx.threads().to_string();

    info!(entities = %group.entities, method = %cfg.tractography.method, "generating tractography");
    let tracks = tracker.generate(fod, &base, &cfg.tractography, scratch, ctx)?;

    info!("computing per-streamline multipliers");
    let weights = scratch.artifact(
        "tcksift2",
        base.clone().method("SIFT2").suffix("tckWeights").ext(".txt"),
    )?;
    ctx.run(
        &Invocation::new("tcksift2")
            .arg(tracks.path())
            .arg(fod)
            .arg(weights.path())
            .option("-nthreads", &threads),
    )?;

    let track_density = |meas: &str, tck_weights: Option<&Path>| -> Result<Artifact> {
        let map = scratch.artifact("tckmap", base.clone().meas(meas).suffix("tdi").ext(".nii.gz"))?;
        ctx.run(
            &Invocation::new("tckmap")
                .arg(tracks.path())
                .arg(map.path())
                .option("-template", fod)
                .option_if("-tck_weights_in", tck_weights)
                .option("-nthreads", &threads),
        )?;
        Ok(map)
    };
    let tdi_raw = track_density("raw", None)?;
    let tdi_weighted = track_density("weighted", Some(weights.path()))?;

    persister.persist_all([&tracks, &weights, &tdi_weighted])?;

    Ok(TractographyOutputs { tracks, weights, tdi_raw, tdi_weighted })
}
