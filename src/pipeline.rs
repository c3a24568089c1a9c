//! Per-subject pipeline
//!
//! Sequences the kernels and stages for one subject in dependency order:
//! phase-encoding table, eddy indices, b=0 normalization, denoising,
//! b-vector rotation, tractography. The first error aborts the run; scratch
//! is left in place for external cleanup.

use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::denoise::{self, DenoiseOutput};
use crate::eddy;
use crate::error::{PipelineError, Result};
use crate::execution::ExecutionContext;
use crate::gradients;
use crate::inputs::{DerivedInputs, InputGroup};
use crate::normalize;
use crate::persist::OutputPersister;
use crate::phase_encoding::{self, AcquisitionMetadata, PhaseEncodingRecord};
use crate::scratch::{Artifact, ScratchAllocator};
use crate::tractography::{self, TractographyOutputs};

/// Everything a run produced, in stage order.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub phase_encoding: Vec<PhaseEncodingRecord>,
    pub phenc: Artifact,
    pub pe_groups: Vec<u32>,
    pub eddy_indices: Artifact,
    pub normalized_b0: Option<Artifact>,
    pub denoised: Vec<DenoiseOutput>,
    pub rotated_bvecs: Vec<Artifact>,
    pub tractography: Option<TractographyOutputs>,
}

pub struct ParticipantPipeline<'a> {
    cfg: &'a Config,
    ctx: &'a ExecutionContext,
    metadata: &'a dyn AcquisitionMetadata,
    scratch: ScratchAllocator,
    persister: OutputPersister,
}

impl<'a> ParticipantPipeline<'a> {
    pub fn new(cfg: &'a Config, ctx: &'a ExecutionContext, metadata: &'a dyn AcquisitionMetadata) -> Self {
        ParticipantPipeline {
            cfg,
            ctx,
            metadata,
            scratch: ScratchAllocator::new(&cfg.io.working_dir),
            persister: OutputPersister::new(&cfg.io.output_dir),
        }
    }

    pub fn scratch(&self) -> &ScratchAllocator {
        &self.scratch
    }

    pub fn persister(&self) -> &OutputPersister {
        &self.persister
    }

    /// Run every stage over `acquisitions`, the subject's phase-encoding set.
    ///
    /// Names of subject-level outputs come from the first acquisition.
    pub fn run(&self, acquisitions: &[InputGroup], derived: &DerivedInputs) -> Result<RunSummary> {
        let primary = acquisitions
            .first()
            .ok_or_else(|| PipelineError::InvalidConfig("no acquisitions to process".into()))?;
        info!(entities = %primary.entities, acquisitions = acquisitions.len(), "starting participant run");
        if derived.fod.is_some() {
            // Reject unsupported tracking methods before any kernel runs.
            tractography::strategy(self.cfg.tractography.method)?;
        }

        let phase_encoding = acquisitions
            .iter()
            .enumerate()
            .map(|(idx, group)| phase_encoding::phase_encoding_info(idx, group, self.metadata))
            .collect::<Result<Vec<_>>>()?;
        let phenc = phase_encoding::concat_phenc(&phase_encoding, primary, &self.scratch)?;

        let directions: Vec<_> = phase_encoding.iter().map(|r| r.direction).collect();
        let pe_groups = eddy::pe_indices(&directions)?;
        let volumes: Vec<&PathBuf> = acquisitions.iter().map(|g| &g.dwi.nii).collect();
        let eddy_indices = eddy::eddy_indices(&volumes, Some(pe_groups.as_slice()), primary, &self.scratch)?;

        let normalized_b0 = derived
            .b0
            .as_deref()
            .map(|b0| normalize::normalize(b0, primary, &self.scratch))
            .transpose()?;

        let denoised = acquisitions
            .iter()
            .map(|group| denoise::denoise(group, self.cfg, &self.scratch, self.ctx, &self.persister))
            .collect::<Result<Vec<_>>>()?;

        let rotated_bvecs = match derived.transform.as_deref() {
            Some(transform) => acquisitions
                .iter()
                .map(|group| gradients::rotate_bvec(&group.dwi.bvec, transform, group, &self.scratch))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let tractography = derived
            .fod
            .as_deref()
            .map(|fod| {
                tractography::generate_tractography(
                    primary,
                    fod,
                    self.cfg,
                    &self.scratch,
                    self.ctx,
                    &self.persister,
                )
            })
            .transpose()?;

        info!(entities = %primary.entities, "participant run complete");
        Ok(RunSummary {
            phase_encoding,
            phenc,
            pe_groups,
            eddy_indices,
            normalized_b0,
            denoised,
            rotated_bvecs,
            tractography,
        })
    }
}
