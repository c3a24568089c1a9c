//! Eddy-correction index tables
//!
//! Acquisitions that share phase-encoding geometry get the same group index;
//! the per-frame index file expands those groups over every diffusion frame.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::inputs::InputGroup;
use crate::nifti_io;
use crate::phase_encoding::{PeAxis, PeDirection};
use crate::scratch::{Artifact, ScratchAllocator};
use crate::tables;

/// Group indices for a subject's phase-encoding set, one per acquisition.
///
/// Identical directions all map to group 1. Otherwise left-right (`i`)
/// acquisitions are preferred when there are exactly two of them, and the
/// anterior-posterior (`j`) positions are used instead. Indices are 1-based
/// positions in `dirs`. The result can be shorter than `dirs`; an empty
/// result is an error.
pub fn pe_indices(dirs: &[PeDirection]) -> Result<Vec<u32>> {
    let distinct: HashSet<&PeDirection> = dirs.iter().collect();
    if distinct.len() <= 1 {
        return Ok(vec![1; dirs.len()]);
    }

    let positions = |axis: PeAxis| -> Vec<u32> {
        dirs.iter()
            .enumerate()
            .filter(|(_, d)| d.axis == axis)
            .map(|(idx, _)| idx as u32 + 1)
            .collect()
    };
    let lr = positions(PeAxis::I);
    let indices = if lr.len() == 2 { lr } else { positions(PeAxis::J) };

    if indices.is_empty() {
        return Err(PipelineError::UngroupablePhaseEncoding(
            dirs.iter().map(|d| d.to_string()).collect(),
        ));
    }
    debug!(?indices, "grouped phase-encoding directions");
    Ok(indices)
}

/// Replicate each acquisition's index once per frame.
///
/// `shapes` are image shapes in acquisition order; anything under 4D counts
/// as a single frame. `None` means index 1 for every acquisition.
pub fn expand_indices(shapes: &[Vec<usize>], indices: Option<&[u32]>) -> Result<Vec<u32>> {
    let ones;
    let indices = match indices {
        Some(indices) => {
            if indices.len() != shapes.len() {
                return Err(PipelineError::IndexCountMismatch {
                    indices: indices.len(),
                    volumes: shapes.len(),
                });
            }
            indices
        }
        None => {
            ones = vec![1; shapes.len()];
            &ones[..]
        }
    };

    let mut expanded = Vec::new();
    for (shape, &idx) in shapes.iter().zip(indices) {
        let frames = if shape.len() < 4 { 1 } else { shape[3] };
        expanded.extend(std::iter::repeat(idx).take(frames));
    }
    Ok(expanded)
}

/// Write the per-frame eddy index file for `volumes`.
pub fn eddy_indices<P: AsRef<Path>>(
    volumes: &[P],
    indices: Option<&[u32]>,
    group: &InputGroup,
    scratch: &ScratchAllocator,
) -> Result<Artifact> {
    let shapes = volumes
        .iter()
        .map(|v| nifti_io::read_shape(v.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let expanded = expand_indices(&shapes, indices)?;

    let name = group.bids().desc("eddy").suffix("indices").ext(".txt");
    let artifact = scratch.artifact("eddy-indices", name)?;
    tables::write_index_line(artifact.path(), &expanded)?;

    info!(volumes = volumes.len(), frames = expanded.len(), "wrote eddy index table");
    Ok(artifact)
}
