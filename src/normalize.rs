//! Intensity normalization of 4D volumes
//!
//! Every frame is rescaled so its mean matches frame 0. Frames whose mean is
//! approximately zero are left alone. Arithmetic is done in `f64` so frame 0
//! is written back bit for bit.

use std::path::Path;

use ndarray::{Array4, ArrayView3, Axis};
use tracing::{debug, info};

use crate::error::Result;
use crate::inputs::InputGroup;
use crate::nifti_io;
use crate::scratch::{Artifact, ScratchAllocator};

/// Means at or below this magnitude are treated as zero.
const ZERO_MEAN_ATOL: f64 = 1e-8;

fn frame_mean(frame: ArrayView3<f64>) -> f64 {
    frame.mean().unwrap_or(0.0)
}

/// Rescale frames 1.. in place; returns the reference mean.
pub fn normalize_frames(data: &mut Array4<f64>) -> f64 {
    let reference = frame_mean(data.index_axis(Axis(3), 0));

    for (t, mut frame) in data.axis_iter_mut(Axis(3)).enumerate().skip(1) {
        let mean = frame_mean(frame.view());
        if mean.abs() <= ZERO_MEAN_ATOL {
            debug!(frame = t, "near-zero mean, frame left unscaled");
            continue;
        }
        let ratio = reference / mean;
        frame.mapv_inplace(|v| v * ratio);
    }
    reference
}

/// Normalize `img` and write it with the original header.
pub fn normalize(img: &Path, group: &InputGroup, scratch: &ScratchAllocator) -> Result<Artifact> {
    let (header, mut data) = nifti_io::read_volume_4d(img)?;
    let reference = normalize_frames(&mut data);

    let name = group.bids().desc("normalized").suffix("b0").ext(".nii.gz");
    let artifact = scratch.artifact("normalize", name)?;
    nifti_io::write_volume(artifact.path(), &header, &data)?;

    info!(frames = data.len_of(Axis(3)), reference, "normalized volume");
    Ok(artifact)
}
