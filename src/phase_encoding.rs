//! Phase-encoding resolution
//!
//! Turns acquisition metadata into the `vx vy vz readout` rows consumed by the
//! field-estimation and eddy-correction kernels.
//!
//! A direction label is one of `i`, `j`, `k`, optionally followed by `-`.
//! The row's vector is the unit basis vector for that axis, negated for `-`;
//! the readout term is the effective echo spacing times the number of voxels
//! along the encoding axis.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use ndarray::Array2;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::MetadataConfig;
use crate::error::{PipelineError, Result};
use crate::inputs::InputGroup;
use crate::nifti_io;
use crate::scratch::{Artifact, ScratchAllocator};
use crate::tables;

/// Image axis a phase-encoding direction runs along.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeAxis {
    /// Left-right
    I,
    /// Anterior-posterior
    J,
    /// Superior-inferior
    K,
}

impl PeAxis {
    pub fn index(self) -> usize {
        match self {
            PeAxis::I => 0,
            PeAxis::J => 1,
            PeAxis::K => 2,
        }
    }

    pub fn letter(self) -> char {
        match self {
            PeAxis::I => 'i',
            PeAxis::J => 'j',
            PeAxis::K => 'k',
        }
    }
}

/// Parsed direction label such as `j-`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeDirection {
    pub axis: PeAxis,
    pub negative: bool,
}

impl PeDirection {
    /// Unit vector with one nonzero component whose sign follows the label.
    pub fn vector(self) -> [f64; 3] {
        let mut v = [0.0; 3];
        v[self.axis.index()] = if self.negative { -1.0 } else { 1.0 };
        v
    }
}

impl FromStr for PeDirection {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let axis = match chars.next() {
            Some('i') => PeAxis::I,
            Some('j') => PeAxis::J,
            Some('k') => PeAxis::K,
            _ => return Err(PipelineError::InvalidDirection(s.to_string())),
        };
        let negative = match chars.as_str() {
            "" => false,
            "-" => true,
            _ => return Err(PipelineError::InvalidDirection(s.to_string())),
        };
        Ok(PeDirection { axis, negative })
    }
}

impl fmt::Display for PeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.axis.letter())?;
        if self.negative {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// One acquisition's direction and encoding row `[vx, vy, vz, readout]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseEncodingRecord {
    pub direction: PeDirection,
    pub row: [f64; 4],
}

/// Source of per-acquisition echo spacing and encoding direction.
pub trait AcquisitionMetadata {
    /// Effective echo spacing in seconds.
    fn echo_spacing(&self, index: usize, group: &InputGroup) -> Result<f64>;

    /// Raw direction label, e.g. `j-`.
    fn phase_encode_dir(&self, index: usize, group: &InputGroup) -> Result<String>;
}

/// Configuration overrides first, then the acquisition's JSON sidecar.
#[derive(Clone, Copy, Debug)]
pub struct SidecarMetadata<'a> {
    overrides: &'a MetadataConfig,
}

impl<'a> SidecarMetadata<'a> {
    pub fn new(overrides: &'a MetadataConfig) -> Self {
        SidecarMetadata { overrides }
    }

    fn sidecar(&self, index: usize, group: &InputGroup, field: &'static str) -> Result<Value> {
        let path = group
            .dwi
            .json
            .as_deref()
            .ok_or(PipelineError::MetadataMissing { field, index })?;
        read_json(path)
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| PipelineError::table(path, e.to_string()))
}

impl AcquisitionMetadata for SidecarMetadata<'_> {
    fn echo_spacing(&self, index: usize, group: &InputGroup) -> Result<f64> {
        if let Some(spacing) = self.overrides.echo_spacing {
            return Ok(spacing);
        }
        let json = self.sidecar(index, group, "EffectiveEchoSpacing")?;
        ["EffectiveEchoSpacing", "EstimatedEffectiveEchoSpacing"]
            .iter()
            .find_map(|key| json.get(*key).and_then(Value::as_f64))
            .ok_or(PipelineError::MetadataMissing { field: "EffectiveEchoSpacing", index })
    }

    fn phase_encode_dir(&self, index: usize, group: &InputGroup) -> Result<String> {
        if let Some(dir) = self.overrides.pe_dirs.as_ref().and_then(|dirs| dirs.get(index)) {
            return Ok(dir.clone());
        }
        let json = self.sidecar(index, group, "PhaseEncodingDirection")?;
        ["PhaseEncodingDirection", "PhaseEncodingAxis"]
            .iter()
            .find_map(|key| json.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .ok_or(PipelineError::MetadataMissing { field: "PhaseEncodingDirection", index })
    }
}

/// Build the encoding row from a direction, echo spacing and image shape.
pub fn encoding_row(direction: PeDirection, echo_spacing: f64, shape: &[usize]) -> Option<[f64; 4]> {
    let count = *shape.get(direction.axis.index())?;
    let [vx, vy, vz] = direction.vector();
    Some([vx, vy, vz, echo_spacing * count as f64])
}

/// Resolve acquisition `index`'s direction and encoding row.
pub fn phase_encoding_info(
    index: usize,
    group: &InputGroup,
    metadata: &dyn AcquisitionMetadata,
) -> Result<PhaseEncodingRecord> {
    let echo_spacing = metadata.echo_spacing(index, group)?;
    let direction: PeDirection = metadata.phase_encode_dir(index, group)?.parse()?;

    let shape = nifti_io::read_shape(&group.dwi.nii)?;
    let row = encoding_row(direction, echo_spacing, &shape).ok_or_else(|| {
        PipelineError::volume(
            &group.dwi.nii,
            format!("no axis {} in image of shape {:?}", direction.axis.letter(), shape),
        )
    })?;

    debug!(index, %direction, echo_spacing, readout = row[3], "resolved phase encoding");
    Ok(PhaseEncodingRecord { direction, row })
}

/// Write all records as one `vx vy vz readout` table.
pub fn concat_phenc(
    records: &[PhaseEncodingRecord],
    group: &InputGroup,
    scratch: &ScratchAllocator,
) -> Result<Artifact> {
    let name = group.bids().desc("concat").suffix("phenc").ext(".txt");
    let artifact = scratch.artifact("concat-phenc", name)?;

    let flat: Vec<f64> = records.iter().flat_map(|r| r.row).collect();
    let table = Array2::from_shape_vec((records.len(), 4), flat)
        .map_err(|e| PipelineError::table(artifact.path(), e.to_string()))?;
    tables::write_matrix(artifact.path(), &table)?;

    info!(rows = records.len(), path = %artifact.path().display(), "wrote phase-encoding table");
    Ok(artifact)
}
