//! b-vector reorientation
//!
//! Applies the linear part of a spatial transform to each gradient direction.
//! Vectors are not renormalized, so b=0 columns stay zero.

use std::path::Path;

use ndarray::{s, Array2};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::inputs::InputGroup;
use crate::scratch::{Artifact, ScratchAllocator};
use crate::tables;

/// Rotate a 3xN table by the upper-left 3x3 block of `transform`.
///
/// The caller guarantees `bvec` has 3 rows and `transform` is at least 3x3.
pub fn rotate(bvec: &Array2<f64>, transform: &Array2<f64>) -> Array2<f64> {
    transform.slice(s![..3, ..3]).dot(bvec)
}

/// Accept 3xN or Nx3 tables, returning 3xN.
fn as_columns(table: Array2<f64>, path: &Path) -> Result<Array2<f64>> {
    match table.dim() {
        (3, _) => Ok(table),
        (_, 3) => Ok(table.reversed_axes()),
        (rows, cols) => Err(PipelineError::table(
            path,
            format!("expected a 3xN b-vector table, got {}x{}", rows, cols),
        )),
    }
}

/// Rotate `bvec_path` by `transform_path` and write the result.
pub fn rotate_bvec(
    bvec_path: &Path,
    transform_path: &Path,
    group: &InputGroup,
    scratch: &ScratchAllocator,
) -> Result<Artifact> {
    let bvec = as_columns(tables::read_matrix(bvec_path)?, bvec_path)?;
    let transform = tables::read_matrix(transform_path)?;
    let (rows, cols) = transform.dim();
    if rows < 3 || cols < 3 {
        return Err(PipelineError::table(
            transform_path,
            format!("transform must be at least 3x3, got {}x{}", rows, cols),
        ));
    }

    let rotated = rotate(&bvec, &transform);

    let name = group
        .bids()
        .space("T1w")
        .res("dwi")
        .desc("preproc")
        .suffix("dwi")
        .ext(".bvec");
    let artifact = scratch.artifact("rotate-bvec", name)?;
    tables::write_matrix(artifact.path(), &rotated)?;

    info!(directions = rotated.ncols(), path = %artifact.path().display(), "rotated b-vectors");
    Ok(artifact)
}
