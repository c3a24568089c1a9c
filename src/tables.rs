//! Plain-text numeric tables
//!
//! b-values, b-vectors, transforms and the phase-encoding/index files handed to
//! the correction kernels are whitespace-delimited text.

use std::fs;
use std::path::Path;

use ndarray::Array2;

use crate::error::{PipelineError, Result};

/// Read a whitespace-delimited matrix; blank lines and `#` comments are skipped
pub fn read_matrix(path: &Path) -> Result<Array2<f64>> {
    let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>().map_err(|_| {
                    PipelineError::table(path, format!("line {}: '{}' is not a number", lineno + 1, tok))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }

    let ncols = rows.first().map(|r| r.len()).unwrap_or(0);
    if ncols == 0 {
        return Err(PipelineError::table(path, "table is empty"));
    }
    if let Some(bad) = rows.iter().position(|r| r.len() != ncols) {
        return Err(PipelineError::table(
            path,
            format!("row {} has {} columns, expected {}", bad + 1, rows[bad].len(), ncols),
        ));
    }

    let nrows = rows.len();
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((nrows, ncols), flat).map_err(|e| PipelineError::table(path, e.to_string()))
}

/// Read every number in the file as one flat vector (b-values)
pub fn read_vector(path: &Path) -> Result<Vec<f64>> {
    let matrix = read_matrix(path)?;
    Ok(matrix.iter().copied().collect())
}

/// Format rows with `%.5f`, space-delimited, one row per line
pub fn format_matrix(matrix: &Array2<f64>) -> String {
    let mut out = String::new();
    for row in matrix.rows() {
        let line: Vec<String> = row.iter().map(|v| format!("{:.5}", v)).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}

pub fn write_matrix(path: &Path, matrix: &Array2<f64>) -> Result<()> {
    fs::write(path, format_matrix(matrix)).map_err(|e| PipelineError::io(path, e))
}

/// Write integers on a single space-delimited line
pub fn write_index_line(path: &Path, values: &[u32]) -> Result<()> {
    let line: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    fs::write(path, format!("{}\n", line.join(" "))).map_err(|e| PipelineError::io(path, e))
}
