//! NIfTI file I/O
//!
//! Header-only reads for shape queries, full reads of 4D diffusion volumes
//! that keep the source header, and writes that reuse that header so affine
//! and metadata survive a round trip through a numeric kernel.
//!
//! Data are held as `f64`, which is exact for every stored type up to int32.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use ndarray::{Array, ArrayD, Dimension, Ix4, RemoveAxis};
use nifti::volume::ndarray::IntoNdArray;
use nifti::writer::WriterOptions;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject, NiftiType};

use crate::error::{PipelineError, Result};

/// A volume loaded with its header, data indexed `[x, y, z, t]`.
pub struct NiftiVolume {
    pub header: NiftiHeader,
    pub data: ArrayD<f64>,
}

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Get header info for diagnostics
fn get_header_info(bytes: &[u8]) -> String {
    if bytes.len() < 348 {
        return format!("file too small ({} bytes, need at least 348)", bytes.len());
    }

    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);

    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

/// Read only the header of a .nii or .nii.gz file
///
/// Gzip is detected from the leading magic bytes, not the extension.
pub fn read_header(path: &Path) -> Result<NiftiHeader> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let gz = is_gzip(reader.fill_buf().map_err(|e| PipelineError::io(path, e))?);

    let header = if gz {
        NiftiHeader::from_reader(GzDecoder::new(reader))
    } else {
        NiftiHeader::from_reader(reader)
    };
    header.map_err(|e| PipelineError::nifti(path, e))
}

/// Image shape from the header, `dim[1..=dim[0]]`
pub fn read_shape(path: &Path) -> Result<Vec<usize>> {
    let header = read_header(path)?;
    Ok(header_shape(&header))
}

pub(crate) fn header_shape(header: &NiftiHeader) -> Vec<usize> {
    let ndim = (header.dim[0] as usize).min(7);
    header.dim[1..=ndim].iter().map(|&d| d as usize).collect()
}

/// Load a NIfTI volume from bytes
///
/// Supports both .nii and .nii.gz content (gzip is auto-detected).
pub fn load_volume_bytes(bytes: &[u8]) -> std::result::Result<NiftiVolume, String> {
    let obj: InMemNiftiObject = if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes))).map_err(|e| {
            let mut decompressed = Vec::new();
            let info = if GzDecoder::new(Cursor::new(bytes)).read_to_end(&mut decompressed).is_ok() {
                get_header_info(&decompressed)
            } else {
                "could not decompress".to_string()
            };
            format!("failed to read gzipped NIfTI: {} ({})", e, info)
        })?
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| format!("failed to read NIfTI: {} ({})", e, get_header_info(bytes)))?
    };

    let header = obj.header().clone();
    let data: ArrayD<f64> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| format!("failed to convert to ndarray: {}", e))?;

    if data.ndim() < 3 {
        return Err(format!("expected at least 3D volume, got {}D", data.ndim()));
    }

    Ok(NiftiVolume { header, data })
}

/// Read a NIfTI volume from a filesystem path
pub fn read_volume(path: &Path) -> Result<NiftiVolume> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    load_volume_bytes(&bytes).map_err(|reason| PipelineError::volume(path, reason))
}

/// Read a volume that must be 4D
pub fn read_volume_4d(path: &Path) -> Result<(NiftiHeader, ndarray::Array4<f64>)> {
    let volume = read_volume(path)?;
    let ndim = volume.data.ndim();
    let data = volume
        .data
        .into_dimensionality::<Ix4>()
        .map_err(|_| PipelineError::volume(path, format!("expected 4D volume, got {}D", ndim)))?;
    Ok((volume.header, data))
}

/// Write data using `reference` for geometry and metadata
///
/// Scaling is reset to identity because the data were already scaled on
/// read. A FLOAT32 reference is written back as FLOAT32; anything else is
/// stored as FLOAT64. A `.nii.gz` path is gzip compressed.
pub fn write_volume<D: Dimension + RemoveAxis>(
    path: &Path,
    reference: &NiftiHeader,
    data: &Array<f64, D>,
) -> Result<()> {
    let mut header = reference.clone();
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;

    let writer = WriterOptions::new(path).reference_header(&header);
    let written = match reference.data_type() {
        Ok(NiftiType::Float32) => writer.write_nifti(&data.mapv(|v| v as f32)),
        _ => writer.write_nifti(data),
    };
    written.map_err(|e| PipelineError::nifti(path, e))
}
