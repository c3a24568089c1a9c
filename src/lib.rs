//! dwiproc: per-subject diffusion MRI derivative pipeline
//!
//! Computes the auxiliary tables and volumes that correction and modeling
//! kernels need, calls those kernels in dependency order, and names every
//! derivative deterministically.
//!
//! # Modules
//! - `bids`: entity-keyed derivative names
//! - `scratch`: collision-free working directories
//! - `phase_encoding`: phase-encoding directions and readout rows
//! - `eddy`: PE grouping and per-frame eddy index tables
//! - `gradients`: b-vector rotation
//! - `normalize`: 4D intensity normalization
//! - `denoise`, `tractography`: kernel-driven stages
//! - `persist`: copying derivatives to the output tree
//! - `pipeline`: one subject's run

// Core modules
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;

// Naming and storage
pub mod bids;
pub mod persist;
pub mod scratch;

// Numeric kernels
pub mod eddy;
pub mod gradients;
pub mod normalize;
pub mod phase_encoding;

// Stages
pub mod denoise;
pub mod pipeline;
pub mod tractography;

// I/O modules
pub mod inputs;
pub mod nifti_io;
pub mod tables;

pub use error::{PipelineError, Result};
