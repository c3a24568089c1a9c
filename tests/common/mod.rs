//! Common test utilities for dwiproc integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ndarray::Array4;
use nifti::NiftiHeader;

use dwiproc::bids::Entities;
use dwiproc::execution::{ExecutionContext, Invocation, KernelRunner};
use dwiproc::inputs::{DwiInputs, InputGroup};
use dwiproc::nifti_io;

/// Header with 2mm voxels and a translated sform
pub fn reference_header() -> NiftiHeader {
    let mut header = NiftiHeader::default();
    header.pixdim = [1.0, 2.0, 2.0, 2.0, 1.0, 1.0, 1.0, 1.0];
    header.sform_code = 1;
    header.srow_x = [2.0, 0.0, 0.0, -40.0];
    header.srow_y = [0.0, 2.0, 0.0, -50.0];
    header.srow_z = [0.0, 0.0, 2.0, -30.0];
    header
}

/// Write a 4D volume whose frame `t` has constant value `frame_values[t]`
pub fn write_frames(path: &Path, dims: (usize, usize, usize), frame_values: &[f64]) {
    let (nx, ny, nz) = dims;
    let data = Array4::from_shape_fn((nx, ny, nz, frame_values.len()), |(_, _, _, t)| frame_values[t]);
    nifti_io::write_volume(path, &reference_header(), &data).unwrap();
}

/// b-values: `b0` zeros followed by `weighted` volumes at b=1000
pub fn write_bvals(path: &Path, b0: usize, weighted: usize) {
    let values: Vec<String> = std::iter::repeat("0")
        .take(b0)
        .chain(std::iter::repeat("1000").take(weighted))
        .map(String::from)
        .collect();
    fs::write(path, values.join(" ") + "\n").unwrap();
}

/// 3xN b-vectors, zero for b0 volumes, cycling through the axes otherwise
pub fn write_bvecs(path: &Path, b0: usize, weighted: usize) {
    let mut rows = vec![Vec::new(), Vec::new(), Vec::new()];
    for n in 0..b0 + weighted {
        for (axis, row) in rows.iter_mut().enumerate() {
            let value = if n >= b0 && (n - b0) % 3 == axis { "1" } else { "0" };
            row.push(value);
        }
    }
    let text: Vec<String> = rows.iter().map(|r| r.join(" ")).collect();
    fs::write(path, text.join("\n") + "\n").unwrap();
}

/// Build one acquisition under `root` with a JSON sidecar
///
/// The volume is 8x6x4 with `b0 + weighted` frames.
pub fn acquisition(root: &Path, run: &str, pe_dir: &str, b0: usize, weighted: usize) -> InputGroup {
    let dir = root.join("bids/sub-01/dwi");
    fs::create_dir_all(&dir).unwrap();
    let stem = format!("sub-01_run-{run}_dwi");

    let nii = dir.join(format!("{stem}.nii.gz"));
    let frames: Vec<f64> = (0..b0 + weighted).map(|t| if t < b0 { 400.0 } else { 100.0 }).collect();
    write_frames(&nii, (8, 6, 4), &frames);

    let bval = dir.join(format!("{stem}.bval"));
    write_bvals(&bval, b0, weighted);
    let bvec = dir.join(format!("{stem}.bvec"));
    write_bvecs(&bvec, b0, weighted);

    let mask = dir.join(format!("sub-01_run-{run}_mask.nii.gz"));
    let mask_data = ndarray::Array3::<f64>::ones((8, 6, 4));
    nifti_io::write_volume(&mask, &reference_header(), &mask_data).unwrap();

    let json = dir.join(format!("{stem}.json"));
    fs::write(
        &json,
        format!(r#"{{"PhaseEncodingDirection": "{pe_dir}", "EffectiveEchoSpacing": 0.0005}}"#),
    )
    .unwrap();

    InputGroup {
        entities: Entities::new("01").with_run(run),
        dwi: DwiInputs { nii, bval, bvec, mask, json: Some(json) },
        t1w: None,
    }
}

/// Records every invocation and fakes the kernel's file outputs
#[derive(Clone, Default)]
pub struct RecordingRunner {
    calls: Rc<RefCell<Vec<Invocation>>>,
    /// Do not write the `-noise` map for dwidenoise.
    omit_noise_map: bool,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_noise_map() -> Self {
        RecordingRunner { omit_noise_map: true, ..Self::default() }
    }

    pub fn context(&self, threads: usize) -> ExecutionContext {
        ExecutionContext::new(threads, Box::new(self.clone()))
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.program().to_string()).collect()
    }
}

fn positional(invocation: &Invocation, idx: usize) -> PathBuf {
    PathBuf::from(&invocation.args()[idx])
}

fn touch(path: &Path) {
    fs::write(path, b"kernel output").unwrap();
}

impl KernelRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> dwiproc::Result<()> {
        match invocation.program() {
            "dwidenoise" => {
                touch(&positional(invocation, 1));
                if let Some(noise) = invocation.option_value("-noise") {
                    if !self.omit_noise_map {
                        touch(Path::new(noise));
                    }
                }
            }
            "tckgen" | "tckmap" => touch(&positional(invocation, 1)),
            "tcksift2" => touch(&positional(invocation, 2)),
            _ => {}
        }
        self.calls.borrow_mut().push(invocation.clone());
        Ok(())
    }
}

/// All files under `root`, relative to it, sorted
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = fs::read_dir(dir) else { return };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
