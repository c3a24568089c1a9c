//! Kernel and stage tests on synthetic acquisitions

mod common;

use std::fs;
use std::path::{Path, PathBuf};

use common::{acquisition, list_files, write_frames, RecordingRunner};
use dwiproc::config::{Config, DenoiseEstimator, TractographyMethod};
use dwiproc::denoise::{self, DenoiseDecision, SkipReason};
use dwiproc::eddy;
use dwiproc::error::PipelineError;
use dwiproc::gradients;
use dwiproc::nifti_io;
use dwiproc::normalize;
use dwiproc::persist::OutputPersister;
use dwiproc::phase_encoding::{self, SidecarMetadata};
use dwiproc::scratch::ScratchAllocator;
use dwiproc::tables;
use dwiproc::tractography;

struct Fixture {
    _tmp: tempfile::TempDir,
    root: PathBuf,
    cfg: Config,
    scratch: ScratchAllocator,
    persister: OutputPersister,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().to_path_buf();
    let cfg = Config::new(root.join("work"), root.join("out"));
    Fixture {
        scratch: ScratchAllocator::new(&cfg.io.working_dir),
        persister: OutputPersister::new(&cfg.io.output_dir),
        cfg,
        root,
        _tmp: tmp,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().to_string()
}

#[test]
fn test_phase_encoding_from_sidecar() {
    let fx = fixture();
    let group = acquisition(&fx.root, "1", "j-", 2, 3);
    let metadata = SidecarMetadata::new(&fx.cfg.metadata);

    let record = phase_encoding::phase_encoding_info(0, &group, &metadata).unwrap();
    assert_eq!(record.direction.to_string(), "j-");
    assert_eq!(&record.row[..3], &[0.0, -1.0, 0.0]);
    // 6 voxels along j
    assert!((record.row[3] - 0.003).abs() < 1e-12);
}

#[test]
fn test_phase_encoding_overrides_win() {
    let mut fx = fixture();
    let mut group = acquisition(&fx.root, "1", "j-", 2, 3);
    group.dwi.json = None;
    fx.cfg.metadata.pe_dirs = Some(vec!["i".into()]);
    fx.cfg.metadata.echo_spacing = Some(0.001);
    let metadata = SidecarMetadata::new(&fx.cfg.metadata);

    let record = phase_encoding::phase_encoding_info(0, &group, &metadata).unwrap();
    assert_eq!(&record.row[..3], &[1.0, 0.0, 0.0]);
    assert!((record.row[3] - 0.008).abs() < 1e-12);
}

#[test]
fn test_missing_metadata() {
    let fx = fixture();
    let mut group = acquisition(&fx.root, "1", "j", 2, 3);
    group.dwi.json = None;
    let metadata = SidecarMetadata::new(&fx.cfg.metadata);

    let err = phase_encoding::phase_encoding_info(3, &group, &metadata).unwrap_err();
    assert!(matches!(err, PipelineError::MetadataMissing { index: 3, .. }), "{err}");

    let json = fx.root.join("bare.json");
    fs::write(&json, r#"{"PhaseEncodingDirection": "j"}"#).unwrap();
    group.dwi.json = Some(json);
    let err = phase_encoding::phase_encoding_info(0, &group, &metadata).unwrap_err();
    assert!(
        matches!(err, PipelineError::MetadataMissing { field: "EffectiveEchoSpacing", .. }),
        "{err}"
    );
}

#[test]
fn test_concat_phenc_table() {
    let fx = fixture();
    let a = acquisition(&fx.root, "1", "j", 2, 3);
    let b = acquisition(&fx.root, "2", "j-", 2, 3);
    let metadata = SidecarMetadata::new(&fx.cfg.metadata);

    let records = vec![
        phase_encoding::phase_encoding_info(0, &a, &metadata).unwrap(),
        phase_encoding::phase_encoding_info(1, &b, &metadata).unwrap(),
    ];
    let artifact = phase_encoding::concat_phenc(&records, &a, &fx.scratch).unwrap();

    assert_eq!(file_name(artifact.path()), "sub-01_run-1_desc-concat_phenc.txt");
    assert!(file_name(artifact.path().parent().unwrap()).ends_with("_concat-phenc"));
    assert_eq!(
        fs::read_to_string(artifact.path()).unwrap(),
        "0.00000 1.00000 0.00000 0.00300\n0.00000 -1.00000 0.00000 0.00300\n"
    );
}

#[test]
fn test_eddy_indices_cover_every_frame() {
    let fx = fixture();
    let a = acquisition(&fx.root, "1", "j", 2, 5);
    let b = acquisition(&fx.root, "2", "j-", 1, 2);

    let artifact = eddy::eddy_indices(&[&a.dwi.nii, &b.dwi.nii], Some(&[1, 2][..]), &a, &fx.scratch).unwrap();
    assert_eq!(file_name(artifact.path()), "sub-01_run-1_desc-eddy_indices.txt");

    let text = fs::read_to_string(artifact.path()).unwrap();
    let values: Vec<u32> = text.split_whitespace().map(|v| v.parse().unwrap()).collect();
    assert_eq!(values, vec![1, 1, 1, 1, 1, 1, 1, 2, 2, 2]);

    // 3D images count once
    let single = eddy::eddy_indices(&[&a.dwi.mask], None, &a, &fx.scratch).unwrap();
    assert_eq!(fs::read_to_string(single.path()).unwrap().trim(), "1");
}

#[test]
fn test_rotate_bvec_artifact() {
    let fx = fixture();
    let group = acquisition(&fx.root, "1", "j", 1, 3);
    let transform = fx.root.join("dwi_to_t1w.txt");
    fs::write(&transform, "0 -1 0 5\n1 0 0 2\n0 0 1 -1\n0 0 0 1\n").unwrap();

    let artifact = gradients::rotate_bvec(&group.dwi.bvec, &transform, &group, &fx.scratch).unwrap();
    assert_eq!(
        file_name(artifact.path()),
        "sub-01_run-1_space-T1w_res-dwi_desc-preproc_dwi.bvec"
    );

    let rotated = tables::read_matrix(artifact.path()).unwrap();
    assert_eq!(rotated.dim(), (3, 4));
    assert_eq!(rotated.column(0).to_vec(), vec![0.0, 0.0, 0.0]);
    assert_eq!(rotated.column(1).to_vec(), vec![0.0, 1.0, 0.0]);
    assert_eq!(rotated.column(2).to_vec(), vec![-1.0, 0.0, 0.0]);
    assert!(fs::read_to_string(artifact.path()).unwrap().starts_with("0.00000 0.00000 -1.00000"));
}

#[test]
fn test_normalize_preserves_geometry() {
    let fx = fixture();
    let group = acquisition(&fx.root, "1", "j", 1, 1);
    let b0 = fx.root.join("b0.nii.gz");
    write_frames(&b0, (4, 4, 2), &[100.0, 200.0, 0.0, 25.0]);

    let artifact = normalize::normalize(&b0, &group, &fx.scratch).unwrap();
    assert_eq!(file_name(artifact.path()), "sub-01_run-1_desc-normalized_b0.nii.gz");

    let (header, data) = nifti_io::read_volume_4d(artifact.path()).unwrap();
    assert_eq!(data.dim(), (4, 4, 2, 4));
    assert_eq!(data[[0, 0, 0, 0]], 100.0);
    assert!((data[[1, 2, 1, 1]] - 100.0).abs() < 1e-3);
    assert_eq!(data[[3, 3, 1, 2]], 0.0);
    assert!((data[[0, 1, 0, 3]] - 100.0).abs() < 1e-3);
    assert!((header.srow_x[3] + 40.0).abs() < 1e-6);
    assert!((header.pixdim[1] - 2.0).abs() < 1e-6);
}

#[test]
fn test_denoise_skips_with_few_directions() {
    let fx = fixture();
    let group = acquisition(&fx.root, "1", "j", 3, 29);
    let runner = RecordingRunner::new();
    let ctx = runner.context(1);

    let out = denoise::denoise(&group, &fx.cfg, &fx.scratch, &ctx, &fx.persister).unwrap();
    assert_eq!(out.decision, DenoiseDecision::Skip(SkipReason::TooFewDirections { found: 29 }));
    assert_eq!(out.dwi, group.dwi.nii);
    assert!(runner.calls().is_empty());
}

#[test]
fn test_denoise_runs_at_threshold() {
    let mut fx = fixture();
    fx.cfg.denoise.estimator = DenoiseEstimator::Exp1;
    fx.cfg.denoise.extent = Some([5, 5, 3]);
    let group = acquisition(&fx.root, "1", "j", 3, 30);
    let runner = RecordingRunner::new();
    let ctx = runner.context(1);

    let out = denoise::denoise(&group, &fx.cfg, &fx.scratch, &ctx, &fx.persister).unwrap();
    assert_eq!(out.decision, DenoiseDecision::Run);
    assert_eq!(file_name(&out.dwi), "sub-01_run-1_desc-denoise_dwi.nii.gz");
    assert!(out.noise_map.is_none());

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program(), "dwidenoise");
    assert_eq!(calls[0].option_value("-estimator").unwrap(), "Exp1");
    assert_eq!(calls[0].option_value("-extent").unwrap(), "5,5,3");
    assert!(!calls[0].has_arg("-noise"));
    assert!(list_files(&fx.root.join("out")).is_empty());
}

#[test]
fn test_denoise_persists_noise_map() {
    let mut fx = fixture();
    fx.cfg.denoise.map = true;
    let group = acquisition(&fx.root, "1", "j", 3, 40);
    let runner = RecordingRunner::new();
    let ctx = runner.context(1);

    let out = denoise::denoise(&group, &fx.cfg, &fx.scratch, &ctx, &fx.persister).unwrap();
    let noise_map = out.noise_map.unwrap();
    assert_eq!(noise_map.path().parent(), out.dwi.parent());
    assert_eq!(
        list_files(&fx.root.join("out")),
        vec![PathBuf::from("sub-01/dwi/sub-01_run-1_alg-Exp2_param-noise_dwimap.nii.gz")]
    );
}

#[test]
fn test_denoise_missing_noise_map_is_fatal() {
    let mut fx = fixture();
    fx.cfg.denoise.map = true;
    let group = acquisition(&fx.root, "1", "j", 3, 40);
    let runner = RecordingRunner::without_noise_map();
    let ctx = runner.context(1);

    let err = denoise::denoise(&group, &fx.cfg, &fx.scratch, &ctx, &fx.persister).unwrap_err();
    assert!(
        matches!(err, PipelineError::ExpectedOutputMissing { kernel: "dwidenoise", .. }),
        "{err}"
    );
    assert!(list_files(&fx.root.join("out")).is_empty());
}

#[test]
fn test_tractography_wm() {
    let mut fx = fixture();
    fx.cfg.tractography.steps = Some(0.5);
    fx.cfg.tractography.streamlines = 2000;
    let group = acquisition(&fx.root, "1", "j", 1, 3);
    let fod = fx.root.join("wm_fod.nii.gz");
    fs::write(&fod, b"fod").unwrap();
    let runner = RecordingRunner::new();
    let ctx = runner.context(4);

    let out = tractography::generate_tractography(&group, &fod, &fx.cfg, &fx.scratch, &ctx, &fx.persister)
        .unwrap();

    assert_eq!(runner.programs(), vec!["tckgen", "tcksift2", "tckmap", "tckmap"]);
    let calls = runner.calls();
    for call in &calls {
        assert_eq!(call.option_value("-nthreads").unwrap(), "4", "{call}");
    }

    let tckgen = &calls[0];
    assert_eq!(tckgen.option_value("-algorithm").unwrap(), "iFOD2");
    assert_eq!(tckgen.option_value("-seed_dynamic").unwrap(), fod.as_os_str());
    assert_eq!(tckgen.option_value("-step").unwrap(), "0.5");
    assert_eq!(tckgen.option_value("-select").unwrap(), "2000");
    assert!(!tckgen.has_arg("-cutoff"));

    assert!(!calls[2].has_arg("-tck_weights_in"));
    assert_eq!(calls[3].option_value("-tck_weights_in").unwrap(), out.weights.path().as_os_str());
    assert_eq!(calls[3].option_value("-template").unwrap(), fod.as_os_str());

    assert_eq!(
        list_files(&fx.root.join("out")),
        vec![
            PathBuf::from("sub-01/dwi/sub-01_run-1_meas-weighted_tdi.nii.gz"),
            PathBuf::from("sub-01/dwi/sub-01_run-1_method-SIFT2_tckWeights.txt"),
            PathBuf::from("sub-01/dwi/sub-01_run-1_method-iFOD2_tractography.tck"),
        ]
    );
    assert_eq!(file_name(out.tdi_raw.path()), "sub-01_run-1_meas-raw_tdi.nii.gz");
    assert!(out.tdi_raw.exists());
}

#[test]
fn test_tractography_act_unsupported() {
    let mut fx = fixture();
    fx.cfg.tractography.method = TractographyMethod::Act;
    let group = acquisition(&fx.root, "1", "j", 1, 3);
    let runner = RecordingRunner::new();
    let ctx = runner.context(2);

    let err = tractography::generate_tractography(
        &group,
        Path::new("wm_fod.nii.gz"),
        &fx.cfg,
        &fx.scratch,
        &ctx,
        &fx.persister,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedMethod(ref m) if m == "act"), "{err}");
    assert!(runner.calls().is_empty());
    assert!(list_files(&fx.root.join("work")).is_empty());
}
