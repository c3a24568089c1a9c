use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueHint};
use tracing::{error, info};

use dwiproc::config::Config;
use dwiproc::execution::ExecutionContext;
use dwiproc::inputs::InputManifest;
use dwiproc::logging::init_tracing;
use dwiproc::phase_encoding::SidecarMetadata;
use dwiproc::pipeline::ParticipantPipeline;

#[derive(Parser)]
#[command(author, version, about = "Per-subject diffusion MRI derivative pipeline")]
struct Cli {
    /// Run configuration (TOML)
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// Resolved subject inputs (TOML manifest)
    #[arg(long, value_hint = ValueHint::FilePath)]
    inputs: PathBuf,

    /// Override io.threads
    #[arg(long)]
    threads: Option<usize>,

    /// Override io.working_dir
    #[arg(long, value_hint = ValueHint::DirPath)]
    working_dir: Option<PathBuf>,

    /// Override io.output_dir
    #[arg(long, value_hint = ValueHint::DirPath)]
    output_dir: Option<PathBuf>,
}

fn run(cli: Cli) -> dwiproc::Result<()> {
    let mut cfg = Config::load(&cli.config)?;
    if let Some(threads) = cli.threads {
        cfg.io.threads = threads;
    }
    if let Some(dir) = cli.working_dir {
        cfg.io.working_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        cfg.io.output_dir = dir;
    }
    cfg.validate()?;

    let manifest = InputManifest::load(&cli.inputs)?;
    let ctx = ExecutionContext::local(cfg.io.threads);
    let metadata = SidecarMetadata::new(&cfg.metadata);

    let pipeline = ParticipantPipeline::new(&cfg, &ctx, &metadata);
    let summary = pipeline.run(&manifest.acquisitions, &manifest.derived)?;
    info!(
        phenc = %summary.phenc.path().display(),
        eddy_indices = %summary.eddy_indices.path().display(),
        output_dir = %cfg.io.output_dir.display(),
        "finished"
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing("info") {
        eprintln!("{e}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
