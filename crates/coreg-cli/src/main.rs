use anyhow::{Context, Result};
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use coreg_registration::pipeline::PipelineConfig;
use coreg_registration::{FlirtConfig, Pipeline};

type Backend = NdArray<f32>;

#[derive(Parser, Debug)]
#[command(name = "coreg")]
#[command(about = "Register post-contrast and template volumes to a pre-contrast MRI")]
struct Cli {
    /// Subject directory containing nifti/ and temp/
    root: PathBuf,

    /// FLIRT executable
    #[arg(long, env = "COREG_FLIRT", default_value = "flirt")]
    flirt: PathBuf,

    /// FLIRT cost function used when estimating transforms
    #[arg(long, default_value = "mutualinfo")]
    cost: String,
}

impl Cli {
    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            root: self.root.clone(),
            flirt: FlirtConfig {
                program: self.flirt.clone(),
                cost: self.cost.clone(),
            },
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

/// Run the pipeline; `Ok(false)` when some stage did not complete.
fn run(cli: &Cli) -> Result<bool> {
    let config = cli.config();
    info!(root = %config.root.display(), flirt = %config.flirt.program.display(), "starting");

    let pipeline = Pipeline::<Backend, _>::from_config(config, NdArrayDevice::Cpu)
        .context("Invalid pipeline configuration")?;
    let report = pipeline.run().context("Pipeline aborted")?;

    for stage in &report.stages {
        if stage.is_completed() {
            info!("{stage}");
        } else {
            warn!("{stage}");
        }
    }
    Ok(report.succeeded())
}
