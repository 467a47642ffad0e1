//! Train on the training region and rank the target region's caves.
//!
//! Usage: survey --config data/survey.json --output out/

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use meso_core::{logging, pipeline, SurveyConfig};

#[derive(Parser, Debug)]
#[command(name = "survey", about = "Fit the cave presence model and predict a target region")]
struct Args {
    /// Pipeline configuration (JSON).
    #[arg(short, long, default_value = "data/survey.json")]
    config: PathBuf,

    /// Output directory (created if absent).
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// Override the configured master seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the configured tree count.
    #[arg(long)]
    trees: Option<usize>,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init("survey", args.verbose);

    let mut config = SurveyConfig::load(&args.config)
        .with_context(|| format!("Cannot load config {}", args.config.display()))?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(trees) = args.trees {
        config.model.trees = trees;
    }
    config.validate().context("Invalid overrides")?;
    info!(seed = config.seed, trees = config.model.trees, "configuration loaded");

    let summary = pipeline::run(&config, &args.output)
        .with_context(|| format!("Survey run into {} failed", args.output.display()))?;

    println!("{}", serde_json::to_string_pretty(&summary).context("Failed to encode summary")?);
    Ok(())
}
