//! Stage 1–2 only: write the cleaned site table of each configured region.
//!
//! Usage: clean_sites --config data/survey.json --output out/ [--region spain]

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use meso_core::pipeline::{region_grid, region_sites};
use meso_core::sites::{load_sites, write_sites, SiteFilter};
use meso_core::{logging, Stopwords, SurveyConfig};

#[derive(Parser, Debug)]
#[command(name = "clean_sites", about = "Filter and deduplicate the site database per region")]
struct Args {
    /// Pipeline configuration (JSON).
    #[arg(short, long, default_value = "data/survey.json")]
    config: PathBuf,

    /// Output directory (created if absent).
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// Only this region id.
    #[arg(short, long)]
    region: Option<String>,

    /// Skip the boundary-polygon filter (bbox, dates and country only).
    #[arg(long)]
    no_polygon: bool,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init("clean_sites", args.verbose);

    let config = SurveyConfig::load(&args.config)
        .with_context(|| format!("Cannot load config {}", args.config.display()))?;
    let stopwords = Stopwords::with_extra(&config.stopwords_extra).context("Bad stopword list")?;
    fs::create_dir_all(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;

    let regions: Vec<_> = [&config.training, &config.target]
        .into_iter()
        .filter(|r| args.region.as_ref().map_or(true, |id| *id == r.id))
        .collect();
    if regions.is_empty() {
        bail!("No region named {:?} in {}", args.region.unwrap_or_default(), args.config.display());
    }

    for region in regions {
        let sites = if args.no_polygon {
            let filter = SiteFilter::for_region(&config.sites, region);
            load_sites(&config.sites.path, config.sites.delimiter, &filter, &stopwords)
                .with_context(|| format!("Cannot read {}", config.sites.path.display()))?
        } else {
            let grid = region_grid(&config, region)
                .with_context(|| format!("Cannot read boundary {}", region.boundary.display()))?;
            region_sites(&config, region, &grid, &stopwords)
                .with_context(|| format!("Cannot read {}", config.sites.path.display()))?
        };
        let path = args.output.join(format!("sites_{}.csv", region.id));
        write_sites(&path, &sites).with_context(|| format!("Cannot write {}", path.display()))?;
        info!(region = %region.id, sites = sites.len(), path = %path.display(), "site table written");
    }
    Ok(())
}
