//! End-to-end survey run: train on one region, predict another.
//!
//! Stages, in order:
//!   1. site database → filtered, deduplicated sites per region
//!   2. region polygon filter on sites
//!   3. cave layer → named, deduplicated caves, polygon-filtered
//!   4. canonical join keys (computed by the loaders)
//!   5. presence labelling
//!   6. predictor extraction
//!   7. balance, split, fit, evaluate on the training region
//!   8. predict the whole training region and the target region
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::caves::{load_caves, CaveRecord};
use crate::config::{RegionConfig, SurveyConfig};
use crate::error::{Error, Result};
use crate::join::{label_observations, Observation};
use crate::model::{train_and_evaluate, ModelReport};
use crate::names::Stopwords;
use crate::predict::{apply_model, write_predictions, write_report, Outcome, Prediction};
use crate::predictors::{attach_predictors, PredictorLayers};
use crate::raster::write_geotiff;
use crate::sites::{load_sites, write_sites, SiteFilter, SiteRecord};
use crate::spatial_filter::{filter_points, ContainmentGrid};
use crate::vector::read_polygons;

/// Counts for one region.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegionSummary {
    pub id: String,
    pub sites: usize,
    pub caves: usize,
    pub observations: usize,
    pub predicted: usize,
    /// Caves predicted positive without known archaeology.
    pub survey_candidates: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveySummary {
    pub training: RegionSummary,
    pub target: RegionSummary,
    pub report: ModelReport,
    pub outputs: Vec<PathBuf>,
}

/// The region-of-interest mask of a region.
pub fn region_grid(config: &SurveyConfig, region: &RegionConfig) -> Result<ContainmentGrid> {
    let polygons = read_polygons(&region.boundary)?;
    let n = config.extraction.filter_grid;
    ContainmentGrid::rasterize(&polygons, n, n)
}

/// Stages 1–2: sites of a region, inside its boundary polygon.
pub fn region_sites(
    config: &SurveyConfig,
    region: &RegionConfig,
    grid: &ContainmentGrid,
    stopwords: &Stopwords,
) -> Result<Vec<SiteRecord>> {
    let filter = SiteFilter::for_region(&config.sites, region);
    let sites = load_sites(&config.sites.path, config.sites.delimiter, &filter, stopwords)?;
    Ok(filter_points(sites, grid, |s| (s.lon, s.lat)))
}

/// Stage 3: caves of a region, inside its boundary polygon.
pub fn region_caves(
    region: &RegionConfig,
    grid: &ContainmentGrid,
    stopwords: &Stopwords,
) -> Result<Vec<CaveRecord>> {
    let caves = load_caves(&region.caves, stopwords)?;
    Ok(filter_points(caves, grid, |c| (c.lon, c.lat)))
}

struct PreparedRegion {
    summary: RegionSummary,
    observations: Vec<Observation>,
}

/// Stages 1–6 for one region, writing its cleaned site table (and the
/// derived slope raster when one was computed).
fn prepare_region(
    config: &SurveyConfig,
    region: &RegionConfig,
    stopwords: &Stopwords,
    out_dir: &Path,
    outputs: &mut Vec<PathBuf>,
) -> Result<PreparedRegion> {
    info!(region = %region.id, "preparing region");
    let grid = region_grid(config, region)?;

    let sites = region_sites(config, region, &grid, stopwords)?;
    let sites_path = out_dir.join(format!("sites_{}.csv", region.id));
    write_sites(&sites_path, &sites)?;
    outputs.push(sites_path);

    let caves = region_caves(region, &grid, stopwords)?;
    let mut observations = label_observations(&sites, &caves);

    let layers = PredictorLayers::load(&region.layers, &config.extraction)?;
    if region.layers.slope.is_none() {
        let slope_path = out_dir.join(format!("slope_{}.tif", region.id));
        write_geotiff(&layers.slope, &slope_path)?;
        outputs.push(slope_path);
    }
    attach_predictors(&mut observations, &layers);

    Ok(PreparedRegion {
        summary: RegionSummary {
            id: region.id.clone(),
            sites: sites.len(),
            caves: caves.len(),
            observations: observations.len(),
            ..Default::default()
        },
        observations,
    })
}

fn export_predictions(
    region: &mut PreparedRegion,
    predictions: &[Prediction],
    out_dir: &Path,
    outputs: &mut Vec<PathBuf>,
) -> Result<()> {
    let path = out_dir.join(format!("predictions_{}.csv", region.summary.id));
    write_predictions(&path, predictions)?;
    outputs.push(path);
    region.summary.predicted = predictions.len();
    region.summary.survey_candidates =
        predictions.iter().filter(|p| p.outcome == Outcome::FalsePositive).count();
    Ok(())
}

/// Run every stage and write all outputs into `out_dir`.
pub fn run(config: &SurveyConfig, out_dir: &Path) -> Result<SurveySummary> {
    if config.training.id == config.target.id {
        return Err(Error::Config(format!(
            "training and target regions share the id {:?}",
            config.training.id
        )));
    }
    fs::create_dir_all(out_dir).map_err(|e| Error::io(out_dir, e))?;
    let stopwords = Stopwords::with_extra(&config.stopwords_extra)?;
    let mut outputs = Vec::new();

    let mut training = prepare_region(config, &config.training, &stopwords, out_dir, &mut outputs)?;
    let trained = train_and_evaluate(&training.observations, &config.model, config.seed)?;

    let model_path = out_dir.join("model.json");
    fs::write(&model_path, trained.forest.to_json()?).map_err(|e| Error::io(&model_path, e))?;
    outputs.push(model_path);
    let report_path = out_dir.join("model_report.json");
    write_report(&report_path, &trained.report)?;
    outputs.push(report_path);

    let predictions = apply_model(&trained.forest, &training.observations);
    export_predictions(&mut training, &predictions, out_dir, &mut outputs)?;

    let mut target = prepare_region(config, &config.target, &stopwords, out_dir, &mut outputs)?;
    let predictions = apply_model(&trained.forest, &target.observations);
    export_predictions(&mut target, &predictions, out_dir, &mut outputs)?;

    info!(
        training = %training.summary.id,
        target = %target.summary.id,
        target_candidates = target.summary.survey_candidates,
        files = outputs.len(),
        "survey complete"
    );
    Ok(SurveySummary {
        training: training.summary,
        target: target.summary,
        report: trained.report,
        outputs,
    })
}
