//! Applying a fitted forest to a region and exporting the results.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::join::Observation;
use crate::model::{FeatureMatrix, ModelReport, RandomForest};

/// Where a prediction falls against the known label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    TruePositive,
    TrueNegative,
    /// Predicted positive with no known archaeology: a survey candidate.
    FalsePositive,
    FalseNegative,
}

impl Outcome {
    pub fn classify(label: bool, predicted: bool) -> Self {
        match (label, predicted) {
            (true, true) => Outcome::TruePositive,
            (false, false) => Outcome::TrueNegative,
            (false, true) => Outcome::FalsePositive,
            (true, false) => Outcome::FalseNegative,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub observation: Observation,
    pub predicted: bool,
    /// Fraction of trees voting positive.
    pub probability: f64,
    pub outcome: Outcome,
}

/// Predict every observation with a complete predictor set; the rest are
/// skipped and counted.
pub fn apply_model(forest: &RandomForest, observations: &[Observation]) -> Vec<Prediction> {
    let matrix = FeatureMatrix::encode(observations, forest.features().to_vec());
    let predictions: Vec<Prediction> = matrix
        .rows
        .iter()
        .zip(&matrix.source)
        .map(|(row, &i)| {
            let observation = observations[i].clone();
            let probability = forest.predict_proba(row);
            let predicted = probability > 0.5;
            let outcome = Outcome::classify(observation.meso_arch, predicted);
            Prediction { observation, predicted, probability, outcome }
        })
        .collect();
    let candidates = predictions.iter().filter(|p| p.outcome == Outcome::FalsePositive).count();
    info!(
        predicted = predictions.len(),
        skipped = matrix.dropped,
        survey_candidates = candidates,
        "model applied"
    );
    predictions
}

/// Flat CSV row of a prediction.
#[derive(Serialize)]
struct PredictionRow<'a> {
    name: &'a str,
    canonical: &'a str,
    lat: f64,
    lon: f64,
    meso_arch: bool,
    elevation: Option<f64>,
    slope: Option<f64>,
    mobility: Option<f64>,
    river_distance: Option<f64>,
    coast_distance: Option<f64>,
    viewshed: Option<f64>,
    geology: Option<&'a str>,
    predicted: bool,
    probability: f64,
    outcome: Outcome,
}

impl<'a> From<&'a Prediction> for PredictionRow<'a> {
    fn from(p: &'a Prediction) -> Self {
        let o = &p.observation;
        let v = &o.predictors;
        Self {
            name: &o.name,
            canonical: &o.canonical,
            lat: o.lat,
            lon: o.lon,
            meso_arch: o.meso_arch,
            elevation: v.elevation,
            slope: v.slope,
            mobility: v.mobility,
            river_distance: v.river_distance,
            coast_distance: v.coast_distance,
            viewshed: v.viewshed,
            geology: v.geology.as_deref(),
            predicted: p.predicted,
            probability: p.probability,
            outcome: p.outcome,
        }
    }
}

pub fn write_predictions(path: &Path, predictions: &[Prediction]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for p in predictions {
        wtr.serialize(PredictionRow::from(p))?;
    }
    wtr.flush().map_err(|e| Error::io(path, e))?;
    info!(path = %path.display(), rows = predictions.len(), "predictions written");
    Ok(())
}

pub fn write_report(path: &Path, report: &ModelReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).map_err(|e| Error::io(path, e))
}
