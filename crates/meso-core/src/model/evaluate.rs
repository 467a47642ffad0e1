//! Training and evaluation: feature encoding, balancing, split, fit, scores.
use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::balance::balance_classes;
use super::forest::{FeatureKind, FeatureSpec, ForestParams, RandomForest};
use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::join::Observation;
use crate::predictors::{GEOLOGY, NUMERIC_PREDICTORS};

// Independent RNG streams derived from the master seed.
const BALANCE_STREAM: u64 = 0xBA1A_4CE0_0000_0001;
const SPLIT_STREAM: u64 = 0x5B11_7000_0000_0002;
const FOREST_STREAM: u64 = 0xF02E_5700_0000_0003;

// ── Feature matrix ────────────────────────────────────────────────────────────

/// Complete observations encoded as model rows. `source[i]` is the index of
/// row `i` in the observation slice it was built from.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub features: Vec<FeatureSpec>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<bool>,
    pub source: Vec<usize>,
    pub dropped: usize,
}

impl FeatureMatrix {
    /// Feature schema for a training set: the numeric predictors, then
    /// geology with its levels sorted.
    pub fn schema(observations: &[Observation]) -> Vec<FeatureSpec> {
        let levels: BTreeSet<&str> = observations
            .iter()
            .filter(|o| o.predictors.is_complete())
            .filter_map(|o| o.predictors.geology.as_deref())
            .collect();
        let mut features: Vec<FeatureSpec> = NUMERIC_PREDICTORS
            .iter()
            .map(|n| FeatureSpec { name: n.to_string(), kind: FeatureKind::Numeric })
            .collect();
        features.push(FeatureSpec {
            name: GEOLOGY.to_string(),
            kind: FeatureKind::Categorical { levels: levels.into_iter().map(str::to_string).collect() },
        });
        features
    }

    /// Encode with a schema learned from these observations.
    pub fn from_observations(observations: &[Observation]) -> Self {
        Self::encode(observations, Self::schema(observations))
    }

    /// Encode with an existing schema (a fitted forest's). Rows with any
    /// missing predictor are dropped and counted; a geology category absent
    /// from the schema encodes past the last level.
    pub fn encode(observations: &[Observation], features: Vec<FeatureSpec>) -> Self {
        let levels: &[String] = features
            .iter()
            .find_map(|f| match &f.kind {
                FeatureKind::Categorical { levels } => Some(levels.as_slice()),
                FeatureKind::Numeric => None,
            })
            .unwrap_or(&[]);

        let mut rows = Vec::with_capacity(observations.len());
        let mut labels = Vec::with_capacity(observations.len());
        let mut source = Vec::with_capacity(observations.len());
        for (i, obs) in observations.iter().enumerate() {
            let p = &obs.predictors;
            let (Some(numeric), Some(geology)) = (
                p.numeric().into_iter().collect::<Option<Vec<f64>>>(),
                p.geology.as_deref(),
            ) else {
                continue;
            };
            let level = levels.iter().position(|l| l == geology).unwrap_or(levels.len());
            let mut row = numeric;
            row.push(level as f64);
            rows.push(row);
            labels.push(obs.meso_arch);
            source.push(i);
        }
        let dropped = observations.len() - rows.len();
        if dropped > 0 {
            warn!(dropped, kept = rows.len(), "rows with missing predictors excluded");
        }
        Self { features, rows, labels, source, dropped }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ── Scores ────────────────────────────────────────────────────────────────────

/// Share of exact matches.
pub fn accuracy(predicted: &[bool], actual: &[bool]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    let hits = predicted.iter().zip(actual).filter(|(p, a)| p == a).count();
    hits as f64 / actual.len() as f64
}

/// Area under the ROC curve via the Mann–Whitney U statistic, with tied
/// scores given their average rank:
///   AUC = (R⁺ − n⁺(n⁺ + 1)/2) / (n⁺ · n⁻)
/// where R⁺ is the rank sum of the positives. `None` when a class is absent.
pub fn roc_auc(scores: &[f64], labels: &[bool]) -> Option<f64> {
    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks i+1 ..= j+1 share their mean.
        let mean_rank = (i + j + 2) as f64 / 2.0;
        rank_sum += mean_rank * order[i..=j].iter().filter(|&&k| labels[k]).count() as f64;
        i = j + 1;
    }
    let (np, nn) = (n_pos as f64, n_neg as f64);
    Some((rank_sum - np * (np + 1.0) / 2.0) / (np * nn))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confusion {
    pub true_positive: usize,
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
}

impl Confusion {
    pub fn from_pairs(predicted: &[bool], actual: &[bool]) -> Self {
        let mut c = Self::default();
        for (&p, &a) in predicted.iter().zip(actual) {
            match (a, p) {
                (true, true) => c.true_positive += 1,
                (false, false) => c.true_negative += 1,
                (false, true) => c.false_positive += 1,
                (true, false) => c.false_negative += 1,
            }
        }
        c
    }
}

/// Random partition of `0..n` into `(train, test)` with
/// `round(n × fraction)` training indices. Not stratified.
pub fn train_test_split<R: Rng + ?Sized>(n: usize, fraction: f64, rng: &mut R) -> (Vec<usize>, Vec<usize>) {
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(rng);
    let cut = ((n as f64 * fraction).round() as usize).min(n);
    let test = idx.split_off(cut);
    (idx, test)
}

// ── Training ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Importance {
    pub feature: String,
    pub mean_decrease_gini: f64,
}

/// Everything the trainer reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReport {
    pub seed: u64,
    pub trees: usize,
    pub mtry: usize,
    pub observations: usize,
    pub incomplete_dropped: usize,
    pub balanced_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Exact-match accuracy on the held-out partition.
    pub accuracy: f64,
    /// AUC from the out-of-bag votes of the training fit.
    pub auc: Option<f64>,
    /// AUC from the forest's votes on the held-out partition.
    pub test_auc: Option<f64>,
    pub oob_error: f64,
    pub confusion: Confusion,
    pub importance: Vec<Importance>,
}

pub struct TrainedModel {
    pub forest: RandomForest,
    pub report: ModelReport,
}

/// Drop incomplete rows, balance the classes, split, fit and score.
pub fn train_and_evaluate(observations: &[Observation], config: &ModelConfig, seed: u64) -> Result<TrainedModel> {
    if !(config.train_fraction > 0.0 && config.train_fraction < 1.0) {
        return Err(Error::Config(format!("train fraction {} outside (0, 1)", config.train_fraction)));
    }
    let matrix = FeatureMatrix::from_observations(observations);
    if matrix.is_empty() {
        return Err(Error::EmptyDataset("no observation has a complete predictor set".into()));
    }

    let indices: Vec<usize> = (0..matrix.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed ^ BALANCE_STREAM);
    let balanced = balance_classes(&indices, |&i| matrix.labels[i], config.balance_factor, &mut rng)?;

    let mut rng = StdRng::seed_from_u64(seed ^ SPLIT_STREAM);
    let (train, test) = train_test_split(balanced.len(), config.train_fraction, &mut rng);
    let pick = |part: &[usize]| -> (Vec<Vec<f64>>, Vec<bool>) {
        part.iter()
            .map(|&k| (matrix.rows[balanced[k]].clone(), matrix.labels[balanced[k]]))
            .unzip()
    };
    let (train_x, train_y) = pick(&train);
    let (test_x, test_y) = pick(&test);

    let params = ForestParams { trees: config.trees, mtry: config.mtry, min_node_size: 1 };
    let forest = RandomForest::fit(&train_x, &train_y, matrix.features.clone(), &params, seed ^ FOREST_STREAM)?;

    let (oob_scores, oob_labels): (Vec<f64>, Vec<bool>) = (0..train_y.len())
        .filter_map(|r| forest.oob().fraction(r).map(|f| (f, train_y[r])))
        .unzip();
    let auc = roc_auc(&oob_scores, &oob_labels);

    let test_scores: Vec<f64> = test_x.iter().map(|r| forest.predict_proba(r)).collect();
    let test_pred: Vec<bool> = test_scores.iter().map(|&p| p > 0.5).collect();
    let accuracy = accuracy(&test_pred, &test_y);
    let test_auc = roc_auc(&test_scores, &test_y);
    if test_auc.is_none() {
        warn!(test_rows = test_y.len(), "held-out partition lacks a class; no test AUC");
    }

    let report = ModelReport {
        seed,
        trees: forest.n_trees(),
        mtry: forest.mtry(),
        observations: observations.len(),
        incomplete_dropped: matrix.dropped,
        balanced_rows: balanced.len(),
        train_rows: train_y.len(),
        test_rows: test_y.len(),
        accuracy,
        auc,
        test_auc,
        oob_error: forest.oob().error_rate(&train_y),
        confusion: Confusion::from_pairs(&test_pred, &test_y),
        importance: forest
            .importance()
            .into_iter()
            .map(|(feature, mean_decrease_gini)| Importance { feature, mean_decrease_gini })
            .collect(),
    };
    info!(
        accuracy = report.accuracy,
        auc = ?report.auc,
        test_auc = ?report.test_auc,
        top = report.importance.first().map(|i| i.feature.as_str()).unwrap_or("-"),
        "model evaluated"
    );
    Ok(TrainedModel { forest, report })
}
