//! Pipeline configuration read from a JSON file.
//!
//! Every analysis constant has a serde default equal to the value the
//! survey was calibrated with, so a config only has to name its inputs.
//! Relative paths are resolved against the config file's directory.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::coords::BBox;
use crate::error::{Error, Result};

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_TREES: usize = 500;
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.7;
pub const DEFAULT_BALANCE_FACTOR: usize = 4;
/// Radius of the neighbourhood maximum for mobility and viewshed (metres).
pub const DEFAULT_BUFFER_M: f64 = 1000.0;
/// Cells per side of the containment grid used by the polygon filter.
pub const DEFAULT_FILTER_GRID: usize = 180;
/// Mesolithic window in calibrated years BP.
pub const DEFAULT_OLDEST_BP: f64 = 11_700.0;
pub const DEFAULT_YOUNGEST_BP: f64 = 7_000.0;

fn default_seed() -> u64 { DEFAULT_SEED }
fn default_trees() -> usize { DEFAULT_TREES }
fn default_train_fraction() -> f64 { DEFAULT_TRAIN_FRACTION }
fn default_balance_factor() -> usize { DEFAULT_BALANCE_FACTOR }
fn default_buffer_m() -> f64 { DEFAULT_BUFFER_M }
fn default_filter_grid() -> usize { DEFAULT_FILTER_GRID }
fn default_oldest_bp() -> f64 { DEFAULT_OLDEST_BP }
fn default_youngest_bp() -> f64 { DEFAULT_YOUNGEST_BP }
fn default_geology_field() -> String { "category".to_string() }

// ── Sections ──────────────────────────────────────────────────────────────────

/// Random-forest and sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_trees")]
    pub trees: usize,
    /// Fraction of balanced rows used for fitting; the rest is held out.
    #[serde(default = "default_train_fraction")]
    pub train_fraction: f64,
    /// Each class is resampled to `balance_factor × minority count`.
    #[serde(default = "default_balance_factor")]
    pub balance_factor: usize,
    /// Features tried per split; `floor(sqrt(p))` when absent.
    #[serde(default)]
    pub mtry: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            trees: DEFAULT_TREES,
            train_fraction: DEFAULT_TRAIN_FRACTION,
            balance_factor: DEFAULT_BALANCE_FACTOR,
            mtry: None,
        }
    }
}

/// How point predictors are read from their rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMethod {
    /// Value of the cell containing the point.
    #[default]
    Simple,
    /// Bilinear interpolation between the four nearest cell centres.
    Bilinear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_buffer_m")]
    pub buffer_m: f64,
    #[serde(default)]
    pub method: ExtractMethod,
    #[serde(default = "default_filter_grid")]
    pub filter_grid: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            buffer_m: DEFAULT_BUFFER_M,
            method: ExtractMethod::Simple,
            filter_grid: DEFAULT_FILTER_GRID,
        }
    }
}

/// Calibrated date window; a dated row is kept when its range overlaps it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateWindow {
    #[serde(default = "default_oldest_bp")]
    pub oldest_bp: f64,
    #[serde(default = "default_youngest_bp")]
    pub youngest_bp: f64,
}

impl Default for DateWindow {
    fn default() -> Self {
        Self { oldest_bp: DEFAULT_OLDEST_BP, youngest_bp: DEFAULT_YOUNGEST_BP }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSource {
    /// Delimited radiocarbon site database.
    pub path: PathBuf,
    #[serde(default)]
    pub dates: DateWindow,
    /// Drop dates whose error margin exceeds this (years); keep all when absent.
    #[serde(default)]
    pub max_error: Option<f64>,
    /// Field delimiter; `,` when absent.
    #[serde(default)]
    pub delimiter: Option<char>,
}

/// Predictor inputs for one region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerPaths {
    /// Directory of mobility rasters, summed cell-wise.
    pub mobility_dir: PathBuf,
    /// DEM tiles, mosaicked when more than one.
    pub dem: Vec<PathBuf>,
    /// Slope raster; derived from the DEM when absent.
    #[serde(default)]
    pub slope: Option<PathBuf>,
    pub river_distance: PathBuf,
    pub coast_distance: PathBuf,
    pub viewshed: PathBuf,
    /// Geology polygons (GeoJSON).
    pub geology: PathBuf,
    /// Property holding the geology category.
    #[serde(default = "default_geology_field")]
    pub geology_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub id: String,
    /// Country names accepted from the site database (case-insensitive).
    pub countries: Vec<String>,
    pub bbox: BBox,
    /// Region-of-interest polygon(s), GeoJSON.
    pub boundary: PathBuf,
    /// Cave locations, GeoJSON points.
    pub caves: PathBuf,
    pub layers: LayerPaths,
}

/// Top-level configuration: a training region and a target region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Added to the built-in stopword list.
    #[serde(default)]
    pub stopwords_extra: Vec<String>,
    pub sites: SiteSource,
    pub training: RegionConfig,
    pub target: RegionConfig,
}

impl SurveyConfig {
    /// Read, resolve relative paths and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config: SurveyConfig = serde_json::from_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        resolve(&mut self.sites.path, base);
        for region in [&mut self.training, &mut self.target] {
            resolve(&mut region.boundary, base);
            resolve(&mut region.caves, base);
            let l = &mut region.layers;
            resolve(&mut l.mobility_dir, base);
            for dem in &mut l.dem {
                resolve(dem, base);
            }
            if let Some(slope) = &mut l.slope {
                resolve(slope, base);
            }
            resolve(&mut l.river_distance, base);
            resolve(&mut l.coast_distance, base);
            resolve(&mut l.viewshed, base);
            resolve(&mut l.geology, base);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let m = &self.model;
        if m.trees == 0 {
            return Err(Error::Config("model.trees must be positive".into()));
        }
        if !(m.train_fraction > 0.0 && m.train_fraction < 1.0) {
            return Err(Error::Config(format!(
                "model.train_fraction must lie in (0, 1), got {}",
                m.train_fraction
            )));
        }
        if m.balance_factor == 0 {
            return Err(Error::Config("model.balance_factor must be positive".into()));
        }
        if self.extraction.filter_grid == 0 {
            return Err(Error::Config("extraction.filter_grid must be positive".into()));
        }
        if self.extraction.buffer_m < 0.0 {
            return Err(Error::Config("extraction.buffer_m must not be negative".into()));
        }
        let d = self.sites.dates;
        if d.oldest_bp < d.youngest_bp {
            return Err(Error::Config(format!(
                "date window is inverted: oldest {} < youngest {}",
                d.oldest_bp, d.youngest_bp
            )));
        }
        for region in [&self.training, &self.target] {
            if region.layers.dem.is_empty() {
                return Err(Error::Config(format!("region {}: no DEM configured", region.id)));
            }
            let b = region.bbox;
            if b.min_lat >= b.max_lat || b.min_lon >= b.max_lon {
                return Err(Error::Config(format!("region {}: degenerate bbox", region.id)));
            }
        }
        Ok(())
    }
}

fn resolve(p: &mut PathBuf, base: &Path) {
    if p.is_relative() {
        *p = base.join(&*p);
    }
}
