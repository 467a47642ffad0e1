//! Predictor layers and per-point extraction.
//!
//! Every observation gets seven predictors. Mobility and viewshed are the
//! maximum within a buffer around the point (a cave on the flank of a
//! corridor still "sees" the corridor); the other rasters are sampled at the
//! point itself; geology comes from a polygon overlay.
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ExtractMethod, ExtractionConfig, LayerPaths};
use crate::error::Result;
use crate::join::Observation;
use crate::raster::{read_geotiff, read_raster_dir, slope_degrees, Raster};
use crate::vector::PolygonLayer;

/// Names of the numeric predictors, in feature-matrix column order.
pub const NUMERIC_PREDICTORS: [&str; 6] = [
    "elevation",
    "slope",
    "mobility",
    "river_distance",
    "coast_distance",
    "viewshed",
];
pub const GEOLOGY: &str = "geology";

/// Predictor values at one location. `None` marks a value that could not be
/// extracted (outside a raster or on nodata).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictorValues {
    pub elevation: Option<f64>,
    pub slope: Option<f64>,
    pub mobility: Option<f64>,
    pub river_distance: Option<f64>,
    pub coast_distance: Option<f64>,
    pub viewshed: Option<f64>,
    pub geology: Option<String>,
}

impl PredictorValues {
    /// Numeric values in `NUMERIC_PREDICTORS` order.
    pub fn numeric(&self) -> [Option<f64>; 6] {
        [
            self.elevation,
            self.slope,
            self.mobility,
            self.river_distance,
            self.coast_distance,
            self.viewshed,
        ]
    }

    pub fn is_complete(&self) -> bool {
        self.numeric().iter().all(Option::is_some) && self.geology.is_some()
    }
}

/// The rasters and overlay of one region.
pub struct PredictorLayers {
    pub mobility: Raster,
    pub elevation: Raster,
    pub slope: Raster,
    pub river_distance: Raster,
    pub coast_distance: Raster,
    pub viewshed: Raster,
    pub geology: PolygonLayer,
    pub buffer_m: f64,
    pub method: ExtractMethod,
}

impl PredictorLayers {
    /// Load a region's layers. The mobility surface is the sum of every
    /// raster in its directory; DEM tiles are mosaicked; slope is derived
    /// from the DEM when no slope raster is configured.
    pub fn load(paths: &LayerPaths, extraction: &ExtractionConfig) -> Result<Self> {
        let mobility = read_raster_dir(&paths.mobility_dir)?;

        let tiles = paths.dem.iter().map(|p| read_geotiff(p)).collect::<Result<Vec<_>>>()?;
        let elevation = Raster::mosaic(&tiles)?;

        let slope = match &paths.slope {
            Some(p) => read_geotiff(p)?,
            None => {
                debug!(tiles = tiles.len(), "deriving slope from DEM");
                slope_degrees(&elevation)
            }
        };

        let layers = Self {
            mobility,
            elevation,
            slope,
            river_distance: read_geotiff(&paths.river_distance)?,
            coast_distance: read_geotiff(&paths.coast_distance)?,
            viewshed: read_geotiff(&paths.viewshed)?,
            geology: PolygonLayer::read(&paths.geology, &paths.geology_field)?,
            buffer_m: extraction.buffer_m,
            method: extraction.method,
        };
        info!(
            dem = %format!("{}x{}", layers.elevation.width, layers.elevation.height),
            geology_zones = layers.geology.len(),
            buffer_m = layers.buffer_m,
            "predictor layers loaded"
        );
        Ok(layers)
    }

    fn sample(&self, raster: &Raster, lon: f64, lat: f64) -> Option<f64> {
        let v = match self.method {
            ExtractMethod::Simple => raster.cell_value(lon, lat),
            ExtractMethod::Bilinear => raster.sample_bilinear(lon, lat),
        };
        v.map(f64::from)
    }

    /// All predictors at one point.
    pub fn extract(&self, lat: f64, lon: f64) -> PredictorValues {
        PredictorValues {
            elevation: self.sample(&self.elevation, lon, lat),
            slope: self.sample(&self.slope, lon, lat),
            mobility: self.mobility.max_within_radius(lon, lat, self.buffer_m).map(f64::from),
            river_distance: self.sample(&self.river_distance, lon, lat),
            coast_distance: self.sample(&self.coast_distance, lon, lat),
            viewshed: self.viewshed.max_within_radius(lon, lat, self.buffer_m).map(f64::from),
            geology: self.geology.category_at(lon, lat).map(str::to_string),
        }
    }
}

/// Fill the predictors of every observation in place.
pub fn attach_predictors(observations: &mut [Observation], layers: &PredictorLayers) {
    for obs in observations.iter_mut() {
        obs.predictors = layers.extract(obs.lat, obs.lon);
    }
    let incomplete = observations.iter().filter(|o| !o.predictors.is_complete()).count();
    info!(rows = observations.len(), incomplete, "predictors attached");
}
