use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the survey pipeline.
///
/// Missing predictor values are not errors; they travel as `None`/NaN and
/// the affected rows are dropped before modelling.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TIFF error in {path}: {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("{0} carries no ModelPixelScale/ModelTiepoint georeference")]
    MissingGeoreference(PathBuf),

    #[error("{path} uses projected CRS {epsg:?}; only lon/lat and UTM rasters are read")]
    UnsupportedCrs { path: PathBuf, epsg: Option<u16> },

    #[error("raster grids differ: {0}")]
    GridMismatch(String),

    #[error("unsupported pixel type in {0}")]
    UnsupportedPixelType(PathBuf),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    #[error("training data holds a single class ({0}); both labels are required")]
    SingleClass(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an `io::Error` with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
