//! Predictive survey of caves likely to hold Mesolithic archaeology.
//!
//! A random forest is trained on a region where dated sites are known
//! (positives) and unexcavated caves are not (negatives), using terrain,
//! mobility and geology predictors, then applied to another region to rank
//! its caves for survey.

pub mod caves;
pub mod config;
pub mod coords;
pub mod error;
pub mod join;
pub mod logging;
pub mod model;
pub mod names;
pub mod pipeline;
pub mod predict;
pub mod predictors;
pub mod raster;
pub mod sites;
pub mod spatial_filter;
pub mod vector;

pub use config::SurveyConfig;
pub use error::{Error, Result};
pub use names::{canonical_name, join_key, Stopwords};
pub use pipeline::{run, SurveySummary};
