//! Presence labelling: sites are positives, caves without a matching site
//! are negatives.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::caves::CaveRecord;
use crate::names::join_key;
use crate::predictors::PredictorValues;
use crate::sites::{dedup_by_canonical, SiteRecord};

/// One labelled location: the row unit fed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub canonical: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Known Mesolithic archaeology at this location.
    pub meso_arch: bool,
    #[serde(default)]
    pub predictors: PredictorValues,
}

impl Observation {
    pub fn from_site(site: &SiteRecord) -> Self {
        Self {
            canonical: site.canonical.clone(),
            name: site.name.clone(),
            lat: site.lat,
            lon: site.lon,
            meso_arch: true,
            predictors: PredictorValues::default(),
        }
    }

    pub fn from_cave(cave: &CaveRecord) -> Self {
        Self {
            canonical: cave.canonical.clone(),
            name: cave.name.clone(),
            lat: cave.lat,
            lon: cave.lon,
            meso_arch: false,
            predictors: PredictorValues::default(),
        }
    }
}

/// Every site becomes a positive. A cave becomes a negative when its
/// canonical key matches no site key (compared through `join_key`);
/// negatives are deduplicated by key
/// with the first one kept. Site coordinates are used for positives even
/// when a matching cave exists.
pub fn label_observations(sites: &[SiteRecord], caves: &[CaveRecord]) -> Vec<Observation> {
    let site_keys: HashSet<String> = sites.iter().map(|s| join_key(&s.canonical)).collect();

    let unmatched: Vec<&CaveRecord> = caves
        .iter()
        .filter(|c| !site_keys.contains(&join_key(&c.canonical)))
        .collect();
    let matched = caves.len() - unmatched.len();
    let negatives = dedup_by_canonical(unmatched, |c| c.canonical.as_str());

    let mut rows: Vec<Observation> = sites.iter().map(Observation::from_site).collect();
    rows.extend(negatives.into_iter().map(Observation::from_cave));

    info!(
        positives = sites.len(),
        negatives = rows.len() - sites.len(),
        caves_matching_sites = matched,
        "observations labelled"
    );
    rows
}
