//! Cave inventory loader (open-data point layers).
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::names::{canonical_name, Stopwords};
use crate::sites::dedup_by_canonical;
use crate::vector::{read_features, Feature};

const NAME_KEYS: &[&str] = &["name", "nombre", "nome", "nom", "NAME", "Name"];
const DESCRIPTION_KEYS: &[&str] = &["description", "descripcion", "descrizione", "DESCRIPTION"];

/// A cave location, immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaveRecord {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub description: Option<String>,
    /// The source tags the cave as a historic/archaeological feature.
    pub historic: bool,
    pub canonical: String,
}

/// Read a cave layer, dropping unnamed entries and canonical duplicates.
/// Names whose key comes out empty are kept and share the key "".
pub fn load_caves(path: &Path, stopwords: &Stopwords) -> Result<Vec<CaveRecord>> {
    let features = read_features(path)?;
    let caves = caves_from_features(features, stopwords);
    info!(path = %path.display(), caves = caves.len(), "cave layer loaded");
    Ok(caves)
}

pub fn caves_from_features(features: Vec<Feature>, stopwords: &Stopwords) -> Vec<CaveRecord> {
    let total = features.len();
    let mut no_point = 0usize;
    let mut unnamed = 0usize;
    let mut caves = Vec::with_capacity(total);

    for f in &features {
        let Some(point) = f.point() else {
            no_point += 1;
            continue;
        };
        let Some(name) = f.first_property(NAME_KEYS) else {
            unnamed += 1;
            continue;
        };
        // "Grotta 3" keys to "": such caves collapse into one record below.
        let canonical = canonical_name(&name, stopwords);
        caves.push(CaveRecord {
            name,
            lat: point.y(),
            lon: point.x(),
            description: f.first_property(DESCRIPTION_KEYS),
            historic: is_historic(f),
            canonical,
        });
    }

    if no_point > 0 {
        warn!(no_point, "cave features without point geometry skipped");
    }
    let named = caves.len();
    let caves = dedup_by_canonical(caves, |c| c.canonical.as_str());
    info!(total, unnamed, duplicates = named - caves.len(), "cave names cleaned");
    caves
}

fn is_historic(f: &Feature) -> bool {
    match f.property_str("historic") {
        Some(v) => !matches!(v.to_lowercase().as_str(), "no" | "false" | "0"),
        None => false,
    }
}
