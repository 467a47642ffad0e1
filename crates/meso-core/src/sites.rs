//! Radiocarbon site database loader.
//!
//! One row per date; a site usually carries several. Rows are filtered by
//! date window, country, bounding box and (optionally) error margin, then
//! collapsed to one record per coordinate pair and per canonical name.
use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{DateWindow, RegionConfig, SiteSource};
use crate::coords::BBox;
use crate::error::{Error, Result};
use crate::names::{canonical_name, join_key, Stopwords};

/// A dated archaeological site, immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub country: String,
    /// Older bound of the calibrated range (years BP).
    pub cal_bp_old: f64,
    /// Younger bound of the calibrated range (years BP).
    pub cal_bp_young: f64,
    pub error: Option<f64>,
    pub canonical: String,
}

/// Row filter applied while reading the database.
#[derive(Debug, Clone)]
pub struct SiteFilter {
    pub dates: DateWindow,
    /// Lower-cased country names.
    pub countries: Vec<String>,
    pub bbox: BBox,
    pub max_error: Option<f64>,
}

impl SiteFilter {
    pub fn for_region(source: &SiteSource, region: &RegionConfig) -> Self {
        Self {
            dates: source.dates,
            countries: region.countries.iter().map(|c| c.trim().to_lowercase()).collect(),
            bbox: region.bbox,
            max_error: source.max_error,
        }
    }

    fn accepts(&self, row: &SiteRecord) -> bool {
        let overlaps =
            row.cal_bp_old >= self.dates.youngest_bp && row.cal_bp_young <= self.dates.oldest_bp;
        let country_ok = self.countries.is_empty()
            || self.countries.iter().any(|c| *c == row.country.trim().to_lowercase());
        let error_ok = match (self.max_error, row.error) {
            (Some(max), Some(err)) => err <= max,
            _ => true,
        };
        overlaps && country_ok && error_ok && self.bbox.contains(row.lat, row.lon)
    }
}

// ── CSV schema ────────────────────────────────────────────────────────────────

/// Raw database row. Column names vary between exports, hence the aliases.
/// Unparseable numbers (`NA`, `?`) read as missing.
#[derive(Debug, Deserialize)]
struct SiteRow {
    #[serde(alias = "SiteName", alias = "site_name", alias = "Site", alias = "site")]
    name: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    #[serde(alias = "Latitude", alias = "lat", alias = "LAT")]
    latitude: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    #[serde(alias = "Longitude", alias = "lon", alias = "long", alias = "LONG")]
    longitude: Option<f64>,
    #[serde(alias = "Country")]
    country: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    #[serde(alias = "CalBP_from", alias = "cal_from", alias = "CalStart", alias = "From")]
    cal_bp_old: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    #[serde(alias = "CalBP_to", alias = "cal_to", alias = "CalEnd", alias = "To")]
    cal_bp_young: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    #[serde(alias = "Error", alias = "err", alias = "StdDev", alias = "SD")]
    error: Option<f64>,
}

impl SiteRow {
    /// `None` when the row lacks a name, coordinates or any date bound.
    fn into_record(self, stopwords: &Stopwords) -> Option<SiteRecord> {
        let name = self.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
        let lat = self.latitude?;
        let lon = self.longitude?;
        // A single bound stands for both ends.
        let (old, young) = match (self.cal_bp_old, self.cal_bp_young) {
            (Some(a), Some(b)) => (a.max(b), a.min(b)),
            (Some(a), None) | (None, Some(a)) => (a, a),
            (None, None) => return None,
        };
        let canonical = canonical_name(&name, stopwords);
        Some(SiteRecord {
            name,
            lat,
            lon,
            country: self.country.unwrap_or_default().trim().to_string(),
            cal_bp_old: old,
            cal_bp_young: young,
            error: self.error,
            canonical,
        })
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Read and filter the site database, then deduplicate.
pub fn load_sites(
    path: &Path,
    delimiter: Option<char>,
    filter: &SiteFilter,
    stopwords: &Stopwords,
) -> Result<Vec<SiteRecord>> {
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    read_sites(file, delimiter, filter, stopwords)
}

/// Same as `load_sites` over any reader.
pub fn read_sites<R: std::io::Read>(
    reader: R,
    delimiter: Option<char>,
    filter: &SiteFilter,
    stopwords: &Stopwords,
) -> Result<Vec<SiteRecord>> {
    let delim = delimiter.unwrap_or(',');
    if !delim.is_ascii() {
        return Err(Error::Config(format!("delimiter {delim:?} is not ASCII")));
    }
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delim as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut total = 0usize;
    let mut incomplete = 0usize;
    let mut kept = Vec::new();
    for row in rdr.deserialize::<SiteRow>() {
        let row = row?;
        total += 1;
        let Some(record) = row.into_record(stopwords) else {
            incomplete += 1;
            continue;
        };
        if filter.accepts(&record) {
            kept.push(record);
        }
    }
    debug!(total, incomplete, matched = kept.len(), "site rows read");

    let by_coords = dedup_by_coordinates(kept);
    let by_coords_len = by_coords.len();
    let sites = dedup_by_canonical(by_coords, |s| s.canonical.as_str());
    info!(
        rows = total,
        unique_coordinates = by_coords_len,
        sites = sites.len(),
        "site database filtered"
    );
    Ok(sites)
}

/// Keep the first row at each exact coordinate pair.
pub fn dedup_by_coordinates(rows: Vec<SiteRecord>) -> Vec<SiteRecord> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|r| seen.insert((r.lat.to_bits(), r.lon.to_bits())))
        .collect()
}

/// Keep the first item for each canonical key, comparing keys through
/// `join_key`. Never grows the input and never emits a key twice.
pub fn dedup_by_canonical<T, F>(items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let mut seen: HashSet<String> = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(join_key(key(item))))
        .collect()
}

/// Write a cleaned site table.
pub fn write_sites(path: &Path, sites: &[SiteRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for s in sites {
        wtr.serialize(s)?;
    }
    wtr.flush().map_err(|e| Error::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DB: &str = "\
SiteName,Latitude,Longitude,Country,CalBP_from,CalBP_to,Error,Lab
Cova de l'Or,38.83,-0.37,Spain,8200,7900,40,Beta-1
Cova de l'Or,38.83,-0.37,Spain,8400,8100,35,Beta-2
Cueva de Santimamiñe,43.35,-2.64,Spain,9600,9300,60,GrN-1
Santimamiñe,43.36,-2.65,Spain,9500,9200,80,GrN-2
El Mirón,43.25,-3.45,Spain,20000,19500,90,GX-1
Arene Candide,44.16,8.33,Italy,9000,8700,50,R-1
Cueva del Norte,44.5,-3.0,Spain,8000,7800,50,X-1
Abric,41.0,1.0,Spain,,,,
Nameless,,,Spain,8000,7900,30,X-2
";

    fn spain() -> SiteFilter {
        SiteFilter {
            dates: DateWindow::default(),
            countries: vec!["spain".into()],
            bbox: BBox::new(35.9, 43.9, -9.5, 3.4),
            max_error: None,
        }
    }

    #[test]
    fn filters_dates_country_and_bbox_then_dedups() {
        let sites = read_sites(DB.as_bytes(), None, &spain(), &Stopwords::default()).unwrap();
        let names: Vec<&str> = sites.iter().map(|s| s.name.as_str()).collect();
        // El Mirón is too old, Arene Candide is Italian, Cueva del Norte lies
        // north of the bbox, the two undated/uncoordinated rows are dropped,
        // the second Or date shares coordinates and the second Santimamiñe
        // row shares the canonical name "Santimamine".
        assert_eq!(names, vec!["Cova de l'Or", "Cueva de Santimamiñe"]);
        assert_eq!(sites[1].canonical, "Santimamine");
        assert_eq!(sites[0].cal_bp_old, 8200.0);
    }

    #[test]
    fn max_error_drops_imprecise_dates() {
        let mut f = spain();
        f.max_error = Some(50.0);
        let sites = read_sites(DB.as_bytes(), None, &f, &Stopwords::default()).unwrap();
        // Both Santimamiñe rows (60 and 80 years) go.
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].canonical, "Or");
    }

    #[test]
    fn dedup_by_canonical_never_grows_or_repeats() {
        let items = vec!["Orso", "Orso", "Mochi", "", "", "Orso"];
        let out = dedup_by_canonical(items.clone(), |s| *s);
        assert!(out.len() <= items.len());
        let unique: HashSet<_> = out.iter().collect();
        assert_eq!(unique.len(), out.len());
        assert_eq!(out, vec!["Orso", "Mochi", ""]);

        let cased = dedup_by_canonical(vec!["DeLuca", "Deluca"], |s| *s);
        assert_eq!(cased, vec!["DeLuca"]);
    }

    #[test]
    fn unparseable_numbers_count_as_missing() {
        let db = "\
SiteName,Latitude,Longitude,Country,CalBP_from,CalBP_to,Error
Cova de l'Or,38.83,-0.37,Spain,8200,7900,NA
Cueva de Santimamiñe,NA,-2.64,Spain,9600,9300,60
Cova Fosca,40.2,0.1,Spain,NA,8700,50
";
        let sites = read_sites(db.as_bytes(), None, &spain(), &Stopwords::default()).unwrap();
        let names: Vec<&str> = sites.iter().map(|s| s.name.as_str()).collect();
        // No latitude drops the second row; a single date bound stands for both.
        assert_eq!(names, vec!["Cova de l'Or", "Cova Fosca"]);
        assert_eq!(sites[0].error, None);
        assert_eq!((sites[1].cal_bp_old, sites[1].cal_bp_young), (8700.0, 8700.0));
    }

    #[test]
    fn semicolon_delimited_exports_are_read() {
        let db = "site;lat;lon;Country;From;To\nArene Candide;44.16;8.33;Italy;9000;8700\n";
        let f = SiteFilter {
            dates: DateWindow::default(),
            countries: vec!["italy".into()],
            bbox: BBox::new(43.7, 44.7, 7.4, 10.1),
            max_error: None,
        };
        let sites = read_sites(db.as_bytes(), Some(';'), &f, &Stopwords::default()).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].canonical, "AreneCandide");
        assert_eq!(sites[0].error, None);
    }

    #[test]
    fn cleaned_table_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.csv");
        let sites = read_sites(DB.as_bytes(), None, &spain(), &Stopwords::default()).unwrap();
        write_sites(&path, &sites).unwrap();
        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let back: Vec<SiteRecord> = rdr.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(back, sites);
    }
}
