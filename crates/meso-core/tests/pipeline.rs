//! End-to-end run over synthetic regions.
//!
//! Each region is a 0.2° square split into 20×20 rasters. Elevation, slope
//! and the mobility stack rise eastwards and geology changes at the meridian
//! through the middle, so known sites (all in the east) are perfectly separable from
//! the caves of the training region (all in the west).
use std::fs;
use std::path::Path;

use serde_json::{json, Value};

use meso_core::coords::BBox;
use meso_core::model::RandomForest;
use meso_core::raster::{write_geotiff, Raster};
use meso_core::{run, SurveyConfig};

const CELLS: usize = 20;
const SIZE: f64 = 0.2;

fn raster(min_lat: f64, min_lon: f64, value: impl Fn(usize, usize) -> f32) -> Raster {
    let bbox = BBox::new(min_lat, min_lat + SIZE, min_lon, min_lon + SIZE);
    let mut r = Raster::new(CELLS, CELLS, bbox, 0.0);
    for row in 0..CELLS {
        for col in 0..CELLS {
            r.set(row, col, value(row, col));
        }
    }
    r
}

fn square(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Value {
    json!([[[min_lon, min_lat], [max_lon, min_lat], [max_lon, max_lat], [min_lon, max_lat], [min_lon, min_lat]]])
}

fn point(name: &str, lat: f64, lon: f64) -> Value {
    json!({
        "type": "Feature",
        "properties": { "name": name },
        "geometry": { "type": "Point", "coordinates": [lon, lat] }
    })
}

fn write_json(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_string(value).unwrap()).unwrap();
}

/// Rasters, boundary and geology of one region under `dir/id`.
fn write_region(dir: &Path, id: &str, min_lat: f64, min_lon: f64, caves: &[Value]) -> Value {
    let root = dir.join(id);
    fs::create_dir_all(root.join("mobility")).unwrap();

    let save = |name: &str, r: Raster| write_geotiff(&r, &root.join(name)).unwrap();
    // Gentle western half, steep eastern half.
    save("dem.tif", raster(min_lat, min_lon, |_, c| {
        if c < 10 { 100.0 + 10.0 * c as f32 } else { 200.0 + 60.0 * (c - 10) as f32 }
    }));
    save("mobility/lcp_a.tif", raster(min_lat, min_lon, |_, c| c as f32));
    save("mobility/lcp_b.tif", raster(min_lat, min_lon, |_, c| 2.0 * c as f32));
    save("rivers.tif", raster(min_lat, min_lon, |r, _| 200.0 + r as f32));
    save("coast.tif", raster(min_lat, min_lon, |_, _| 5000.0));
    save("viewshed.tif", raster(min_lat, min_lon, |_, _| 4.0));

    let (max_lat, max_lon, mid_lon) = (min_lat + SIZE, min_lon + SIZE, min_lon + SIZE / 2.0);
    write_json(
        &root.join("boundary.geojson"),
        &json!({ "type": "Polygon", "coordinates": square(min_lat, min_lon, max_lat, max_lon) }),
    );
    write_json(
        &root.join("geology.geojson"),
        &json!({ "type": "FeatureCollection", "features": [
            { "type": "Feature", "properties": { "category": "limestone" },
              "geometry": { "type": "Polygon", "coordinates": square(min_lat, min_lon, max_lat, mid_lon) } },
            { "type": "Feature", "properties": { "category": "flysch" },
              "geometry": { "type": "Polygon", "coordinates": square(min_lat, mid_lon, max_lat, max_lon) } }
        ]}),
    );
    write_json(&root.join("caves.geojson"), &json!({ "type": "FeatureCollection", "features": caves }));

    json!({
        "mobility_dir": format!("{id}/mobility"),
        "dem": [format!("{id}/dem.tif")],
        "river_distance": format!("{id}/rivers.tif"),
        "coast_distance": format!("{id}/coast.tif"),
        "viewshed": format!("{id}/viewshed.tif"),
        "geology": format!("{id}/geology.geojson")
    })
}

const SITES: [&str; 8] =
    ["Arenaza", "Bolinkoba", "Cobrante", "Ekain", "Isturitz", "Juyo", "Kobeaga", "Laminak"];

fn training_caves() -> Vec<Value> {
    let mut caves = Vec::new();
    let heads = ["Bar", "Cor", "Dum", "Fal", "Gor"];
    let tails = ["ana", "eto", "ula", "iri"];
    for (i, h) in heads.iter().enumerate() {
        for (j, t) in tails.iter().enumerate() {
            let lat = 10.03 + 0.03 * i as f64;
            let lon = 20.025 + 0.01 * j as f64;
            caves.push(point(&format!("Grotta {h}{t}"), lat, lon));
        }
    }
    // Same place as a site: joins away.
    caves.push(point("Cueva de Ekain", 10.07, 20.045));
    // Duplicate canonical key: dropped by the loader.
    caves.push(point("GROTTA BARANA", 10.09, 20.055));
    // Outside the boundary polygon.
    caves.push(point("Cueva Lejana", 10.1, 20.5));
    caves
}

fn target_caves() -> Vec<Value> {
    vec![
        point("Arma Ovest", 30.05, 40.035),
        point("Tana Ponente", 30.10, 40.045),
        point("Buca Occaso", 30.15, 40.055),
        point("Arma Levante", 30.05, 40.165),
        point("Tana Oriente", 30.10, 40.175),
        point("Buca Alba", 30.15, 40.155),
    ]
}

fn write_sites(dir: &Path) {
    let mut csv = String::from("name,latitude,longitude,country,cal_bp_old,cal_bp_young,error\n");
    for (i, name) in SITES.iter().enumerate() {
        let lat = 10.04 + 0.015 * i as f64;
        let lon = 20.155 + 0.003 * i as f64;
        csv.push_str(&format!("Cueva de {name},{lat},{lon},Spain,9500,8800,60\n"));
    }
    // Wrong country, too old, repeated coordinates.
    csv.push_str("Grotte Lointaine,10.1,20.16,France,9000,8500,50\n");
    csv.push_str("Cueva del Pendo,10.12,20.17,Spain,20000,18000,200\n");
    csv.push_str("Arenaza bis,10.04,20.155,Spain,9100,8900,40\n");
    fs::write(dir.join("sites.csv"), csv).unwrap();
}

#[test]
fn survey_trains_predicts_and_writes_outputs() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    write_sites(dir);
    let alpha_layers = write_region(dir, "alpha", 10.0, 20.0, &training_caves());
    let beta_layers = write_region(dir, "beta", 30.0, 40.0, &target_caves());

    let config = json!({
        "seed": 11,
        "model": { "trees": 50 },
        "sites": { "path": "sites.csv" },
        "training": {
            "id": "alpha",
            "countries": ["Spain"],
            "bbox": { "min_lat": 10.0, "max_lat": 10.2, "min_lon": 20.0, "max_lon": 20.2 },
            "boundary": "alpha/boundary.geojson",
            "caves": "alpha/caves.geojson",
            "layers": alpha_layers
        },
        "target": {
            "id": "beta",
            "countries": ["Italy"],
            "bbox": { "min_lat": 30.0, "max_lat": 30.2, "min_lon": 40.0, "max_lon": 40.2 },
            "boundary": "beta/boundary.geojson",
            "caves": "beta/caves.geojson",
            "layers": beta_layers
        }
    });
    let config_path = dir.join("survey.json");
    write_json(&config_path, &config);
    let config = SurveyConfig::load(&config_path).unwrap();

    let out = dir.join("out");
    let summary = run(&config, &out).unwrap();

    let t = &summary.training;
    assert_eq!(t.sites, 8);
    assert_eq!(t.caves, 21);
    assert_eq!(t.observations, 8 + 20);
    assert_eq!(t.predicted, 28);

    let r = &summary.report;
    assert_eq!(r.balanced_rows, 2 * 4 * 8);
    assert_eq!(r.incomplete_dropped, 0);
    assert!(r.accuracy > 0.9, "accuracy {}", r.accuracy);
    assert!(r.auc.unwrap() > 0.9);

    let b = &summary.target;
    assert_eq!((b.sites, b.caves, b.predicted), (0, 6, 6));
    assert_eq!(b.survey_candidates, 3);

    for name in [
        "sites_alpha.csv",
        "sites_beta.csv",
        "slope_alpha.tif",
        "slope_beta.tif",
        "model.json",
        "model_report.json",
        "predictions_alpha.csv",
        "predictions_beta.csv",
    ] {
        assert!(out.join(name).is_file(), "{name} missing");
    }

    let forest = RandomForest::from_json(&fs::read_to_string(out.join("model.json")).unwrap()).unwrap();
    assert_eq!(forest.n_trees(), 50);

    let beta = fs::read_to_string(out.join("predictions_beta.csv")).unwrap();
    let candidates: Vec<&str> = beta
        .lines()
        .filter(|l| l.ends_with("false_positive"))
        .filter_map(|l| l.split(',').next())
        .collect();
    assert_eq!(candidates, vec!["Arma Levante", "Tana Oriente", "Buca Alba"]);
}

#[test]
fn a_region_without_sites_cannot_train() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("sites.csv"), "name,latitude,longitude,country,cal_bp_old,cal_bp_young\n").unwrap();
    let layers = write_region(dir, "alpha", 10.0, 20.0, &training_caves());
    let region = json!({
        "id": "alpha",
        "countries": ["Spain"],
        "bbox": { "min_lat": 10.0, "max_lat": 10.2, "min_lon": 20.0, "max_lon": 20.2 },
        "boundary": "alpha/boundary.geojson",
        "caves": "alpha/caves.geojson",
        "layers": layers
    });
    let mut target = region.clone();
    target["id"] = json!("alpha_again");
    let config_path = dir.join("survey.json");
    write_json(
        &config_path,
        &json!({ "model": { "trees": 5 }, "sites": { "path": "sites.csv" }, "training": region, "target": target }),
    );
    let config = SurveyConfig::load(&config_path).unwrap();
    let err = run(&config, &dir.join("out")).unwrap_err();
    assert!(matches!(err, meso_core::Error::SingleClass(_)), "{err}");
}
