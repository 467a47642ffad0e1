//! GeoJSON vector layers: cave points, region boundaries, geology polygons.
//!
//! Parsed with `serde_json` into `geo` geometries. Only the geometry types
//! the survey uses are accepted: Point, MultiPoint, Polygon, MultiPolygon
//! (GeometryCollections are flattened).
use std::fs;
use std::path::Path;

use geo::{BoundingRect, Contains, Coord, Geometry, LineString, MultiPoint, MultiPolygon, Point, Polygon, Rect};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A feature: optional geometry plus its property object.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Property as text. Numbers and booleans are rendered; null and
    /// blank strings count as absent.
    pub fn property_str(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// First of `keys` present on the feature.
    pub fn first_property(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.property_str(k))
    }

    /// A representative point: the point itself, or the first of a MultiPoint.
    pub fn point(&self) -> Option<Point<f64>> {
        match self.geometry.as_ref()? {
            Geometry::Point(p) => Some(*p),
            Geometry::MultiPoint(mp) => mp.0.first().copied(),
            _ => None,
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

pub fn read_features(path: &Path) -> Result<Vec<Feature>> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let features = parse_features(&text)?;
    debug!(path = %path.display(), features = features.len(), "vector layer read");
    Ok(features)
}

/// Parse a FeatureCollection, a single Feature or a bare geometry.
pub fn parse_features(text: &str) -> Result<Vec<Feature>> {
    let root: Value = serde_json::from_str(text)?;
    match root.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => root
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::InvalidGeometry("FeatureCollection without features".into()))?
            .iter()
            .map(parse_feature)
            .collect(),
        Some("Feature") => Ok(vec![parse_feature(&root)?]),
        Some(_) => Ok(vec![Feature { geometry: Some(parse_geometry(&root)?), properties: Map::new() }]),
        None => Err(Error::InvalidGeometry("GeoJSON object without a type".into())),
    }
}

fn parse_feature(v: &Value) -> Result<Feature> {
    let geometry = match v.get("geometry") {
        None | Some(Value::Null) => None,
        Some(g) => Some(parse_geometry(g)?),
    };
    let properties = v.get("properties").and_then(Value::as_object).cloned().unwrap_or_default();
    Ok(Feature { geometry, properties })
}

fn parse_geometry(g: &Value) -> Result<Geometry<f64>> {
    let kind = g
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidGeometry("geometry without a type".into()))?;
    if kind == "GeometryCollection" {
        let parts = g
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::InvalidGeometry("GeometryCollection without geometries".into()))?;
        let geoms = parts.iter().map(parse_geometry).collect::<Result<Vec<_>>>()?;
        return Ok(Geometry::GeometryCollection(geo::GeometryCollection(geoms)));
    }
    let coords = g
        .get("coordinates")
        .ok_or_else(|| Error::InvalidGeometry(format!("{kind} without coordinates")))?;
    match kind {
        "Point" => Ok(Geometry::Point(Point::from(coord(coords)?))),
        "MultiPoint" => {
            let pts = array(coords)?.iter().map(|c| coord(c).map(Point::from)).collect::<Result<Vec<_>>>()?;
            Ok(Geometry::MultiPoint(MultiPoint::new(pts)))
        }
        "Polygon" => Ok(Geometry::Polygon(polygon(coords)?)),
        "MultiPolygon" => {
            let polys = array(coords)?.iter().map(polygon).collect::<Result<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(MultiPolygon::new(polys)))
        }
        other => Err(Error::InvalidGeometry(format!("unsupported geometry type {other}"))),
    }
}

fn array(v: &Value) -> Result<&Vec<Value>> {
    v.as_array().ok_or_else(|| Error::InvalidGeometry(format!("expected array, got {v}")))
}

fn coord(v: &Value) -> Result<Coord<f64>> {
    let a = array(v)?;
    match (a.first().and_then(Value::as_f64), a.get(1).and_then(Value::as_f64)) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(Error::InvalidGeometry(format!("bad position {v}"))),
    }
}

fn ring(v: &Value) -> Result<LineString<f64>> {
    let coords = array(v)?.iter().map(coord).collect::<Result<Vec<_>>>()?;
    if coords.len() < 3 {
        return Err(Error::InvalidGeometry(format!("ring with {} positions", coords.len())));
    }
    // `Polygon::new` closes open rings.
    Ok(LineString::new(coords))
}

fn polygon(v: &Value) -> Result<Polygon<f64>> {
    let rings = array(v)?;
    let (exterior, holes) = rings
        .split_first()
        .ok_or_else(|| Error::InvalidGeometry("polygon without rings".into()))?;
    let interiors = holes.iter().map(ring).collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(ring(exterior)?, interiors))
}

// ── Polygon helpers ───────────────────────────────────────────────────────────

/// Every polygon in a set of geometries, flattening multi-parts and collections.
pub fn collect_polygons(geometry: &Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(p) => out.push(p.clone()),
        Geometry::MultiPolygon(mp) => out.extend(mp.0.iter().cloned()),
        Geometry::GeometryCollection(gc) => {
            for g in gc.iter() {
                collect_polygons(g, out);
            }
        }
        _ => {}
    }
}

/// All polygons of a boundary file.
pub fn read_polygons(path: &Path) -> Result<Vec<Polygon<f64>>> {
    let mut polys = Vec::new();
    for f in read_features(path)? {
        if let Some(g) = &f.geometry {
            collect_polygons(g, &mut polys);
        }
    }
    if polys.is_empty() {
        return Err(Error::InvalidGeometry(format!("{} holds no polygons", path.display())));
    }
    Ok(polys)
}

// ── Categorical polygon layer ─────────────────────────────────────────────────

struct Zone {
    shape: MultiPolygon<f64>,
    bounds: Rect<f64>,
    category: String,
}

/// Polygons tagged with a category (geology), queried by point overlay.
pub struct PolygonLayer {
    zones: Vec<Zone>,
}

impl PolygonLayer {
    /// Build from features, reading the category from `field`. Features
    /// without polygons or without the field are skipped.
    pub fn from_features(features: Vec<Feature>, field: &str) -> Self {
        let mut zones = Vec::new();
        let mut skipped = 0usize;
        for f in features {
            let (Some(geometry), Some(category)) = (f.geometry.as_ref(), f.property_str(field)) else {
                skipped += 1;
                continue;
            };
            let mut polys = Vec::new();
            collect_polygons(geometry, &mut polys);
            let shape = MultiPolygon::new(polys);
            let Some(bounds) = shape.bounding_rect() else {
                skipped += 1;
                continue;
            };
            zones.push(Zone { shape, bounds, category });
        }
        if skipped > 0 {
            warn!(skipped, field, "polygon features without geometry or category");
        }
        Self { zones }
    }

    pub fn read(path: &Path, field: &str) -> Result<Self> {
        let layer = Self::from_features(read_features(path)?, field);
        if layer.zones.is_empty() {
            return Err(Error::InvalidGeometry(format!(
                "{} holds no polygons with a {field:?} property",
                path.display()
            )));
        }
        Ok(layer)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Category of the first polygon enclosing the point.
    pub fn category_at(&self, lon: f64, lat: f64) -> Option<&str> {
        let p = Point::new(lon, lat);
        self.zones
            .iter()
            .filter(|z| {
                let (min, max) = (z.bounds.min(), z.bounds.max());
                lon >= min.x && lon <= max.x && lat >= min.y && lat <= max.y
            })
            .find(|z| z.shape.contains(&p))
            .map(|z| z.category.as_str())
    }
}
