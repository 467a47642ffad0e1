/// Geographic coordinate types and metre/degree conversions.
/// All coordinate math uses f64 for precision.
use serde::{Deserialize, Serialize};

/// Metres per degree of latitude (and of longitude at the equator).
pub const METRES_PER_DEG: f64 = 111_320.0;

/// A point in geographic coordinates (WGS84 degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Equirectangular distance in metres; accurate to well under 1% at the
    /// kilometre scales used for neighbourhood extraction.
    pub fn distance_m(self, other: LatLon) -> f64 {
        let mid_lat = ((self.lat + other.lat) / 2.0).to_radians();
        let dx = (other.lon - self.lon) * METRES_PER_DEG * mid_lat.cos();
        let dy = (other.lat - self.lat) * METRES_PER_DEG;
        dx.hypot(dy)
    }
}

/// Degree extents `(d_lat, d_lon)` covering `metres` around latitude `lat`.
pub fn metres_to_degrees(metres: f64, lat: f64) -> (f64, f64) {
    let d_lat = metres / METRES_PER_DEG;
    let cos = lat.to_radians().cos().abs().max(1e-6);
    (d_lat, metres / (METRES_PER_DEG * cos))
}

/// Axis-aligned lon/lat bounding box, edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self { min_lat, max_lat, min_lon, max_lon }
    }

    #[inline]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    pub fn width_deg(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height_deg(&self) -> f64 {
        self.max_lat - self.min_lat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn one_degree_of_latitude_is_metres_per_deg() {
        let a = LatLon::new(40.0, -3.0);
        let b = LatLon::new(41.0, -3.0);
        assert_relative_eq!(a.distance_m(b), METRES_PER_DEG, max_relative = 1e-9);
    }

    #[test]
    fn longitude_degrees_widen_towards_the_pole() {
        let (d_lat, d_lon_eq) = metres_to_degrees(1000.0, 0.0);
        let (_, d_lon_44) = metres_to_degrees(1000.0, 44.0);
        assert_relative_eq!(d_lat, d_lon_eq, max_relative = 1e-12);
        assert!(d_lon_44 > d_lon_eq);
    }

    #[test]
    fn bbox_edges_are_inclusive() {
        let b = BBox::new(36.0, 44.0, -10.0, 4.0);
        assert!(b.contains(36.0, -10.0));
        assert!(b.contains(44.0, 4.0));
        assert!(!b.contains(44.01, 0.0));
    }
}
