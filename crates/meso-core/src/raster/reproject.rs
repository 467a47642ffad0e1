//! Warping projected rasters onto a geographic (lon/lat) grid.
//!
//! Supports transverse-Mercator UTM zones on WGS84 (EPSG 326xx/327xx) and
//! ETRS89 (EPSG 25828–25838, GRS80 treated as WGS84). Forward and inverse
//! formulas follow Snyder 1987, USGS Professional Paper 1395, pp. 61-64.
use crate::coords::{BBox, METRES_PER_DEG};

use super::grid::Raster;

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A UTM zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Utm {
    pub zone: u32,
    pub north: bool,
}

impl Utm {
    /// Zone of a projected EPSG code; `None` for anything but UTM.
    pub fn from_epsg(epsg: u32) -> Option<Self> {
        match epsg {
            32601..=32660 => Some(Self { zone: epsg - 32600, north: true }),
            32701..=32760 => Some(Self { zone: epsg - 32700, north: false }),
            25828..=25838 => Some(Self { zone: epsg - 25800, north: true }),
            _ => None,
        }
    }

    fn central_meridian(self) -> f64 {
        ((self.zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
    }

    /// Degrees `(lon, lat)` to metres `(easting, northing)`.
    pub fn forward(self, lon: f64, lat: f64) -> (f64, f64) {
        let phi = lat.to_radians();
        let (sin, cos, tan) = (phi.sin(), phi.cos(), phi.tan());

        let n = A / (1.0 - E2 * sin * sin).sqrt();
        let t = tan * tan;
        let c = E_PRIME2 * cos * cos;
        let a = cos * (lon.to_radians() - self.central_meridian());
        let a2 = a * a;
        let (a3, a4) = (a2 * a, a2 * a2);
        let (a5, a6) = (a4 * a, a4 * a2);

        let easting = K0 * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a5 / 120.0)
            + FALSE_EASTING;
        let northing = K0
            * (meridional_arc(phi)
                + n * tan
                    * (a2 / 2.0
                        + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                        + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));
        let northing = if self.north { northing } else { northing + FALSE_NORTHING_SOUTH };
        (easting, northing)
    }

    /// Metres `(easting, northing)` to degrees `(lon, lat)`.
    pub fn inverse(self, easting: f64, northing: f64) -> (f64, f64) {
        let x = easting - FALSE_EASTING;
        let y = if self.north { northing } else { northing - FALSE_NORTHING_SOUTH };

        let e4 = E2 * E2;
        let e6 = e4 * E2;
        let mu = y / K0 / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
        let e1 = (1.0 - (1.0 - E2).sqrt()) / (1.0 + (1.0 - E2).sqrt());
        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin1, cos1, tan1) = (phi1.sin(), phi1.cos(), phi1.tan());
        let c1 = E_PRIME2 * cos1 * cos1;
        let t1 = tan1 * tan1;
        let w = 1.0 - E2 * sin1 * sin1;
        let n1 = A / w.sqrt();
        let r1 = A * (1.0 - E2) / w.powf(1.5);
        let d = x / (n1 * K0);
        let (d2, d3) = (d * d, d * d * d);
        let (d4, d5, d6) = (d2 * d2, d2 * d3, d3 * d3);

        let lat = phi1
            - (n1 * tan1 / r1)
                * (d2 / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                        - 252.0 * E_PRIME2
                        - 3.0 * c1 * c1)
                        * d6
                        / 720.0);
        let lon = self.central_meridian()
            + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1)
                    * d5
                    / 120.0)
                / cos1;
        (lon.to_degrees(), lat.to_degrees())
    }
}

/// Meridional arc from the equator to latitude `phi` (radians).
fn meridional_arc(phi: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;
    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

/// A north-up raster on a projected grid, as stored in a GeoTIFF.
#[derive(Debug, Clone)]
pub struct ProjectedGrid {
    /// Row 0 = northern edge.
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub min_x: f64,
    pub max_y: f64,
    /// Cell size in metres `(x, y)`.
    pub cell: (f64, f64),
    pub utm: Utm,
}

impl ProjectedGrid {
    fn value_at(&self, x: f64, y: f64) -> f32 {
        let col = ((x - self.min_x) / self.cell.0).floor();
        let row = ((self.max_y - y) / self.cell.1).floor();
        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return f32::NAN;
        }
        self.data[row as usize * self.width + col as usize]
    }

    /// Geographic envelope of the grid: edges sampled every cell.
    fn geographic_bbox(&self) -> BBox {
        let max_x = self.min_x + self.width as f64 * self.cell.0;
        let min_y = self.max_y - self.height as f64 * self.cell.1;
        let mut edge = Vec::with_capacity(2 * (self.width + self.height + 2));
        for i in 0..=self.width {
            let x = self.min_x + i as f64 * self.cell.0;
            edge.push((x, min_y));
            edge.push((x, self.max_y));
        }
        for j in 0..=self.height {
            let y = min_y + j as f64 * self.cell.1;
            edge.push((self.min_x, y));
            edge.push((max_x, y));
        }
        let mut bbox = BBox::new(f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for (x, y) in edge {
            let (lon, lat) = self.utm.inverse(x, y);
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lat = bbox.max_lat.max(lat);
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.max_lon = bbox.max_lon.max(lon);
        }
        bbox
    }

    /// Nearest-neighbour resample onto a lon/lat grid of about the same
    /// ground resolution. Cells outside the source footprint are nodata.
    pub fn to_geographic(&self) -> Raster {
        let bbox = self.geographic_bbox();
        let mid_lat = ((bbox.min_lat + bbox.max_lat) / 2.0).to_radians();
        let d_lat = self.cell.1 / METRES_PER_DEG;
        let d_lon = self.cell.0 / (METRES_PER_DEG * mid_lat.cos().max(1e-6));
        let width = ((bbox.width_deg() / d_lon).ceil() as usize).max(1);
        let height = ((bbox.height_deg() / d_lat).ceil() as usize).max(1);
        let bbox = BBox::new(
            bbox.min_lat,
            bbox.min_lat + height as f64 * d_lat,
            bbox.min_lon,
            bbox.min_lon + width as f64 * d_lon,
        );

        let mut out = Raster::new(width, height, bbox, f32::NAN);
        for row in 0..height {
            for col in 0..width {
                let c = out.cell_center(row, col);
                let (x, y) = self.utm.forward(c.lon, c.lat);
                out.set(row, col, self.value_at(x, y));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn epsg_codes_map_to_zones() {
        assert_eq!(Utm::from_epsg(32630), Some(Utm { zone: 30, north: true }));
        assert_eq!(Utm::from_epsg(32721), Some(Utm { zone: 21, north: false }));
        assert_eq!(Utm::from_epsg(25832), Some(Utm { zone: 32, north: true }));
        assert_eq!(Utm::from_epsg(3857), None);
        assert_eq!(Utm::from_epsg(32600), None);
    }

    // Reference values from PROJ (EPSG:4326 → EPSG:32630 / 32721).
    #[test]
    fn forward_matches_reference_points() {
        let (e, n) = Utm { zone: 30, north: true }.forward(-3.7037, 40.4168);
        assert_abs_diff_eq!(e, 440_298.94, epsilon = 1.0);
        assert_abs_diff_eq!(n, 4_474_257.31, epsilon = 1.0);

        let (e, n) = Utm { zone: 21, north: false }.forward(-58.3816, -34.6037);
        assert_abs_diff_eq!(e, 373_317.50, epsilon = 1.0);
        assert_abs_diff_eq!(n, 6_170_036.17, epsilon = 1.0);
    }

    #[test]
    fn inverse_undoes_forward() {
        for (utm, lon, lat) in [
            (Utm { zone: 32, north: true }, 8.33, 44.16),
            (Utm { zone: 30, north: true }, -2.64, 43.35),
            (Utm { zone: 21, north: false }, -58.38, -34.60),
        ] {
            let (e, n) = utm.forward(lon, lat);
            let (lon2, lat2) = utm.inverse(e, n);
            assert_abs_diff_eq!(lon2, lon, epsilon = 1e-6);
            assert_abs_diff_eq!(lat2, lat, epsilon = 1e-6);
        }
    }

    #[test]
    fn warped_grid_keeps_values_in_place() {
        // 4 km square of 100 m cells near Finale Ligure, value = column.
        let utm = Utm { zone: 32, north: true };
        let (width, height) = (40, 40);
        let data = (0..width * height).map(|i| (i % width) as f32).collect();
        let grid = ProjectedGrid {
            data,
            width,
            height,
            min_x: 440_000.0,
            max_y: 4_900_000.0,
            cell: (100.0, 100.0),
            utm,
        };
        let r = grid.to_geographic();
        assert!((39..=43).contains(&r.width) && (39..=43).contains(&r.height));

        let (lon, lat) = utm.inverse(441_250.0, 4_898_750.0);
        assert!(r.bbox().contains(lat, lon));
        let v = r.cell_value(lon, lat).unwrap();
        assert!((v - 12.0).abs() <= 1.0, "got {v}");
        assert!(r.valid_count() > r.data.len() * 9 / 10);
    }
}
