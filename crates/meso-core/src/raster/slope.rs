//! Slope (Horn method) derived from a geographic DEM.
//!
//! Used when a region supplies no precomputed slope raster.
use super::grid::Raster;
use crate::coords::METRES_PER_DEG;

/// Slope angle in degrees at every interior cell, Horn's (1981) 3×3
/// weighted finite differences. Border cells and cells with a nodata
/// neighbour are nodata.
///
/// Cell sizes come from the geographic bounds, with the east-west size
/// shrinking by cos(latitude) row by row:
///   cx = d_lon × 111_320 × cos(lat_row),  cy = d_lat × 111_320
///
/// Neighbourhood (row 0 is south, so N is `r + 1`):
/// ```text
///   NW(+1,-1)  N(+1, 0)  NE(+1,+1)
///   W ( 0,-1)  *         E ( 0,+1)
///   SW(-1,-1)  S(-1, 0)  SE(-1,+1)
/// ```
///   dz/dx = ((NE + 2E + SE) − (NW + 2W + SW)) / (8 · cx)
///   dz/dy = ((NW + 2N + NE) − (SW + 2S + SE)) / (8 · cy)
///   slope = atan(√(dz/dx² + dz/dy²)) × 180/π
pub fn slope_degrees(dem: &Raster) -> Raster {
    let mut out = dem.clone();
    out.data.iter_mut().for_each(|v| *v = f32::NAN);
    if dem.width < 3 || dem.height < 3 {
        return out;
    }

    let (d_lon, d_lat) = dem.cell_size();
    let cy = d_lat * METRES_PER_DEG;

    for r in 1..dem.height - 1 {
        let lat = dem.cell_center(r, 0).lat;
        let cx = (d_lon * METRES_PER_DEG * lat.to_radians().cos()).max(1e-3);
        for c in 1..dem.width - 1 {
            let g = |dr: isize, dc: isize| {
                dem.get((r as isize + dr) as usize, (c as isize + dc) as usize) as f64
            };
            let (nw, n, ne) = (g(1, -1), g(1, 0), g(1, 1));
            let (w, e) = (g(0, -1), g(0, 1));
            let (sw, s, se) = (g(-1, -1), g(-1, 0), g(-1, 1));
            if [nw, n, ne, w, e, sw, s, se].iter().any(|v| !v.is_finite()) {
                continue;
            }
            let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w + sw)) / (8.0 * cx);
            let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * cy);
            let slope = dz_dx.hypot(dz_dy).atan().to_degrees();
            out.set(r, c, slope as f32);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::BBox;

    /// Planar ramp rising eastwards at `target_deg`, ~90 m cells at the equator.
    fn ramp(n: usize, target_deg: f64) -> Raster {
        let pixel_deg = 90.0 / METRES_PER_DEG;
        let extent = n as f64 * pixel_deg;
        let mut r = Raster::new(n, n, BBox::new(0.0, extent, 0.0, extent), 0.0);
        let rise = 90.0 * target_deg.to_radians().tan();
        for row in 0..n {
            for col in 0..n {
                r.set(row, col, (col as f64 * rise) as f32);
            }
        }
        r
    }

    #[test]
    fn ramp_slope_matches_target() {
        let s = slope_degrees(&ramp(16, 10.0));
        let v = s.get(8, 8);
        assert!((v - 10.0).abs() < 0.1, "expected ≈10°, got {v}");
    }

    #[test]
    fn borders_and_nodata_neighbours_are_nodata() {
        let mut dem = ramp(8, 5.0);
        dem.set(4, 4, f32::NAN);
        let s = slope_degrees(&dem);
        assert!(s.get(0, 3).is_nan());
        assert!(s.get(3, 3).is_nan());
        assert!(s.get(6, 6).is_finite());
    }

    #[test]
    fn flat_dem_has_zero_slope() {
        let dem = Raster::new(5, 5, BBox::new(0.0, 0.05, 0.0, 0.05), 100.0);
        assert_eq!(slope_degrees(&dem).get(2, 2), 0.0);
    }
}
