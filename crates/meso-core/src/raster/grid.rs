use serde::{Deserialize, Serialize};

use crate::coords::{metres_to_degrees, BBox, LatLon};
use crate::error::{Error, Result};

/// A geographic raster storing one f32 band, row-major.
///
/// Row 0 is the southern edge (`min_lat`), matching `LatLon` ordering.
/// Bounds are the outer cell edges; NaN marks nodata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Raster {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Raster {
    /// Create a raster filled with the given value.
    pub fn new(width: usize, height: usize, bbox: BBox, fill: f32) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
            min_lon: bbox.min_lon,
            max_lon: bbox.max_lon,
            min_lat: bbox.min_lat,
            max_lat: bbox.max_lat,
        }
    }

    pub fn bbox(&self) -> BBox {
        BBox::new(self.min_lat, self.max_lat, self.min_lon, self.max_lon)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.width + col] = val;
    }

    /// Cell size in degrees `(d_lon, d_lat)`.
    pub fn cell_size(&self) -> (f64, f64) {
        (
            (self.max_lon - self.min_lon) / self.width as f64,
            (self.max_lat - self.min_lat) / self.height as f64,
        )
    }

    pub fn cell_center(&self, row: usize, col: usize) -> LatLon {
        let (dx, dy) = self.cell_size();
        LatLon::new(
            self.min_lat + (row as f64 + 0.5) * dy,
            self.min_lon + (col as f64 + 0.5) * dx,
        )
    }

    /// `(row, col)` of the cell containing the point; `None` outside the
    /// raster. The northern and eastern edges belong to the last cell.
    pub fn cell_index(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        if self.width == 0 || self.height == 0 || !self.bbox().contains(lat, lon) {
            return None;
        }
        let (dx, dy) = self.cell_size();
        let col = (((lon - self.min_lon) / dx).floor() as usize).min(self.width - 1);
        let row = (((lat - self.min_lat) / dy).floor() as usize).min(self.height - 1);
        Some((row, col))
    }

    /// Value of the containing cell; `None` outside or on nodata.
    pub fn cell_value(&self, lon: f64, lat: f64) -> Option<f32> {
        let (r, c) = self.cell_index(lon, lat)?;
        let v = self.get(r, c);
        v.is_finite().then_some(v)
    }

    /// Bilinear interpolation between the four surrounding cell centres.
    /// Points within half a cell of the border use the clamped edge cells.
    /// Returns `None` outside the raster or when any contributing cell is nodata.
    pub fn sample_bilinear(&self, lon: f64, lat: f64) -> Option<f32> {
        self.cell_index(lon, lat)?;
        let (dx, dy) = self.cell_size();

        let fx = ((lon - self.min_lon) / dx - 0.5).clamp(0.0, (self.width - 1) as f64);
        let fy = ((lat - self.min_lat) / dy - 0.5).clamp(0.0, (self.height - 1) as f64);

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);

        let tx = (fx - x0 as f64) as f32;
        let ty = (fy - y0 as f64) as f32;

        let v00 = self.get(y0, x0);
        let v10 = self.get(y0, x1);
        let v01 = self.get(y1, x0);
        let v11 = self.get(y1, x1);

        let v = v00 * (1.0 - tx) * (1.0 - ty)
            + v10 * tx * (1.0 - ty)
            + v01 * (1.0 - tx) * ty
            + v11 * tx * ty;

        v.is_finite().then_some(v)
    }

    /// Maximum over cells whose centres lie within `radius_m` metres of the
    /// point. The containing cell always counts, so a radius smaller than
    /// the cell still yields a value.
    pub fn max_within_radius(&self, lon: f64, lat: f64, radius_m: f64) -> Option<f32> {
        let (row0, col0) = self.cell_index(lon, lat)?;
        let centre = LatLon::new(lat, lon);
        let (d_lat, d_lon) = metres_to_degrees(radius_m, lat);
        let (dx, dy) = self.cell_size();

        // Float-to-usize casts saturate, so a huge radius clamps to the raster.
        let row_span = ((d_lat / dy).ceil() as usize).saturating_add(1);
        let col_span = ((d_lon / dx).ceil() as usize).saturating_add(1);
        let r_lo = row0.saturating_sub(row_span);
        let r_hi = row0.saturating_add(row_span).min(self.height - 1);
        let c_lo = col0.saturating_sub(col_span);
        let c_hi = col0.saturating_add(col_span).min(self.width - 1);

        let mut best = f32::NEG_INFINITY;
        for r in r_lo..=r_hi {
            for c in c_lo..=c_hi {
                let v = self.get(r, c);
                if !v.is_finite() {
                    continue;
                }
                let inside = (r == row0 && c == col0) || self.cell_center(r, c).distance_m(centre) <= radius_m;
                if inside && v > best {
                    best = v;
                }
            }
        }
        best.is_finite().then_some(best)
    }

    /// Same dimensions and bounds (to 1e-9 degrees).
    pub fn same_grid(&self, other: &Raster) -> bool {
        const EPS: f64 = 1e-9;
        self.width == other.width
            && self.height == other.height
            && (self.min_lon - other.min_lon).abs() < EPS
            && (self.max_lon - other.max_lon).abs() < EPS
            && (self.min_lat - other.min_lat).abs() < EPS
            && (self.max_lat - other.max_lat).abs() < EPS
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }

    /// Cell-wise sum of rasters sharing one grid. Nodata in any input gives
    /// nodata in the output.
    pub fn sum(rasters: &[Raster]) -> Result<Raster> {
        let (first, rest) = rasters
            .split_first()
            .ok_or_else(|| Error::EmptyDataset("no rasters to sum".into()))?;
        let mut out = first.clone();
        for (i, r) in rest.iter().enumerate() {
            if !r.same_grid(first) {
                return Err(Error::GridMismatch(format!(
                    "raster {} is {}x{} over {:?}, expected {}x{} over {:?}",
                    i + 1,
                    r.width,
                    r.height,
                    r.bbox(),
                    first.width,
                    first.height,
                    first.bbox()
                )));
            }
            for (o, v) in out.data.iter_mut().zip(&r.data) {
                *o += *v;
            }
        }
        Ok(out)
    }

    /// Merge tiles of equal resolution into one raster covering their union.
    /// Where tiles overlap the first valid value wins.
    pub fn mosaic(tiles: &[Raster]) -> Result<Raster> {
        let (first, rest) = tiles
            .split_first()
            .ok_or_else(|| Error::EmptyDataset("no rasters to mosaic".into()))?;
        if rest.is_empty() {
            return Ok(first.clone());
        }
        let (dx, dy) = first.cell_size();
        for t in rest {
            let (tx, ty) = t.cell_size();
            if (tx - dx).abs() > dx * 1e-6 || (ty - dy).abs() > dy * 1e-6 {
                return Err(Error::GridMismatch(format!(
                    "tile resolution {tx}x{ty} differs from {dx}x{dy}"
                )));
            }
        }

        let min_lon = tiles.iter().map(|t| t.min_lon).fold(f64::INFINITY, f64::min);
        let max_lon = tiles.iter().map(|t| t.max_lon).fold(f64::NEG_INFINITY, f64::max);
        let min_lat = tiles.iter().map(|t| t.min_lat).fold(f64::INFINITY, f64::min);
        let max_lat = tiles.iter().map(|t| t.max_lat).fold(f64::NEG_INFINITY, f64::max);
        let width = ((max_lon - min_lon) / dx).round() as usize;
        let height = ((max_lat - min_lat) / dy).round() as usize;
        let mut out = Raster::new(width, height, BBox::new(min_lat, max_lat, min_lon, max_lon), f32::NAN);

        for t in tiles {
            let col_off = ((t.min_lon - min_lon) / dx).round() as usize;
            let row_off = ((t.min_lat - min_lat) / dy).round() as usize;
            for r in 0..t.height {
                for c in 0..t.width {
                    let (or, oc) = (r + row_off, c + col_off);
                    if or >= height || oc >= width {
                        continue;
                    }
                    let v = t.get(r, c);
                    if v.is_finite() && !out.get(or, oc).is_finite() {
                        out.set(or, oc, v);
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 4×4 raster over [0, 4]° lon × [0, 4]° lat, value = row * 10 + col.
    fn ramp() -> Raster {
        let mut r = Raster::new(4, 4, BBox::new(0.0, 4.0, 0.0, 4.0), 0.0);
        for row in 0..4 {
            for col in 0..4 {
                r.set(row, col, (row * 10 + col) as f32);
            }
        }
        r
    }

    #[test]
    fn cell_lookup_uses_south_up_rows() {
        let r = ramp();
        assert_eq!(r.cell_index(0.5, 0.5), Some((0, 0)));
        assert_eq!(r.cell_index(3.5, 2.5), Some((2, 3)));
        // Edges belong to the last cell.
        assert_eq!(r.cell_index(4.0, 4.0), Some((3, 3)));
        assert_eq!(r.cell_value(1.2, 3.9), Some(31.0));
        assert!(r.cell_index(-0.1, 1.0).is_none());
    }

    #[test]
    fn nodata_cells_yield_none() {
        let mut r = ramp();
        r.set(1, 1, f32::NAN);
        assert!(r.cell_value(1.5, 1.5).is_none());
        assert!(r.sample_bilinear(1.5, 1.5).is_none());
        assert_eq!(r.valid_count(), 15);
    }

    #[test]
    fn bilinear_hits_cell_centres_and_midpoints() {
        let r = ramp();
        assert_relative_eq!(r.sample_bilinear(1.5, 2.5).unwrap(), 21.0);
        // Halfway between centres (1.5, 1.5) and (2.5, 1.5).
        assert_relative_eq!(r.sample_bilinear(2.0, 1.5).unwrap(), 11.5);
    }

    #[test]
    fn radius_maximum_covers_nearby_cells_only() {
        // 0.01° cells near 44°N: ~1113 m tall, ~800 m wide.
        let mut r = Raster::new(10, 10, BBox::new(44.0, 44.1, 8.0, 8.1), 0.0);
        r.set(5, 5, 1.0);
        r.set(5, 6, 7.0); // ~800 m east of (5, 5)
        r.set(5, 9, 99.0); // ~3.2 km east
        let c = r.cell_center(5, 5);
        assert_eq!(r.max_within_radius(c.lon, c.lat, 1000.0), Some(7.0));
        assert_eq!(r.max_within_radius(c.lon, c.lat, 0.0), Some(1.0));
        assert_eq!(r.max_within_radius(c.lon, c.lat, 5000.0), Some(99.0));
    }

    #[test]
    fn huge_radius_covers_the_whole_raster() {
        let r = ramp();
        assert_eq!(r.max_within_radius(0.5, 0.5, 1e300), Some(33.0));
        assert_eq!(r.max_within_radius(0.5, 0.5, f64::INFINITY), Some(33.0));
    }

    #[test]
    fn sum_requires_matching_grids() {
        let a = ramp();
        let mut b = ramp();
        b.set(0, 0, f32::NAN);
        let s = Raster::sum(&[a.clone(), b]).unwrap();
        assert!(s.get(0, 0).is_nan());
        assert_eq!(s.get(3, 3), 66.0);

        let other = Raster::new(2, 2, BBox::new(0.0, 4.0, 0.0, 4.0), 0.0);
        assert!(matches!(Raster::sum(&[a, other]), Err(Error::GridMismatch(_))));
    }

    #[test]
    fn mosaic_places_tiles_side_by_side() {
        let west = Raster::new(2, 2, BBox::new(0.0, 2.0, 0.0, 2.0), 1.0);
        let east = Raster::new(2, 2, BBox::new(0.0, 2.0, 2.0, 4.0), 2.0);
        let m = Raster::mosaic(&[west, east]).unwrap();
        assert_eq!((m.width, m.height), (4, 2));
        assert_eq!(m.cell_value(0.5, 0.5), Some(1.0));
        assert_eq!(m.cell_value(3.5, 1.5), Some(2.0));
    }
}
