//! Region-of-interest filter.
//!
//! The boundary polygons are rasterised onto a coarse grid spanning their
//! bounding extent; a point is kept when the cell it falls in is set. This
//! is an approximate point-in-polygon test: near the boundary its accuracy
//! is bounded by the cell size.
use geo::{BoundingRect, Contains, Point, Polygon};
use tracing::info;

use crate::coords::BBox;
use crate::error::{Error, Result};

/// Boolean mask of boundary polygons over their bounding extent.
/// Row 0 is the southern edge.
#[derive(Debug, Clone)]
pub struct ContainmentGrid {
    cells: Vec<bool>,
    width: usize,
    height: usize,
    extent: BBox,
}

impl ContainmentGrid {
    /// A cell is set when its centre lies inside any polygon.
    pub fn rasterize(polygons: &[Polygon<f64>], width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::Config("containment grid needs at least one cell".into()));
        }
        let mut extent: Option<BBox> = None;
        for rect in polygons.iter().filter_map(|p| p.bounding_rect()) {
            let (min, max) = (rect.min(), rect.max());
            extent = Some(match extent {
                None => BBox::new(min.y, max.y, min.x, max.x),
                Some(b) => BBox::new(
                    b.min_lat.min(min.y),
                    b.max_lat.max(max.y),
                    b.min_lon.min(min.x),
                    b.max_lon.max(max.x),
                ),
            });
        }
        let extent = extent.ok_or_else(|| Error::InvalidGeometry("no boundary polygons".into()))?;

        let dx = extent.width_deg() / width as f64;
        let dy = extent.height_deg() / height as f64;
        let mut cells = vec![false; width * height];
        for r in 0..height {
            let lat = extent.min_lat + (r as f64 + 0.5) * dy;
            for c in 0..width {
                let lon = extent.min_lon + (c as f64 + 0.5) * dx;
                let centre = Point::new(lon, lat);
                cells[r * width + c] = polygons.iter().any(|p| p.contains(&centre));
            }
        }
        Ok(Self { cells, width, height, extent })
    }

    pub fn extent(&self) -> BBox {
        self.extent
    }

    pub fn set_cells(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    /// `false` outside the extent or on an unset cell.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        if !self.extent.contains(lat, lon) {
            return false;
        }
        let dx = self.extent.width_deg() / self.width as f64;
        let dy = self.extent.height_deg() / self.height as f64;
        let col = if dx > 0.0 { ((lon - self.extent.min_lon) / dx).floor() as usize } else { 0 };
        let row = if dy > 0.0 { ((lat - self.extent.min_lat) / dy).floor() as usize } else { 0 };
        self.cells[row.min(self.height - 1) * self.width + col.min(self.width - 1)]
    }
}

/// Keep the items whose `(lon, lat)` falls in a set cell.
pub fn filter_points<T, F>(items: Vec<T>, grid: &ContainmentGrid, coords: F) -> Vec<T>
where
    F: Fn(&T) -> (f64, f64),
{
    let before = items.len();
    let kept: Vec<T> = items
        .into_iter()
        .filter(|item| {
            let (lon, lat) = coords(item);
            grid.contains(lon, lat)
        })
        .collect();
    info!(before, kept = kept.len(), "points filtered by region polygon");
    kept
}
