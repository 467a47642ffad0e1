//! Geographic rasters: grid type, GeoTIFF I/O and derived surfaces.
pub mod geotiff;
pub mod grid;
pub mod reproject;
pub mod slope;

pub use geotiff::{read_geotiff, read_raster_dir, write_geotiff};
pub use grid::Raster;
pub use reproject::{ProjectedGrid, Utm};
pub use slope::slope_degrees;
