//! GeoTIFF reading and writing via the pure-Rust `tiff` crate.
//!
//! Georeferencing comes from ModelPixelScale + ModelTiepoint. Geographic
//! rasters are read as they are; UTM rasters are warped onto a lon/lat
//! grid on read. Other projected systems are rejected.
//!
//! TIFF storage order: row 0 = northernmost (N→S).
//! `Raster` storage order: row 0 = `min_lat` (S→N).
//! Rows are reversed on read and on write.
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek};
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype::Gray32Float, TiffEncoder};
use tiff::tags::Tag;
use tracing::{debug, info};

use super::grid::Raster;
use super::reproject::{ProjectedGrid, Utm};
use crate::error::{Error, Result};

/// GTModelTypeGeoKey and its values.
const GT_MODEL_TYPE_KEY: u16 = 1024;
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const WGS84: u16 = 4326;

/// Read a single-band GeoTIFF. Multi-band files yield their first band.
pub fn read_geotiff(path: &Path) -> Result<Raster> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let raster = decode(BufReader::new(file), path)?;
    debug!(
        path = %path.display(),
        width = raster.width,
        height = raster.height,
        valid = raster.valid_count(),
        "raster read"
    );
    Ok(raster)
}

fn decode<R: Read + Seek>(reader: R, path: &Path) -> Result<Raster> {
    let tiff_err = |source| Error::Tiff { path: path.to_path_buf(), source };

    let mut decoder = Decoder::new(reader).map_err(tiff_err)?;
    let (w, h) = decoder.dimensions().map_err(tiff_err)?;
    let (width, height) = (w as usize, h as usize);
    if width == 0 || height == 0 {
        return Err(Error::GridMismatch(format!("{} has zero extent", path.display())));
    }

    let mut utm = None;
    if let Ok(keys) = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag) {
        if geo_key(&keys, GT_MODEL_TYPE_KEY) == Some(MODEL_TYPE_PROJECTED) {
            let epsg = geo_key(&keys, PROJECTED_CS_TYPE_KEY);
            utm = epsg.and_then(|code| Utm::from_epsg(code.into()));
            if utm.is_none() {
                return Err(Error::UnsupportedCrs { path: path.to_path_buf(), epsg });
            }
        }
    }

    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| Error::MissingGeoreference(path.to_path_buf()))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| Error::MissingGeoreference(path.to_path_buf()))?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(Error::MissingGeoreference(path.to_path_buf()));
    }

    let nodata: Option<f64> = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse().ok());

    let pixels = to_f32(decoder.read_image().map_err(tiff_err)?, path)?;
    let samples = pixels.len() / (width * height);
    if samples == 0 {
        return Err(Error::GridMismatch(format!("{} holds too few pixels", path.display())));
    }

    // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
    let (sx, sy) = (scale[0], scale[1]);
    let min_x = tiepoint[3] - tiepoint[0] * sx;
    let max_y = tiepoint[4] + tiepoint[1] * sy;
    let band = |tiff_row: usize, col: usize| {
        let v = pixels[(tiff_row * width + col) * samples];
        let is_nodata = nodata.is_some_and(|nd| (v as f64 - nd).abs() < 1e-6);
        if is_nodata { f32::NAN } else { v }
    };

    if let Some(utm) = utm {
        let data = (0..height).flat_map(|r| (0..width).map(move |c| (r, c))).map(|(r, c)| band(r, c));
        let grid = ProjectedGrid {
            data: data.collect(),
            width,
            height,
            min_x,
            max_y,
            cell: (sx, sy),
            utm,
        };
        let raster = grid.to_geographic();
        info!(
            path = %path.display(),
            zone = utm.zone,
            north = utm.north,
            width = raster.width,
            height = raster.height,
            "UTM raster warped to lon/lat"
        );
        return Ok(raster);
    }

    let (min_lon, max_lat) = (min_x, max_y);
    let mut data = Vec::with_capacity(width * height);
    for tiff_row in (0..height).rev() {
        for col in 0..width {
            data.push(band(tiff_row, col));
        }
    }

    Ok(Raster {
        data,
        width,
        height,
        min_lon,
        max_lon: min_lon + width as f64 * sx,
        min_lat: max_lat - height as f64 * sy,
        max_lat,
    })
}

/// Value of a GeoKey stored inline in the directory.
fn geo_key(dir: &[u16], key: u16) -> Option<u16> {
    // Header: version, revision, minor, key count; then 4-short entries.
    let count = *dir.get(3)? as usize;
    dir.get(4..4 + count * 4)?
        .chunks_exact(4)
        .find(|e| e[0] == key && e[1] == 0)
        .map(|e| e[3])
}

fn to_f32(result: DecodingResult, path: &Path) -> Result<Vec<f32>> {
    Ok(match result {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => return Err(Error::UnsupportedPixelType(path.to_path_buf())),
    })
}

/// Write a raster as a Float32 GeoTIFF in WGS84 with NaN nodata.
pub fn write_geotiff(raster: &Raster, path: &Path) -> Result<()> {
    let (dx, dy) = raster.cell_size();
    let geokeys: [u16; 16] = [
        1, 1, 0, 3,
        GT_MODEL_TYPE_KEY, 0, 1, MODEL_TYPE_GEOGRAPHIC,
        GT_RASTER_TYPE_KEY, 0, 1, RASTER_PIXEL_IS_AREA,
        GEOGRAPHIC_TYPE_KEY, 0, 1, WGS84,
    ];
    let mut north_up = Vec::with_capacity(raster.data.len());
    for row in (0..raster.height).rev() {
        north_up.extend_from_slice(&raster.data[row * raster.width..(row + 1) * raster.width]);
    }
    encode(
        path,
        (raster.width, raster.height),
        &north_up,
        [dx, dy, 0.0],
        [0.0, 0.0, 0.0, raster.min_lon, raster.max_lat, 0.0],
        &geokeys,
    )
}

/// Write north-up Float32 pixels with the given georeference tags.
fn encode(
    path: &Path,
    (width, height): (usize, usize),
    north_up: &[f32],
    scale: [f64; 3],
    tiepoint: [f64; 6],
    geokeys: &[u16],
) -> Result<()> {
    let tiff_err = |source| Error::Tiff { path: path.to_path_buf(), source };
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(tiff_err)?;
    let mut image = encoder.new_image::<Gray32Float>(width as u32, height as u32).map_err(tiff_err)?;

    let enc = image.encoder();
    enc.write_tag(Tag::ModelPixelScaleTag, &scale[..]).map_err(tiff_err)?;
    enc.write_tag(Tag::ModelTiepointTag, &tiepoint[..]).map_err(tiff_err)?;
    enc.write_tag(Tag::GeoKeyDirectoryTag, geokeys).map_err(tiff_err)?;
    enc.write_tag(Tag::GdalNodata, "nan").map_err(tiff_err)?;
    image.write_data(north_up).map_err(tiff_err)?;
    Ok(())
}

/// Every `.tif`/`.tiff` in `dir`, sorted by name.
pub fn list_rasters(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| Error::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Read every raster in `dir` and sum them cell-wise (mobility surfaces
/// come as one least-cost-path raster per origin).
pub fn read_raster_dir(dir: &Path) -> Result<Raster> {
    let paths = list_rasters(dir)?;
    if paths.is_empty() {
        return Err(Error::EmptyDataset(format!("no GeoTIFFs in {}", dir.display())));
    }
    let rasters = paths.iter().map(|p| read_geotiff(p)).collect::<Result<Vec<_>>>()?;
    let summed = Raster::sum(&rasters)?;
    info!(dir = %dir.display(), files = paths.len(), "raster stack summed");
    Ok(summed)
}
