//! Gridded elevation surface read from a single-band GeoTIFF, queried by
//! point location.

use std::fs;
use std::io::{self, Read, Seek};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use crate::error::{PipelineError, Result};

/// Magnitudes at or above this are float fill values (e.g. -3.4e38), not
/// elevations, whether or not GDAL_NODATA declares them.
const FILL_MAGNITUDE: f64 = 1e30;

/// GeoKeyDirectory entry selecting PixelIsArea (1) or PixelIsPoint (2).
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// True when the GeoKeyDirectory declares PixelIsPoint. The directory is a
/// 4-value header followed by (key, location, count, value) entries.
fn pixel_is_point(geokeys: &[u16]) -> bool {
    geokeys
        .get(4..)
        .unwrap_or(&[])
        .chunks_exact(4)
        .any(|e| e[0] == GT_RASTER_TYPE_GEO_KEY && e[1] == 0 && e[3] == RASTER_PIXEL_IS_POINT)
}

/// Elevation values in metres, row-major.
/// Storage order: row 0 = min_lat (S→N). NaN marks no-data cells.
#[derive(Debug, Clone)]
pub struct ElevationSurface {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl ElevationSurface {
    pub fn new(
        width: usize,
        height: usize,
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
        fill: f32,
    ) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.width + col] = val;
    }

    /// Point-in-cell extraction: the value of the cell containing (lon, lat).
    /// `None` outside coverage or on a no-data cell. The max edges belong to
    /// the last row/column.
    pub fn sample(&self, lon: f64, lat: f64) -> Option<f32> {
        if !(lon.is_finite() && lat.is_finite()) || self.width == 0 || self.height == 0 {
            return None;
        }
        if lon < self.min_lon || lon > self.max_lon || lat < self.min_lat || lat > self.max_lat {
            return None;
        }
        let fx = (lon - self.min_lon) / (self.max_lon - self.min_lon) * self.width as f64;
        let fy = (lat - self.min_lat) / (self.max_lat - self.min_lat) * self.height as f64;
        let col = (fx.floor() as usize).min(self.width - 1);
        let row = (fy.floor() as usize).min(self.height - 1);
        let v = self.get(row, col);
        (!v.is_nan()).then_some(v)
    }

    pub fn valid_fraction(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().filter(|v| !v.is_nan()).count() as f64 / self.data.len() as f64
    }

    // ── GeoTIFF ──────────────────────────────────────────────────────────────

    pub fn open(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let surface = Self::from_geotiff(io::BufReader::new(file))?;
        tracing::info!(
            path = %path.display(),
            width = surface.width,
            height = surface.height,
            valid = %format!("{:.3}", surface.valid_fraction()),
            "elevation surface loaded"
        );
        Ok(surface)
    }

    /// Decode a north-up GeoTIFF georeferenced with ModelPixelScale +
    /// ModelTiepoint. GDAL_NODATA, when present, becomes NaN, as do float
    /// fill values.
    ///
    /// The tiepoint is read as the outer corner of its pixel (PixelIsArea,
    /// the GeoTIFF default); a PixelIsPoint raster declared through
    /// `GTRasterTypeGeoKey` is shifted by half a pixel to match.
    pub fn from_geotiff<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut decoder = Decoder::new(reader)?;
        let (w, h) = decoder.dimensions()?;
        let (width, height) = (w as usize, h as usize);
        if width == 0 || height == 0 {
            return Err(PipelineError::Raster(format!("empty raster {width}x{height}")));
        }

        let scale = decoder
            .get_tag_f64_vec(Tag::ModelPixelScaleTag)
            .map_err(|e| PipelineError::Raster(format!("missing ModelPixelScale: {e}")))?;
        let tie = decoder
            .get_tag_f64_vec(Tag::ModelTiepointTag)
            .map_err(|e| PipelineError::Raster(format!("missing ModelTiepoint: {e}")))?;
        if scale.len() < 2 || tie.len() < 6 {
            return Err(PipelineError::Raster("malformed georeferencing tags".into()));
        }
        let nodata = match decoder.find_tag(Tag::GdalNodata)? {
            Some(value) => value.into_string()?.trim_matches(char::from(0)).trim().parse::<f64>().ok(),
            None => None,
        };

        let point = match decoder.find_tag(Tag::GeoKeyDirectoryTag)? {
            Some(value) => pixel_is_point(&value.into_u16_vec()?),
            None => false,
        };

        let (sx, sy) = (scale[0], scale[1]);
        // Tiepoint maps raster (i, j) to model (x, y); under PixelIsPoint that
        // is the pixel centre.
        let shift = if point { 0.5 } else { 0.0 };
        let min_lon = tie[3] - (tie[0] + shift) * sx;
        let max_lat = tie[4] + (tie[1] + shift) * sy;
        let max_lon = min_lon + width as f64 * sx;
        let min_lat = max_lat - height as f64 * sy;

        let samples: Vec<f64> = match decoder.read_image()? {
            DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::F64(v) => v,
            DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
            _ => {
                return Err(PipelineError::Raster("unsupported sample type".into()));
            }
        };
        if samples.len() != width * height {
            return Err(PipelineError::Raster(format!(
                "expected {} samples for {width}x{height}, got {} (multi-band rasters are not supported)",
                width * height,
                samples.len()
            )));
        }

        // TIFF row 0 is the northern edge; flip to S→N.
        let mut data = Vec::with_capacity(width * height);
        for tiff_row in (0..height).rev() {
            let start = tiff_row * width;
            for &v in &samples[start..start + width] {
                let missing = v.is_nan() || v.abs() >= FILL_MAGNITUDE || nodata.is_some_and(|nd| v == nd);
                data.push(if missing { f32::NAN } else { v as f32 });
            }
        }

        Ok(Self {
            data,
            width,
            height,
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        })
    }
}
