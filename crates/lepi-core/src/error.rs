//! Error taxonomy for the occurrence report pipeline.
//!
//! Every variant is terminal for a run. Recoverable conditions (malformed
//! coordinates, missing elevation) never surface here; they are counted and
//! logged by the stage that meets them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A query parameter (species, country) was empty.
    #[error("invalid query: {0} must be a non-empty string")]
    InvalidQuery(&'static str),

    /// Network or service failure while acquiring input data.
    #[error("acquisition failed: {0}")]
    Acquisition(String),

    /// The occurrence service returned no usable records.
    #[error("no occurrence records with coordinates for {species} in {country}")]
    EmptyOccurrences { species: String, country: String },

    /// No feature in the boundary dataset matched the requested country.
    #[error("no boundary feature named {0:?}")]
    BoundaryNotFound(String),

    /// The boundary geometry held no polygon.
    #[error("boundary has no polygonal geometry: {0}")]
    Boundary(String),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Density estimation requested on a pattern with no points.
    #[error("point pattern is empty: no occurrences fall inside the density window")]
    EmptyPointPattern,

    #[error("invalid kernel bandwidth sigma={0}")]
    InvalidBandwidth(f64),

    #[error("invalid histogram bin width {0}")]
    InvalidBinWidth(f64),

    /// Elevation range too wide for the bin width.
    #[error("elevation range [{min}, {max}] needs too many bins of width {bin_width}")]
    HistogramRange { min: f64, max: f64, bin_width: f64 },

    #[error("record limit must be at least 1")]
    InvalidRecordLimit,

    #[error("invalid density grid {width}x{height}")]
    InvalidGrid { width: usize, height: usize },

    /// The elevation raster is readable but unusable (missing georeferencing,
    /// unsupported sample type, inconsistent size).
    #[error("elevation raster: {0}")]
    Raster(String),

    #[error("TIFF decode error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("image encode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
