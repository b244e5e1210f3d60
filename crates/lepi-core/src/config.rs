//! Report parameters. Every constant of the analysis lives here; the tools
//! expose them as CLI defaults and accept a JSON override file.

use serde::{Deserialize, Serialize};

use crate::colormap::Colormap;
use crate::error::{PipelineError, Result};

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_SPECIES: &str = "Parnassius apollo";
pub const DEFAULT_COUNTRY_CODE: &str = "IT";
pub const DEFAULT_COUNTRY_NAME: &str = "Italy";
/// Records requested from the occurrence service per run.
pub const DEFAULT_RECORD_LIMIT: usize = 500;
/// Kernel bandwidth in degrees.
pub const DEFAULT_SIGMA: f64 = 0.25;
/// Density grid resolution (cells per axis).
pub const DEFAULT_GRID: usize = 128;
/// Histogram bin width in metres.
pub const DEFAULT_BIN_WIDTH: f64 = 100.0;

/// Natural Earth resolution tier for the boundary polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Small,
    Medium,
    Large,
}

impl Resolution {
    /// Natural Earth scale token: 1:110m, 1:50m, 1:10m.
    pub fn scale(self) -> &'static str {
        match self {
            Resolution::Small => "110m",
            Resolution::Medium => "50m",
            Resolution::Large => "10m",
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "small" | "110m" => Ok(Resolution::Small),
            "medium" | "50m" => Ok(Resolution::Medium),
            "large" | "10m" => Ok(Resolution::Large),
            other => Err(format!("unknown resolution '{other}' (small, medium, large)")),
        }
    }
}

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Scientific name queried at the occurrence service.
    pub species: String,
    /// ISO-3166 alpha-2 country filter for occurrences.
    pub country_code: String,
    /// Country name used to select the boundary feature.
    pub country_name: String,
    pub resolution: Resolution,
    pub record_limit: usize,
    pub sigma: f64,
    pub grid_width: usize,
    pub grid_height: usize,
    /// Divide each cell by the kernel mass inside the window.
    pub edge_correction: bool,
    pub bin_width: f64,
    pub density_colormap: Colormap,
    pub elevation_colormap: Colormap,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            species: DEFAULT_SPECIES.into(),
            country_code: DEFAULT_COUNTRY_CODE.into(),
            country_name: DEFAULT_COUNTRY_NAME.into(),
            resolution: Resolution::Medium,
            record_limit: DEFAULT_RECORD_LIMIT,
            sigma: DEFAULT_SIGMA,
            grid_width: DEFAULT_GRID,
            grid_height: DEFAULT_GRID,
            edge_correction: true,
            bin_width: DEFAULT_BIN_WIDTH,
            density_colormap: Colormap::Viridis,
            elevation_colormap: Colormap::Terrain,
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON override; absent fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: PipelineConfig = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.species.trim().is_empty() {
            return Err(PipelineError::InvalidQuery("species"));
        }
        if self.country_code.trim().is_empty() {
            return Err(PipelineError::InvalidQuery("country_code"));
        }
        if self.country_name.trim().is_empty() {
            return Err(PipelineError::InvalidQuery("country_name"));
        }
        if self.record_limit == 0 {
            return Err(PipelineError::InvalidRecordLimit);
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(PipelineError::InvalidBandwidth(self.sigma));
        }
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(PipelineError::InvalidGrid {
                width: self.grid_width,
                height: self.grid_height,
            });
        }
        if !(self.bin_width.is_finite() && self.bin_width > 0.0) {
            return Err(PipelineError::InvalidBinWidth(self.bin_width));
        }
        Ok(())
    }
}
