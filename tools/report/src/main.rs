/// Report tool: runs normalization, density estimation, the elevation join
/// and the histogram over the inputs cached by `fetch` plus a local GeoTIFF
/// DEM, then writes the figures.
///
/// Outputs (in --output):
///   density_map.svg          masked kernel density + boundary + colorbar
///   elevation_map.svg        occurrences coloured by elevation
///   elevation_histogram.svg  fixed-width elevation bins
///   density.png              raw masked density raster (transparent outside)
///   summary.json             counts, parameters and histogram
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use lepi_core::boundary::Boundary;
use lepi_core::colormap::Colormap;
use lepi_core::config::PipelineConfig;
use lepi_core::elevation::ElevationSurface;
use lepi_core::occurrence::OccurrenceRecord;
use lepi_core::pipeline::{self, Inputs, Summary};
use lepi_core::render::{self, FigureLabels};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "report",
    about = "Density and elevation figures from cached occurrences, boundary and DEM"
)]
struct Args {
    /// Directory holding occurrences.json and boundary.geojson
    #[arg(long, default_value = "data/raw")]
    data_dir: PathBuf,

    /// Single-band GeoTIFF elevation model covering the country
    #[arg(long, default_value = "data/raw/elevation.tif")]
    dem: PathBuf,

    /// Output directory (created if absent)
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// JSON config file; fields absent from it keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Kernel bandwidth in degrees (overrides config)
    #[arg(long)]
    sigma: Option<f64>,

    /// Density grid size in cells per side (overrides config)
    #[arg(long)]
    grid: Option<usize>,

    /// Histogram bin width in metres (overrides config)
    #[arg(long)]
    bin_width: Option<f64>,

    /// Density colormap (viridis, terrain)
    #[arg(long)]
    density_colormap: Option<Colormap>,

    /// Elevation colormap (viridis, terrain)
    #[arg(long)]
    elevation_colormap: Option<Colormap>,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Cannot read {}", path.display()))?;
                PipelineConfig::from_json(&text)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => PipelineConfig::default(),
        };
        if let Some(s) = self.sigma {
            cfg.sigma = s;
        }
        if let Some(g) = self.grid {
            cfg.grid_width = g;
            cfg.grid_height = g;
        }
        if let Some(w) = self.bin_width {
            cfg.bin_width = w;
        }
        if let Some(c) = self.density_colormap {
            cfg.density_colormap = c;
        }
        if let Some(c) = self.elevation_colormap {
            cfg.elevation_colormap = c;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

// ── Output manifest ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Manifest<'a> {
    dem: String,
    figures: Vec<&'static str>,
    #[serde(flatten)]
    summary: &'a Summary,
}

// ── Inputs ───────────────────────────────────────────────────────────────────

fn load_inputs(args: &Args, cfg: &PipelineConfig) -> Result<Inputs> {
    let occ_path = args.data_dir.join("occurrences.json");
    let text = fs::read_to_string(&occ_path)
        .with_context(|| format!("Cannot read {} (run `fetch` first)", occ_path.display()))?;
    let records: Vec<OccurrenceRecord> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", occ_path.display()))?;

    let boundary_path = args.data_dir.join("boundary.geojson");
    let text = fs::read_to_string(&boundary_path)
        .with_context(|| format!("Cannot read {}", boundary_path.display()))?;
    let boundary = Boundary::parse(&text, &cfg.country_name)
        .with_context(|| format!("Invalid boundary {}", boundary_path.display()))?;

    let dem = ElevationSurface::open(&args.dem)
        .with_context(|| format!("Cannot load DEM {}", args.dem.display()))?;

    tracing::info!(records = records.len(), boundary = %boundary.name, "inputs loaded");
    Ok(Inputs {
        records,
        boundary,
        dem,
    })
}

fn write_text(dir: &Path, name: &str, content: &str) -> Result<()> {
    let path = dir.join(name);
    fs::write(&path, content).with_context(|| format!("Cannot write {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote");
    Ok(())
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = args.pipeline_config()?;
    let inputs = load_inputs(&args, &cfg)?;

    let report = pipeline::run(&inputs, &cfg)?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;
    let out = args.output.as_path();

    // ── 1. density_map.svg ───────────────────────────────────────────────────
    let svg = render::density_map_svg(
        &report.density,
        &inputs.boundary,
        &FigureLabels::density(&cfg.species),
        cfg.density_colormap,
    );
    write_text(out, "density_map.svg", &svg)?;

    // ── 2. elevation_map.svg ─────────────────────────────────────────────────
    let svg = render::elevation_map_svg(
        &report.elevated,
        &inputs.boundary,
        &FigureLabels::elevation_map(&cfg.species),
        cfg.elevation_colormap,
    );
    write_text(out, "elevation_map.svg", &svg)?;

    // ── 3. elevation_histogram.svg ───────────────────────────────────────────
    let svg = render::histogram_svg(&report.histogram, &FigureLabels::histogram(&cfg.species));
    write_text(out, "elevation_histogram.svg", &svg)?;

    // ── 4. density.png ───────────────────────────────────────────────────────
    let png = out.join("density.png");
    render::save_density_png(&report.density, cfg.density_colormap, &png)
        .with_context(|| format!("Cannot write {}", png.display()))?;
    tracing::info!(path = %png.display(), "wrote");

    // ── 5. summary.json ──────────────────────────────────────────────────────
    let manifest = Manifest {
        dem: args.dem.display().to_string(),
        figures: vec!["density_map.svg", "elevation_map.svg", "elevation_histogram.svg"],
        summary: &report.summary,
    };
    write_text(out, "summary.json", &serde_json::to_string_pretty(&manifest)?)?;

    let s = &report.summary;
    tracing::info!(
        raw = s.raw_records,
        distinct = s.distinct_points,
        pattern = s.pattern_points,
        elevated = s.with_elevation,
        missing_elevation = s.missing_elevation,
        "report complete"
    );
    Ok(())
}
