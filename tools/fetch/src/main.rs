/// Acquisition tool: pages GBIF occurrence search for one species in one
/// country and downloads the matching Natural Earth admin-0 boundary.
///
/// Writes `occurrences.json` (array of OccurrenceRecord) and
/// `boundary.geojson` (the selected Feature) into the output directory, where
/// the `report` tool picks them up.
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::blocking::Client;
use tracing_subscriber::EnvFilter;

use lepi_core::boundary::{natural_earth_url, Boundary};
use lepi_core::config::{PipelineConfig, Resolution};
use lepi_core::PipelineError;
use lepi_core::occurrence::{next_offset, GbifPage, OccurrenceQuery, OccurrenceRecord, GBIF_API_BASE};

// ── Constants ────────────────────────────────────────────────────────────────

const USER_AGENT: &str = concat!("lepi-atlas-fetch/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "fetch",
    about = "Download GBIF occurrences and a Natural Earth country boundary"
)]
struct Args {
    /// JSON config file; fields absent from it keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scientific name to query (overrides config)
    #[arg(long)]
    species: Option<String>,

    /// ISO-3166 alpha-2 country code for the occurrence filter (overrides config)
    #[arg(long)]
    country_code: Option<String>,

    /// Country name matched against the boundary dataset (overrides config)
    #[arg(long)]
    country_name: Option<String>,

    /// Boundary resolution: small (110m), medium (50m) or large (10m)
    #[arg(long)]
    resolution: Option<Resolution>,

    /// Maximum number of occurrence records to collect
    #[arg(long)]
    limit: Option<usize>,

    /// GBIF API base URL
    #[arg(long, default_value = GBIF_API_BASE)]
    gbif_api: String,

    /// Output directory (created if absent)
    #[arg(short, long, default_value = "data/raw")]
    output: PathBuf,
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
        if let Some(s) = &self.species {
            cfg.species = s.clone();
        }
        if let Some(c) = &self.country_code {
            cfg.country_code = c.clone();
        }
        if let Some(n) = &self.country_name {
            cfg.country_name = n.clone();
        }
        if let Some(r) = self.resolution {
            cfg.resolution = r;
        }
        if let Some(l) = self.limit {
            cfg.record_limit = l;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

// ── Occurrences ──────────────────────────────────────────────────────────────

fn fetch_occurrences(client: &Client, base: &str, query: &OccurrenceQuery) -> Result<Vec<OccurrenceRecord>> {
    let url = OccurrenceQuery::search_url(base);
    let mut records: Vec<OccurrenceRecord> = Vec::new();
    let mut skipped = 0usize;
    let mut offset = 0usize;

    loop {
        let text = client
            .get(&url)
            .query(&query.page_params(offset))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .with_context(|| format!("GBIF request failed at offset {offset}"))?;
        let page = GbifPage::from_json(&text).context("Unexpected GBIF response")?;

        let returned = page.results.len();
        let next = {
            let collected = records.len() + returned;
            next_offset(&page, returned, collected, query.limit)
        };
        let (mut batch, dropped) = page.into_records();
        skipped += dropped;
        records.append(&mut batch);

        tracing::info!(offset, returned, collected = records.len(), "GBIF page");
        match next {
            Some(o) => offset = o,
            None => break,
        }
    }

    records.truncate(query.limit);
    if skipped > 0 {
        tracing::warn!(skipped, "records without coordinates skipped");
    }
    Ok(records)
}

// ── Boundary ─────────────────────────────────────────────────────────────────

fn fetch_boundary(client: &Client, cfg: &PipelineConfig) -> Result<geojson::Feature> {
    let url = natural_earth_url(cfg.resolution);
    tracing::info!(%url, "downloading boundary dataset");
    let text = client
        .get(&url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.text())
        .with_context(|| format!("Boundary download failed: {url}"))?;

    let feature = Boundary::select_feature(&text, &cfg.country_name)?;
    // Reject features without polygonal geometry before caching them.
    let boundary = Boundary::parse(&serde_json::to_string(&feature)?, &cfg.country_name)?;
    let b = boundary.bounds();
    tracing::info!(
        country = %boundary.name,
        parts = boundary.geometry.0.len(),
        min_lon = b.min().x,
        max_lon = b.max().x,
        min_lat = b.min().y,
        max_lat = b.max().y,
        "boundary selected"
    );
    Ok(feature)
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = args.pipeline_config()?;
    let query = OccurrenceQuery::new(&cfg.species, &cfg.country_code, cfg.record_limit)?;

    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("Cannot build HTTP client")?;

    tracing::info!(species = %query.species, country = %query.country_code, limit = query.limit, "querying GBIF");
    let records = fetch_occurrences(&client, &args.gbif_api, &query)?;
    if records.is_empty() {
        return Err(PipelineError::EmptyOccurrences {
            species: query.species.clone(),
            country: query.country_code.clone(),
        }
        .into());
    }

    let feature = fetch_boundary(&client, &cfg)?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;

    let occ_path = args.output.join("occurrences.json");
    fs::write(&occ_path, serde_json::to_string_pretty(&records)?)
        .with_context(|| format!("Cannot write {}", occ_path.display()))?;
    tracing::info!(records = records.len(), path = %occ_path.display(), "wrote occurrences");

    let boundary_path = args.output.join("boundary.geojson");
    fs::write(&boundary_path, serde_json::to_string(&feature)?)
        .with_context(|| format!("Cannot write {}", boundary_path.display()))?;
    tracing::info!(path = %boundary_path.display(), "wrote boundary");

    Ok(())
}
