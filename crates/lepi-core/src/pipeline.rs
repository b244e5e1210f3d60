//! Pipeline orchestrator: normalization → density → elevation join →
//! histogram, in that order, exactly once.

use serde::Serialize;

use crate::boundary::Boundary;
use crate::config::PipelineConfig;
use crate::elevation::ElevationSurface;
use crate::error::{PipelineError, Result};
use crate::histogram::Histogram;
use crate::join::{join_elevation, with_elevation, ElevatedOccurrence};
use crate::kde::{estimate_density, DensitySurface, KdeParams};
use crate::occurrence::OccurrenceRecord;
use crate::pattern::{normalize, Normalized, PointPattern, Window};

/// Everything acquisition hands over.
pub struct Inputs {
    pub records: Vec<OccurrenceRecord>,
    pub boundary: Boundary,
    pub dem: ElevationSurface,
}

/// Counts and parameters written next to the figures.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub species: String,
    pub country: String,
    pub crs_epsg: u32,
    pub raw_records: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub distinct_points: usize,
    pub outside_window: usize,
    pub pattern_points: usize,
    pub sigma: f64,
    pub grid: [usize; 2],
    pub window: Window,
    pub defined_cells: usize,
    pub masked_cells: usize,
    pub density_range: Option<[f64; 2]>,
    pub with_elevation: usize,
    pub missing_elevation: usize,
    pub histogram: Histogram,
}

pub struct Report {
    pub normalized: Normalized,
    pub pattern: PointPattern,
    /// Density over the bounding-box window, masked to the boundary.
    pub density: DensitySurface,
    /// Every distinct occurrence, elevation attached where available.
    pub joined: Vec<OccurrenceRecord>,
    /// The subset feeding the elevation map and histogram.
    pub elevated: Vec<ElevatedOccurrence>,
    pub histogram: Histogram,
    pub summary: Summary,
}

pub fn run(inputs: &Inputs, cfg: &PipelineConfig) -> Result<Report> {
    cfg.validate()?;
    if inputs.records.is_empty() {
        return Err(PipelineError::EmptyOccurrences {
            species: cfg.species.clone(),
            country: cfg.country_code.clone(),
        });
    }

    // ── Normalization ────────────────────────────────────────────────────────
    let normalized = normalize(&inputs.records);
    let window = Window::from_boundary(&inputs.boundary);
    let pattern = PointPattern::new(normalized.crs, window, &normalized.points());

    // ── Density: bounding-box window first, exact polygon mask second ───────
    let params = KdeParams {
        sigma: cfg.sigma,
        width: cfg.grid_width,
        height: cfg.grid_height,
        edge_correction: cfg.edge_correction,
    };
    let mut density = estimate_density(&pattern, &params)?;
    let masked_cells = density.mask_to(&inputs.boundary);

    // ── Elevation join over all distinct occurrences ─────────────────────────
    let joined = join_elevation(&normalized.records, &inputs.dem);
    let (elevated, missing_elevation) = with_elevation(&joined);

    let elevations: Vec<f32> = elevated.iter().map(|e| e.elevation).collect();
    let histogram = Histogram::from_values(&elevations, cfg.bin_width)?;

    let summary = Summary {
        species: cfg.species.clone(),
        country: cfg.country_name.clone(),
        crs_epsg: normalized.crs.epsg(),
        raw_records: inputs.records.len(),
        malformed: normalized.malformed,
        duplicates: normalized.duplicates,
        distinct_points: normalized.records.len(),
        outside_window: pattern.rejected,
        pattern_points: pattern.len(),
        sigma: cfg.sigma,
        grid: [density.width, density.height],
        window,
        defined_cells: density.defined_cells(),
        masked_cells,
        density_range: density.value_range().map(|(lo, hi)| [lo, hi]),
        with_elevation: elevated.len(),
        missing_elevation,
        histogram: histogram.clone(),
    };

    tracing::info!(
        pattern_points = summary.pattern_points,
        with_elevation = summary.with_elevation,
        missing_elevation,
        bins = histogram.counts.len(),
        "pipeline complete"
    );

    Ok(Report {
        normalized,
        pattern,
        density,
        joined,
        elevated,
        histogram,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};

    fn square_boundary() -> Boundary {
        let sq = Polygon::new(
            LineString::from(vec![(10.0, 42.0), (14.0, 42.0), (14.0, 46.0), (10.0, 46.0), (10.0, 42.0)]),
            vec![],
        );
        Boundary::from_polygons("Square", vec![sq]).unwrap()
    }

    /// 1° cells over the square; the cell holding (11.0, 44.0) is no-data and
    /// the cell holding (12.5, 43.1) is 120 m.
    fn dem() -> ElevationSurface {
        let mut s = ElevationSurface::new(4, 4, 10.0, 14.0, 42.0, 46.0, 500.0);
        s.set(1, 2, 120.0);
        s.set(2, 1, f32::NAN);
        s
    }

    fn cfg() -> PipelineConfig {
        PipelineConfig {
            grid_width: 32,
            grid_height: 32,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn duplicate_and_missing_elevation_scenario() {
        let inputs = Inputs {
            records: vec![
                OccurrenceRecord::new(12.5, 43.1),
                OccurrenceRecord::new(12.5, 43.1),
                OccurrenceRecord::new(11.0, 44.0),
            ],
            boundary: square_boundary(),
            dem: dem(),
        };
        let report = run(&inputs, &cfg()).unwrap();

        assert_eq!(report.pattern.len(), 2);
        assert_eq!(report.summary.duplicates, 1);
        assert_eq!(report.elevated.len(), 1);
        assert_eq!(report.elevated[0].elevation, 120.0);
        assert_eq!(report.summary.missing_elevation, 1);
        assert_eq!(report.histogram.total(), 1);
        assert_eq!(report.histogram.origin, 100.0);
    }

    #[test]
    fn missing_elevation_point_still_shapes_density() {
        let inputs = Inputs {
            records: vec![OccurrenceRecord::new(12.5, 43.1), OccurrenceRecord::new(11.0, 44.0)],
            boundary: square_boundary(),
            dem: dem(),
        };
        let report = run(&inputs, &cfg()).unwrap();
        assert!(report
            .pattern
            .points()
            .iter()
            .any(|p| p.x() == 11.0 && p.y() == 44.0));
        assert!(!report.elevated.iter().any(|e| e.lon == 11.0 && e.lat == 44.0));

        // Removing that point changes the surface near it.
        let alone = Inputs {
            records: vec![OccurrenceRecord::new(12.5, 43.1)],
            boundary: square_boundary(),
            dem: dem(),
        };
        let solo = run(&alone, &cfg()).unwrap();
        assert_ne!(report.density.values, solo.density.values);
        assert_eq!(report.histogram, solo.histogram);
    }

    #[test]
    fn empty_occurrences_are_fatal() {
        let inputs = Inputs {
            records: vec![],
            boundary: square_boundary(),
            dem: dem(),
        };
        assert!(matches!(
            run(&inputs, &cfg()),
            Err(PipelineError::EmptyOccurrences { .. })
        ));
    }

    #[test]
    fn no_point_inside_window_is_fatal() {
        let inputs = Inputs {
            records: vec![OccurrenceRecord::new(30.0, 10.0)],
            boundary: square_boundary(),
            dem: dem(),
        };
        assert!(matches!(run(&inputs, &cfg()), Err(PipelineError::EmptyPointPattern)));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let inputs = Inputs {
            records: vec![OccurrenceRecord::new(12.5, 43.1), OccurrenceRecord::new(13.2, 45.0)],
            boundary: square_boundary(),
            dem: dem(),
        };
        let a = run(&inputs, &cfg()).unwrap();
        let b = run(&inputs, &cfg()).unwrap();
        assert_eq!(a.joined, b.joined);
        assert_eq!(a.density.values, b.density.values);
        assert_eq!(
            serde_json::to_string(&a.summary).unwrap(),
            serde_json::to_string(&b.summary).unwrap()
        );
    }
}
