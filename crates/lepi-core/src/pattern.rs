//! Spatial normalization: raw coordinate rows → CRS-tagged, deduplicated
//! points, and the windowed point pattern fed to density estimation.

use std::collections::HashSet;

use geo::Point;
use serde::Serialize;

use crate::boundary::Boundary;
use crate::occurrence::OccurrenceRecord;

/// Reference coordinate system of every point in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Crs {
    Wgs84,
}

impl Crs {
    pub fn epsg(self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
        }
    }
}

// ── Window ────────────────────────────────────────────────────────────────────

/// Axis-aligned analysis window in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Window {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Window {
    /// The boundary's bounding box, not its exact shape.
    pub fn from_boundary(boundary: &Boundary) -> Self {
        let r = boundary.bounds();
        Self {
            min_lon: r.min().x,
            max_lon: r.max().x,
            min_lat: r.min().y,
            max_lat: r.max().y,
        }
    }

    /// Closed-interval membership.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }
}

// ── Normalization ─────────────────────────────────────────────────────────────

/// Deduplicated, CRS-tagged occurrences.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub crs: Crs,
    /// First record seen for each distinct coordinate pair, input order.
    pub records: Vec<OccurrenceRecord>,
    /// Rows dropped for non-finite or out-of-range coordinates.
    pub malformed: usize,
    /// Rows dropped as exact repeats of an earlier coordinate pair.
    pub duplicates: usize,
}

impl Normalized {
    pub fn points(&self) -> Vec<Point<f64>> {
        self.records.iter().map(|r| Point::new(r.lon, r.lat)).collect()
    }
}

fn valid_wgs84(lon: f64, lat: f64) -> bool {
    lon.is_finite() && lat.is_finite() && (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat)
}

/// Bit-exact key; adding 0.0 folds -0.0 onto 0.0.
fn coord_key(lon: f64, lat: f64) -> (u64, u64) {
    ((lon + 0.0).to_bits(), (lat + 0.0).to_bits())
}

/// Tag with WGS84, skip malformed rows with a warning, and deduplicate by
/// exact coordinate match.
pub fn normalize(records: &[OccurrenceRecord]) -> Normalized {
    let mut seen: HashSet<(u64, u64)> = HashSet::with_capacity(records.len());
    let mut out = Vec::with_capacity(records.len());
    let mut malformed = 0usize;
    let mut duplicates = 0usize;

    for rec in records {
        if !valid_wgs84(rec.lon, rec.lat) {
            tracing::warn!(
                key = ?rec.key,
                lon = rec.lon,
                lat = rec.lat,
                "skipping occurrence with malformed coordinates"
            );
            malformed += 1;
            continue;
        }
        if seen.insert(coord_key(rec.lon, rec.lat)) {
            out.push(rec.clone());
        } else {
            duplicates += 1;
        }
    }

    tracing::info!(
        distinct = out.len(),
        duplicates,
        malformed,
        crs = Crs::Wgs84.epsg(),
        "normalized occurrences"
    );

    Normalized {
        crs: Crs::Wgs84,
        records: out,
        malformed,
        duplicates,
    }
}

// ── Point pattern ─────────────────────────────────────────────────────────────

/// Distinct points inside an analysis window.
#[derive(Debug, Clone)]
pub struct PointPattern {
    pub crs: Crs,
    pub window: Window,
    points: Vec<Point<f64>>,
    /// Points that fell outside the window.
    pub rejected: usize,
}

impl PointPattern {
    /// Restrict `points` to `window`. Repeated coordinates are collapsed, so
    /// the pattern never holds two identical pairs.
    pub fn new(crs: Crs, window: Window, points: &[Point<f64>]) -> Self {
        let mut seen: HashSet<(u64, u64)> = HashSet::with_capacity(points.len());
        let mut kept = Vec::with_capacity(points.len());
        let mut rejected = 0usize;
        for p in points {
            if !window.contains(p.x(), p.y()) {
                rejected += 1;
                continue;
            }
            if seen.insert(coord_key(p.x(), p.y())) {
                kept.push(*p);
            }
        }
        if rejected > 0 {
            tracing::warn!(rejected, "points outside the density window were dropped");
        }
        Self {
            crs,
            window,
            points: kept,
            rejected,
        }
    }

    pub fn points(&self) -> &[Point<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(lon: f64, lat: f64) -> OccurrenceRecord {
        OccurrenceRecord::new(lon, lat)
    }

    fn unit_window() -> Window {
        Window {
            min_lon: 10.0,
            max_lon: 14.0,
            min_lat: 42.0,
            max_lat: 46.0,
        }
    }

    #[test]
    fn dedup_size_equals_distinct_pairs() {
        let raw = vec![
            rec(12.5, 43.1),
            rec(12.5, 43.1),
            rec(11.0, 44.0),
            rec(12.5, 43.1),
            rec(11.0, 44.000001),
        ];
        let n = normalize(&raw);
        assert_eq!(n.records.len(), 3);
        assert_eq!(n.duplicates, 2);
        assert_eq!(n.crs.epsg(), 4326);
        // First occurrence order is preserved.
        assert_eq!((n.records[0].lon, n.records[0].lat), (12.5, 43.1));
    }

    #[test]
    fn dedup_keeps_first_record_of_a_pair() {
        let mut a = rec(12.5, 43.1);
        a.key = Some(1);
        let mut b = rec(12.5, 43.1);
        b.key = Some(2);
        let n = normalize(&[a, b]);
        assert_eq!(n.records.len(), 1);
        assert_eq!(n.records[0].key, Some(1));
    }

    #[test]
    fn negative_zero_is_the_same_coordinate() {
        let n = normalize(&[rec(0.0, 10.0), rec(-0.0, 10.0)]);
        assert_eq!(n.records.len(), 1);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let raw = vec![
            rec(f64::NAN, 43.0),
            rec(12.0, f64::INFINITY),
            rec(200.0, 43.0),
            rec(12.0, -91.0),
            rec(12.0, 43.0),
        ];
        let n = normalize(&raw);
        assert_eq!(n.malformed, 4);
        assert_eq!(n.records.len(), 1);
    }

    #[test]
    fn pattern_drops_points_outside_window() {
        let pts = vec![
            Point::new(12.0, 43.0),
            Point::new(14.0, 46.0), // on the corner, closed window keeps it
            Point::new(9.9, 43.0),
        ];
        let pp = PointPattern::new(Crs::Wgs84, unit_window(), &pts);
        assert_eq!(pp.len(), 2);
        assert_eq!(pp.rejected, 1);
    }

    #[test]
    fn pattern_never_holds_duplicates() {
        let pts = vec![Point::new(12.0, 43.0), Point::new(12.0, 43.0)];
        let pp = PointPattern::new(Crs::Wgs84, unit_window(), &pts);
        assert_eq!(pp.len(), 1);
        assert!(!pp.is_empty());
    }
}
