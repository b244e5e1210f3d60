//! Elevation join: attach a DEM sample to every occurrence, then split off
//! the subset usable by elevation-dependent outputs.

use serde::Serialize;

use crate::elevation::ElevationSurface;
use crate::occurrence::OccurrenceRecord;

/// An occurrence whose elevation lookup succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ElevatedOccurrence {
    pub lon: f64,
    pub lat: f64,
    pub elevation: f32,
}

/// Enriched copies of `records`; inputs are left untouched.
pub fn join_elevation(records: &[OccurrenceRecord], dem: &ElevationSurface) -> Vec<OccurrenceRecord> {
    records
        .iter()
        .map(|r| r.with_elevation(dem.sample(r.lon, r.lat)))
        .collect()
}

/// Records with a sampled elevation, and how many were dropped for lacking one.
pub fn with_elevation(joined: &[OccurrenceRecord]) -> (Vec<ElevatedOccurrence>, usize) {
    let elevated: Vec<ElevatedOccurrence> = joined
        .iter()
        .filter_map(|r| {
            r.elevation.map(|elevation| ElevatedOccurrence {
                lon: r.lon,
                lat: r.lat,
                elevation,
            })
        })
        .collect();
    let missing = joined.len() - elevated.len();
    if missing > 0 {
        tracing::warn!(
            missing,
            kept = elevated.len(),
            "occurrences without elevation excluded from elevation outputs"
        );
    }
    (elevated, missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dem() -> ElevationSurface {
        // 4×4 one-degree cells over 10–14°E, 42–46°N; value = 100·row + col.
        let mut s = ElevationSurface::new(4, 4, 10.0, 14.0, 42.0, 46.0, 0.0);
        for r in 0..4 {
            for c in 0..4 {
                s.set(r, c, (100 * r + c) as f32);
            }
        }
        s.set(2, 1, f32::NAN);
        s
    }

    #[test]
    fn join_is_deterministic() {
        let recs = vec![
            OccurrenceRecord::new(12.5, 43.1),
            OccurrenceRecord::new(11.0, 44.0),
            OccurrenceRecord::new(13.9, 45.9),
        ];
        let a = join_elevation(&recs, &dem());
        let b = join_elevation(&recs, &dem());
        assert_eq!(a, b);
        assert_eq!(a[0].elevation, Some(102.0));
        assert_eq!(a[1].elevation, None); // no-data cell
        assert_eq!(a[2].elevation, Some(303.0));
        assert!(recs.iter().all(|r| r.elevation.is_none()));
    }

    #[test]
    fn records_outside_coverage_are_dropped_from_elevated_subset() {
        let recs = vec![OccurrenceRecord::new(12.5, 43.1), OccurrenceRecord::new(20.0, 43.1)];
        let joined = join_elevation(&recs, &dem());
        let (elevated, missing) = with_elevation(&joined);
        assert_eq!(missing, 1);
        assert_eq!(elevated, vec![ElevatedOccurrence { lon: 12.5, lat: 43.1, elevation: 102.0 }]);
    }
}
