//! Occurrence records and the GBIF occurrence-search wire format.
//!
//! The HTTP transport lives in the `fetch` tool; this module owns the query
//! shape, page decoding and the record type every later stage consumes.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// GBIF caps `limit` at 300 per request.
pub const GBIF_MAX_PAGE: usize = 300;
pub const GBIF_API_BASE: &str = "https://api.gbif.org/v1";

/// One observed sighting in WGS84 degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceRecord {
    /// GBIF occurrence key, when the record came from the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    pub lon: f64,
    pub lat: f64,
    /// Metres above sea level; `None` until joined, or when the DEM has no
    /// value at this location.
    #[serde(default)]
    pub elevation: Option<f32>,
}

impl OccurrenceRecord {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            key: None,
            scientific_name: None,
            lon,
            lat,
            elevation: None,
        }
    }

    /// Copy of this record carrying a sampled elevation.
    pub fn with_elevation(&self, elevation: Option<f32>) -> Self {
        Self {
            elevation,
            ..self.clone()
        }
    }
}

// ── Query ─────────────────────────────────────────────────────────────────────

/// Occurrence search filter: species, country and the has-coordinate flag.
#[derive(Debug, Clone)]
pub struct OccurrenceQuery {
    pub species: String,
    pub country_code: String,
    pub has_coordinate: bool,
    /// Maximum number of records to collect across all pages.
    pub limit: usize,
}

impl OccurrenceQuery {
    pub fn new(species: &str, country_code: &str, limit: usize) -> Result<Self> {
        if species.trim().is_empty() {
            return Err(PipelineError::InvalidQuery("species"));
        }
        if country_code.trim().is_empty() {
            return Err(PipelineError::InvalidQuery("country_code"));
        }
        if limit == 0 {
            return Err(PipelineError::InvalidRecordLimit);
        }
        Ok(Self {
            species: species.trim().to_string(),
            country_code: country_code.trim().to_ascii_uppercase(),
            has_coordinate: true,
            limit,
        })
    }

    /// Query-string pairs for the page starting at `offset`.
    pub fn page_params(&self, offset: usize) -> Vec<(&'static str, String)> {
        let remaining = self.limit.saturating_sub(offset);
        vec![
            ("scientificName", self.species.clone()),
            ("country", self.country_code.clone()),
            ("hasCoordinate", self.has_coordinate.to_string()),
            ("limit", remaining.min(GBIF_MAX_PAGE).to_string()),
            ("offset", offset.to_string()),
        ]
    }

    pub fn search_url(base: &str) -> String {
        format!("{}/occurrence/search", base.trim_end_matches('/'))
    }
}

// ── Wire format ───────────────────────────────────────────────────────────────

/// One page of `/occurrence/search`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GbifPage {
    pub offset: usize,
    #[serde(default)]
    pub count: Option<usize>,
    pub end_of_records: bool,
    #[serde(default)]
    pub results: Vec<GbifOccurrence>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GbifOccurrence {
    #[serde(default)]
    pub key: Option<u64>,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub decimal_longitude: Option<f64>,
    #[serde(default)]
    pub decimal_latitude: Option<f64>,
}

impl GbifOccurrence {
    /// Presence of both coordinates is the only requirement here; range checks
    /// happen during normalization.
    pub fn into_record(self) -> Option<OccurrenceRecord> {
        Some(OccurrenceRecord {
            key: self.key,
            scientific_name: self.scientific_name,
            lon: self.decimal_longitude?,
            lat: self.decimal_latitude?,
            elevation: None,
        })
    }
}

impl GbifPage {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Records with both coordinates, and the number dropped for lacking one.
    pub fn into_records(self) -> (Vec<OccurrenceRecord>, usize) {
        let total = self.results.len();
        let records: Vec<OccurrenceRecord> =
            self.results.into_iter().filter_map(GbifOccurrence::into_record).collect();
        let skipped = total - records.len();
        (records, skipped)
    }
}

/// Offset of the next page, or `None` when collection should stop.
pub fn next_offset(page: &GbifPage, returned: usize, collected: usize, limit: usize) -> Option<usize> {
    if page.end_of_records || returned == 0 || collected >= limit {
        return None;
    }
    Some(page.offset + returned)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "offset": 0, "limit": 3, "endOfRecords": false, "count": 7,
        "results": [
            {"key": 11, "scientificName": "Parnassius apollo (Linnaeus, 1758)",
             "decimalLongitude": 12.5, "decimalLatitude": 43.1, "country": "IT"},
            {"key": 12, "decimalLongitude": 11.0},
            {"key": 13, "decimalLongitude": 11.0, "decimalLatitude": 44.0}
        ]
    }"#;

    #[test]
    fn page_decodes_and_skips_missing_coordinates() {
        let page = GbifPage::from_json(PAGE).unwrap();
        assert!(!page.end_of_records);
        assert_eq!(page.count, Some(7));
        let (records, skipped) = page.into_records();
        assert_eq!(skipped, 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, Some(11));
        assert_eq!((records[1].lon, records[1].lat), (11.0, 44.0));
        assert!(records.iter().all(|r| r.elevation.is_none()));
    }

    #[test]
    fn query_rejects_empty_strings() {
        assert!(matches!(
            OccurrenceQuery::new("", "IT", 10),
            Err(PipelineError::InvalidQuery("species"))
        ));
        assert!(matches!(
            OccurrenceQuery::new("Parnassius apollo", " ", 10),
            Err(PipelineError::InvalidQuery("country_code"))
        ));
    }

    #[test]
    fn query_rejects_zero_limit() {
        assert!(matches!(
            OccurrenceQuery::new("Parnassius apollo", "IT", 0),
            Err(PipelineError::InvalidRecordLimit)
        ));
    }

    #[test]
    fn page_params_cap_at_service_maximum() {
        let q = OccurrenceQuery::new("Parnassius apollo", "it", 500).unwrap();
        let first = q.page_params(0);
        assert!(first.contains(&("country", "IT".to_string())));
        assert!(first.contains(&("hasCoordinate", "true".to_string())));
        assert!(first.contains(&("limit", "300".to_string())));
        let second = q.page_params(300);
        assert!(second.contains(&("limit", "200".to_string())));
        assert!(second.contains(&("offset", "300".to_string())));
    }

    #[test]
    fn paging_stops_at_end_or_limit() {
        let page = GbifPage::from_json(PAGE).unwrap();
        assert_eq!(next_offset(&page, 3, 3, 500), Some(3));
        assert_eq!(next_offset(&page, 3, 500, 500), None);
        assert_eq!(next_offset(&page, 0, 3, 500), None);
        let last: GbifPage =
            GbifPage::from_json(r#"{"offset": 3, "endOfRecords": true, "results": []}"#).unwrap();
        assert_eq!(next_offset(&last, 0, 3, 500), None);
    }

    #[test]
    fn search_url_trims_slash() {
        assert_eq!(
            OccurrenceQuery::search_url("https://api.gbif.org/v1/"),
            "https://api.gbif.org/v1/occurrence/search"
        );
    }

    #[test]
    fn record_roundtrips_without_optional_fields() {
        let r: OccurrenceRecord = serde_json::from_str(r#"{"lon": 1.5, "lat": 2.5}"#).unwrap();
        assert_eq!(r, OccurrenceRecord::new(1.5, 2.5));
        let enriched = r.with_elevation(Some(120.0));
        assert_eq!(enriched.elevation, Some(120.0));
        assert_eq!(r.elevation, None);
    }
}
