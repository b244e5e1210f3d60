//! Country boundary: the density window's source and the clipping mask.

use geo::{BoundingRect, Contains, Geometry, MultiPolygon, Point, Polygon, Rect};
use geojson::GeoJson;

use crate::config::Resolution;
use crate::error::{PipelineError, Result};

/// Natural Earth admin-0 property names checked when selecting a country.
const NAME_KEYS: [&str; 3] = ["ADMIN", "NAME", "NAME_LONG"];

/// Natural Earth admin-0 countries GeoJSON for a resolution tier.
pub fn natural_earth_url(resolution: Resolution) -> String {
    format!(
        "https://raw.githubusercontent.com/nvkelso/natural-earth-vector/master/geojson/ne_{}_admin_0_countries.geojson",
        resolution.scale()
    )
}

#[derive(Debug, Clone)]
pub struct Boundary {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
    bounds: Rect<f64>,
}

impl Boundary {
    pub fn from_polygons(name: &str, polygons: Vec<Polygon<f64>>) -> Result<Self> {
        let geometry = MultiPolygon(polygons);
        let bounds = geometry
            .bounding_rect()
            .ok_or_else(|| PipelineError::Boundary(format!("{name}: empty geometry")))?;
        Ok(Self {
            name: name.to_string(),
            geometry,
            bounds,
        })
    }

    /// Parse GeoJSON text. A FeatureCollection is searched for the feature
    /// named `country`; a bare Feature or Geometry is taken as-is.
    pub fn parse(text: &str, country: &str) -> Result<Self> {
        if country.trim().is_empty() {
            return Err(PipelineError::InvalidQuery("country_name"));
        }
        let feature = Self::select_feature(text, country)?;
        Self::from_geojson(&GeoJson::Feature(feature), country)
    }

    /// Pick the feature named `country` out of a FeatureCollection. A bare
    /// Feature or Geometry is returned unchanged.
    pub fn select_feature(text: &str, country: &str) -> Result<geojson::Feature> {
        match text.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(fc) => fc
                .features
                .into_iter()
                .find(|f| feature_matches(f, country))
                .ok_or_else(|| PipelineError::BoundaryNotFound(country.to_string())),
            GeoJson::Feature(f) => Ok(f),
            GeoJson::Geometry(g) => Ok(geojson::Feature::from(g)),
        }
    }

    fn from_geojson(gj: &GeoJson, name: &str) -> Result<Self> {
        let collection = geojson::quick_collection::<f64>(gj)?;
        let mut polygons = Vec::new();
        for geom in collection.0 {
            match geom {
                Geometry::Polygon(p) => polygons.push(p),
                Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
                _ => {}
            }
        }
        if polygons.is_empty() {
            return Err(PipelineError::Boundary(format!("{name}: no polygon in GeoJSON")));
        }
        tracing::debug!(boundary = name, parts = polygons.len(), "boundary parsed");
        Self::from_polygons(name, polygons)
    }

    /// Minimal axis-aligned rectangle enclosing every part.
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    /// Strict containment: points on an edge are outside.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.geometry.contains(&Point::new(lon, lat))
    }

    /// Exterior and interior rings as (lon, lat) vertex lists, for outlines.
    pub fn rings(&self) -> Vec<Vec<(f64, f64)>> {
        let mut out = Vec::new();
        for poly in &self.geometry.0 {
            out.push(poly.exterior().coords().map(|c| (c.x, c.y)).collect());
            for hole in poly.interiors() {
                out.push(hole.coords().map(|c| (c.x, c.y)).collect());
            }
        }
        out
    }
}

fn feature_matches(feature: &geojson::Feature, country: &str) -> bool {
    NAME_KEYS.iter().any(|key| {
        feature
            .property(*key)
            .and_then(|v| v.as_str())
            .is_some_and(|name| name.eq_ignore_ascii_case(country.trim()))
    })
}
