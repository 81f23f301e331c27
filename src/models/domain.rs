use geo::Point;
use serde::{Deserialize, Serialize};

/// Validated bounding box in degrees.
///
/// Only `core::geometry` constructs these, so holding one means the box is
/// non-degenerate and within the configured span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBoundingBox {
    pub(crate) south: f64,
    pub(crate) west: f64,
    pub(crate) north: f64,
    pub(crate) east: f64,
}

impl GeoBoundingBox {
    pub fn south(&self) -> f64 { self.south }
    pub fn west(&self) -> f64 { self.west }
    pub fn north(&self) -> f64 { self.north }
    pub fn east(&self) -> f64 { self.east }
}

/// Validated center + radius lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusQuery {
    pub(crate) lat: f64,
    pub(crate) lon: f64,
    pub(crate) radius_m: u32,
}

impl RadiusQuery {
    pub fn lat(&self) -> f64 { self.lat }
    pub fn lon(&self) -> f64 { self.lon }
    pub fn radius_m(&self) -> u32 { self.radius_m }

    /// Center as a geo point (x = lon, y = lat)
    pub fn center(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

/// Area an upstream query is restricted to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchArea {
    Radius(RadiusQuery),
    BoundingBox(GeoBoundingBox),
}

impl SearchArea {
    /// Reference point used for distances, when the caller supplied one
    pub fn reference_point(&self) -> Option<Point<f64>> {
        match self {
            SearchArea::Radius(query) => Some(query.center()),
            SearchArea::BoundingBox(_) => None,
        }
    }
}

/// Upstream query text plus the cache key derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub text: String,
    pub cache_key: String,
}

/// Where a feature came from. Ordering is merge priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoiSource {
    /// Commercial places API
    Primary,
    /// OpenStreetMap via Overpass
    Fallback,
}

/// Normalized point of interest
#[derive(Debug, Clone, PartialEq)]
pub struct PoiFeature {
    pub id: String,
    pub source: PoiSource,
    pub category: String,
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    pub address: Option<String>,
    pub website: Option<String>,
    pub distance_m: Option<f64>,
}
