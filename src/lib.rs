//! Nearby Places - gym and nutritionist lookup service
//!
//! Resolves nearby points of interest from a commercial places API and a
//! pool of OpenStreetMap Overpass mirrors, with result caching, mirror
//! failover and per-client rate limiting.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{Category, FilterSelection, GeometryLimits, InvalidGeometry, QueryBuilder};
pub use models::{Feature, FeatureCollection, GeoBoundingBox, PoiFeature, PoiSource, RadiusQuery, RadiusResponse};
pub use routes::{configure_routes, AppState};
