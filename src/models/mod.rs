// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{GeoBoundingBox, RadiusQuery, SearchArea, CompiledQuery, PoiSource, PoiFeature};
pub use requests::{PlacesParams, CenterPoint};
pub use responses::{Feature, FeatureCollection, RadiusResponse, Center, HealthResponse, ErrorResponse};
