// Core algorithm exports
pub mod distance;
pub mod geometry;
pub mod merge;
pub mod query;

pub use distance::haversine_meters;
pub use geometry::{parse_bbox, validate_bbox, validate_radius, GeometryLimits, InvalidGeometry};
pub use merge::merge;
pub use query::{Category, FilterSelection, QueryBuilder};
