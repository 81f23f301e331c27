use crate::config::GeometrySettings;
use crate::models::{CenterPoint, GeoBoundingBox, RadiusQuery};
use thiserror::Error;
use validator::Validate;

/// Floating point slack when comparing a box span to its cap
const SPAN_EPSILON: f64 = 1e-9;

/// A geo query that must be rejected before any cache or network access
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid geometry: {0}")]
pub struct InvalidGeometry(pub String);

impl InvalidGeometry {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Accepted radius range and bounding-box span
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryLimits {
    pub min_radius_m: u32,
    pub max_radius_m: u32,
    pub default_radius_m: u32,
    pub max_bbox_span_deg: f64,
    pub clamp_radius: bool,
}

impl Default for GeometryLimits {
    fn default() -> Self {
        Self::from(&GeometrySettings::default())
    }
}

impl From<&GeometrySettings> for GeometryLimits {
    fn from(settings: &GeometrySettings) -> Self {
        Self {
            min_radius_m: settings.min_radius_m,
            max_radius_m: settings.max_radius_m.max(settings.min_radius_m),
            default_radius_m: settings
                .default_radius_m
                .clamp(settings.min_radius_m, settings.max_radius_m.max(settings.min_radius_m)),
            max_bbox_span_deg: settings.max_bbox_span_deg,
            clamp_radius: settings.clamp_radius,
        }
    }
}

/// Validate a center + radius lookup.
///
/// A missing radius falls back to the configured default. An out-of-range
/// radius is rejected unless clamping is enabled.
pub fn validate_radius(
    lat: Option<&str>,
    lon: Option<&str>,
    radius: Option<&str>,
    limits: &GeometryLimits,
) -> Result<RadiusQuery, InvalidGeometry> {
    let lat = parse_coordinate("lat", lat)?;
    let lon = parse_coordinate("lon", lon)?;

    let center = CenterPoint { lat, lon };
    if let Err(errors) = center.validate() {
        return Err(InvalidGeometry::new(format!("center out of range: {}", errors)));
    }

    let radius_m = match radius.map(str::trim).filter(|r| !r.is_empty()) {
        None => limits.default_radius_m,
        Some(raw) => {
            let value = parse_number("radius", raw)?;
            let min = f64::from(limits.min_radius_m);
            let max = f64::from(limits.max_radius_m);

            if limits.clamp_radius {
                value.clamp(min, max).round() as u32
            } else if value < min || value > max {
                return Err(InvalidGeometry::new(format!(
                    "radius must be between {} and {} meters",
                    limits.min_radius_m, limits.max_radius_m
                )));
            } else {
                value.round() as u32
            }
        }
    };

    Ok(RadiusQuery { lat, lon, radius_m })
}

/// Parse and validate `south,west,north,east`
pub fn parse_bbox(raw: &str, limits: &GeometryLimits) -> Result<GeoBoundingBox, InvalidGeometry> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(InvalidGeometry::new(
            "bbox must have four components: south,west,north,east",
        ));
    }

    let south = parse_number("south", parts[0])?;
    let west = parse_number("west", parts[1])?;
    let north = parse_number("north", parts[2])?;
    let east = parse_number("east", parts[3])?;

    validate_bbox(south, west, north, east, limits)
}

/// Validate an already numeric bounding box
pub fn validate_bbox(
    south: f64,
    west: f64,
    north: f64,
    east: f64,
    limits: &GeometryLimits,
) -> Result<GeoBoundingBox, InvalidGeometry> {
    if [south, west, north, east].iter().any(|v| !v.is_finite()) {
        return Err(InvalidGeometry::new("bbox must contain finite coordinates"));
    }
    if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
        return Err(InvalidGeometry::new("latitude must be within [-90, 90]"));
    }
    if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
        return Err(InvalidGeometry::new("longitude must be within [-180, 180]"));
    }
    if north <= south || east <= west {
        return Err(InvalidGeometry::new("bbox is degenerate: need north > south and east > west"));
    }

    let max_span = limits.max_bbox_span_deg;
    if north - south > max_span + SPAN_EPSILON || east - west > max_span + SPAN_EPSILON {
        return Err(InvalidGeometry::new(format!(
            "bbox span exceeds {} degrees, zoom in",
            max_span
        )));
    }

    Ok(GeoBoundingBox { south, west, north, east })
}

fn parse_coordinate(name: &str, raw: Option<&str>) -> Result<f64, InvalidGeometry> {
    match raw {
        Some(value) => parse_number(name, value),
        None => Err(InvalidGeometry::new(format!("missing {}", name))),
    }
}

fn parse_number(name: &str, raw: &str) -> Result<f64, InvalidGeometry> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| InvalidGeometry::new(format!("{} must be numeric", name)))?;

    // "NaN" and "inf" parse as f64
    if !value.is_finite() {
        return Err(InvalidGeometry::new(format!("{} must be finite", name)));
    }

    Ok(value)
}
