use serde::{Deserialize, Serialize};
use validator::Validate;

/// Raw query parameters of `GET /places`.
///
/// Built from the decoded `(name, value)` pairs so repeated keys such as
/// `filters[]=gym&filters[]=nutritionist` survive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacesParams {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub radius: Option<String>,
    pub bbox: Option<String>,
    pub filters: Vec<String>,
}

impl PlacesParams {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();

        for (name, value) in pairs {
            match name.as_str() {
                "lat" => params.lat = Some(value),
                "lon" | "lng" => params.lon = Some(value),
                "radius" => params.radius = Some(value),
                "bbox" => params.bbox = Some(value),
                "types" | "type" | "filters" | "filters[]" | "types[]" => params.filters.push(value),
                _ => tracing::trace!("Ignoring unknown query parameter: {}", name),
            }
        }

        params
    }
}

/// Parsed center coordinates, range-checked before a `RadiusQuery` is built
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct CenterPoint {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lon: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_repeated_filters_are_collected() {
        let params = PlacesParams::from_pairs(pairs(&[
            ("bbox", "33.8,35.4,33.9,35.6"),
            ("filters[]", "gym"),
            ("filters[]", "nutritionist"),
        ]));

        assert_eq!(params.bbox.as_deref(), Some("33.8,35.4,33.9,35.6"));
        assert_eq!(params.filters, vec!["gym", "nutritionist"]);
        assert!(params.lat.is_none());
    }

    #[test]
    fn test_lng_alias_and_unknown_keys() {
        let params = PlacesParams::from_pairs(pairs(&[
            ("lat", "33.89"),
            ("lng", "35.50"),
            ("page", "2"),
            ("types", "gym,nutritionist"),
        ]));

        assert_eq!(params.lon.as_deref(), Some("35.50"));
        assert_eq!(params.filters, vec!["gym,nutritionist"]);
    }

    #[test]
    fn test_center_point_range() {
        assert!(CenterPoint { lat: 33.9, lon: 35.5 }.validate().is_ok());
        assert!(CenterPoint { lat: 91.0, lon: 35.5 }.validate().is_err());
        assert!(CenterPoint { lat: 0.0, lon: -180.5 }.validate().is_err());
    }
}
