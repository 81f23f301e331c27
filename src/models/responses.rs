use serde::{Deserialize, Serialize};
use crate::models::domain::{PoiFeature, PoiSource};

/// GeoJSON-like feature, the shape map libraries consume directly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub geometry: PointGeometry,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    /// `[lon, lat]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub source: PoiSource,
    pub name: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

impl From<PoiFeature> for Feature {
    fn from(poi: PoiFeature) -> Self {
        Self {
            kind: "Feature".to_string(),
            id: poi.id,
            geometry: PointGeometry {
                kind: "Point".to_string(),
                coordinates: [poi.lon, poi.lat],
            },
            properties: FeatureProperties {
                source: poi.source,
                name: poi.name,
                category: poi.category,
                address: poi.address,
                website: poi.website,
                distance_m: poi.distance_m.map(|d| d.round()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

/// Response for center + radius lookups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiusResponse {
    pub center: Center,
    pub radius: u32,
    pub results: Vec<Feature>,
}

/// Response for bounding-box lookups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: "FeatureCollection".to_string(),
            features,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub cache_entries: u64,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
