//! Normalization of source-native records into [`PoiFeature`]s, and the
//! multi-source merge that deduplicates them.

use crate::core::distance::{haversine_meters, quantize};
use crate::core::query::Category;
use crate::models::{PoiFeature, PoiSource};
use geo::Point;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Decimals kept for coordinates in the dedup key (about 11 m)
pub const DEDUP_DECIMALS: u32 = 4;

/// Maps one source-native record to a feature, or drops it
pub trait PoiMapper {
    fn map_record(&self, record: &Value) -> Option<PoiFeature>;
}

/// One source's normalized results
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub source: PoiSource,
    pub features: Vec<PoiFeature>,
}

impl SourceBatch {
    /// Normalize `records` with `mapper`, dropping records it rejects
    pub fn from_records<M: PoiMapper>(source: PoiSource, records: &[Value], mapper: &M) -> Self {
        let features: Vec<PoiFeature> = records.iter().filter_map(|r| mapper.map_record(r)).collect();

        if features.len() < records.len() {
            tracing::debug!(
                "Dropped {} of {} {:?} records without usable coordinates",
                records.len() - features.len(),
                records.len(),
                source
            );
        }

        Self { source, features }
    }
}

/// Normalize Overpass `elements[]`, measuring distance from `center` when known
pub fn normalize_overpass(records: &[Value], center: Option<Point<f64>>) -> SourceBatch {
    SourceBatch::from_records(PoiSource::Fallback, records, &OverpassMapper { center })
}

/// Normalize commercial places API `results[]` for one category
pub fn normalize_places(records: &[Value], category: Category, center: Option<Point<f64>>) -> SourceBatch {
    SourceBatch::from_records(PoiSource::Primary, records, &PlacesMapper { category, center })
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    element_type: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<LatLon>,
    #[serde(default)]
    tags: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct LatLon {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn coordinates(&self) -> Option<(f64, f64)> {
        let (lon, lat) = match (self.lon, self.lat) {
            (Some(lon), Some(lat)) => (lon, lat),
            _ => self.center.as_ref().map(|c| (c.lon, c.lat))?,
        };
        (lon.is_finite() && lat.is_finite()).then_some((lon, lat))
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn address(&self) -> Option<String> {
        if let Some(full) = self.tag("addr:full") {
            return Some(full.to_string());
        }

        let street = match (self.tag("addr:housenumber"), self.tag("addr:street")) {
            (Some(number), Some(street)) => Some(format!("{} {}", number, street)),
            (None, Some(street)) => Some(street.to_string()),
            _ => None,
        };

        let parts: Vec<String> = [street, self.tag("addr:city").map(str::to_string)]
            .into_iter()
            .flatten()
            .collect();

        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

/// Maps Overpass `elements[]` entries
#[derive(Debug, Clone, Copy, Default)]
pub struct OverpassMapper {
    pub center: Option<Point<f64>>,
}

impl PoiMapper for OverpassMapper {
    fn map_record(&self, record: &Value) -> Option<PoiFeature> {
        let element: OverpassElement = serde_json::from_value(record.clone()).ok()?;
        let (lon, lat) = element.coordinates()?;

        let category = Category::classify(&element.tags)
            .map(Category::name)
            .unwrap_or("other")
            .to_string();
        let name = element
            .tag("name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("Unnamed {}", category));
        let website = element
            .tag("website")
            .or_else(|| element.tag("contact:website"))
            .map(str::to_string);

        Some(PoiFeature {
            id: format!("osm:{}:{}", element.element_type, element.id),
            source: PoiSource::Fallback,
            address: element.address(),
            website,
            distance_m: self.center.map(|c| haversine_meters(c, Point::new(lon, lat))),
            category,
            name,
            lon,
            lat,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PlaceRecord {
    fsq_id: Option<String>,
    name: Option<String>,
    geocodes: Option<Geocodes>,
    location: Option<PlaceLocation>,
    distance: Option<f64>,
    website: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Geocodes {
    main: Option<Geocode>,
}

#[derive(Debug, Deserialize)]
struct Geocode {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct PlaceLocation {
    formatted_address: Option<String>,
    address: Option<String>,
}

/// Maps commercial places API `results[]` entries for one category
#[derive(Debug, Clone, Copy)]
pub struct PlacesMapper {
    pub category: Category,
    pub center: Option<Point<f64>>,
}

impl PoiMapper for PlacesMapper {
    fn map_record(&self, record: &Value) -> Option<PoiFeature> {
        let place: PlaceRecord = serde_json::from_value(record.clone()).ok()?;
        let geocode = place.geocodes.and_then(|g| g.main)?;
        let (lon, lat) = (geocode.longitude, geocode.latitude);
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }

        let name = place
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Unnamed {}", self.category.name()));
        let id = match place.fsq_id {
            Some(id) => format!("places:{}", id),
            None => format!("places:{:.6},{:.6}", lat, lon),
        };
        let address = place
            .location
            .and_then(|l| l.formatted_address.or(l.address))
            .filter(|a| !a.trim().is_empty());
        let distance_m = place
            .distance
            .or_else(|| self.center.map(|c| haversine_meters(c, Point::new(lon, lat))));

        Some(PoiFeature {
            id,
            source: PoiSource::Primary,
            category: self.category.name().to_string(),
            name,
            lon,
            lat,
            address,
            website: place.website.filter(|w| !w.trim().is_empty()),
            distance_m,
        })
    }
}

/// Identity used to collapse the same place reported twice
pub fn dedup_key(feature: &PoiFeature) -> (String, i64, i64) {
    (
        feature.name.trim().to_lowercase(),
        quantize(feature.lon, DEDUP_DECIMALS),
        quantize(feature.lat, DEDUP_DECIMALS),
    )
}

/// Merge batches in source priority order, first-seen wins.
///
/// With `sort_by_distance`, the result is stably sorted ascending by distance
/// and features without one go last; otherwise source order is kept.
pub fn merge(mut batches: Vec<SourceBatch>, sort_by_distance: bool) -> Vec<PoiFeature> {
    batches.sort_by_key(|batch| batch.source);

    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    let mut duplicates = 0usize;

    for batch in batches {
        for feature in batch.features {
            if seen.insert(dedup_key(&feature)) {
                merged.push(feature);
            } else {
                duplicates += 1;
            }
        }
    }

    if duplicates > 0 {
        tracing::debug!("Merged {} features, dropped {} duplicates", merged.len(), duplicates);
    }

    if sort_by_distance {
        merged.sort_by(|a, b| match (a.distance_m, b.distance_m) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn center() -> Point<f64> {
        Point::new(35.5018, 33.8938)
    }

    #[test]
    fn test_overpass_node_and_way_center() {
        let mapper = OverpassMapper { center: Some(center()) };

        let node = json!({
            "type": "node", "id": 42, "lat": 33.8950, "lon": 35.5030,
            "tags": {"amenity": "fitness_centre", "name": "Iron Gym", "addr:street": "Hamra", "addr:housenumber": "12"}
        });
        let feature = mapper.map_record(&node).unwrap();
        assert_eq!(feature.id, "osm:node:42");
        assert_eq!(feature.category, "gym");
        assert_eq!(feature.address.as_deref(), Some("12 Hamra"));
        assert!(feature.distance_m.unwrap() > 0.0);

        let way = json!({
            "type": "way", "id": 7, "center": {"lat": 33.9, "lon": 35.51},
            "tags": {"healthcare": "nutritionist", "contact:website": "https://diet.example"}
        });
        let feature = mapper.map_record(&way).unwrap();
        assert_eq!((feature.lon, feature.lat), (35.51, 33.9));
        assert_eq!(feature.name, "Unnamed nutritionist");
        assert_eq!(feature.website.as_deref(), Some("https://diet.example"));
    }

    #[test]
    fn test_overpass_record_without_coordinates_dropped() {
        let records = vec![
            json!({"type": "relation", "id": 1, "tags": {"leisure": "fitness_centre"}}),
            json!({"type": "node", "id": 2, "lat": 1.0, "lon": 2.0}),
        ];
        let batch = SourceBatch::from_records(PoiSource::Fallback, &records, &OverpassMapper::default());

        assert_eq!(batch.features.len(), 1);
        assert_eq!(batch.features[0].category, "other");
        assert!(batch.features[0].distance_m.is_none());
    }

    #[test]
    fn test_places_record_mapping() {
        let mapper = PlacesMapper { category: Category::Gym, center: Some(center()) };
        let record = json!({
            "fsq_id": "abc",
            "name": "Fit Club",
            "geocodes": {"main": {"latitude": 33.894, "longitude": 35.502}},
            "location": {"formatted_address": "Bliss St, Beirut"},
            "distance": 87
        });

        let feature = mapper.map_record(&record).unwrap();
        assert_eq!(feature.id, "places:abc");
        assert_eq!(feature.source, PoiSource::Primary);
        assert_eq!(feature.distance_m, Some(87.0));
        assert_eq!(feature.address.as_deref(), Some("Bliss St, Beirut"));

        assert!(mapper.map_record(&json!({"name": "No coords"})).is_none());
    }

    fn feature(source: PoiSource, name: &str, lon: f64, lat: f64, distance: Option<f64>) -> PoiFeature {
        PoiFeature {
            id: format!("{:?}:{}", source, name),
            source,
            category: "gym".to_string(),
            name: name.to_string(),
            lon,
            lat,
            address: None,
            website: None,
            distance_m: distance,
        }
    }

    #[test]
    fn test_merge_deduplicates_with_primary_priority() {
        let fallback = SourceBatch {
            source: PoiSource::Fallback,
            features: vec![feature(PoiSource::Fallback, "iron gym", 35.5, 33.9, Some(10.0))],
        };
        let primary = SourceBatch {
            source: PoiSource::Primary,
            features: vec![feature(PoiSource::Primary, "Iron Gym ", 35.5, 33.9, Some(12.0))],
        };

        // fallback listed first on purpose
        let merged = merge(vec![fallback, primary], false);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, PoiSource::Primary);
        assert_eq!(merged[0].distance_m, Some(12.0));
    }

    #[test]
    fn test_merge_keeps_distinct_places() {
        let batch = SourceBatch {
            source: PoiSource::Fallback,
            features: vec![
                feature(PoiSource::Fallback, "Gym", 35.5, 33.9, None),
                feature(PoiSource::Fallback, "Gym", 35.51, 33.9, None),
                feature(PoiSource::Fallback, "Other Gym", 35.5, 33.9, None),
            ],
        };
        assert_eq!(merge(vec![batch], false).len(), 3);
    }

    #[test]
    fn test_merge_sorts_by_distance_with_missing_last() {
        let batch = SourceBatch {
            source: PoiSource::Fallback,
            features: vec![
                feature(PoiSource::Fallback, "far", 35.0, 33.0, Some(900.0)),
                feature(PoiSource::Fallback, "unknown", 35.1, 33.1, None),
                feature(PoiSource::Fallback, "near", 35.2, 33.2, Some(50.0)),
            ],
        };

        let names: Vec<String> = merge(vec![batch], true).into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["near", "far", "unknown"]);
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge(Vec::new(), true).is_empty());
    }
}
