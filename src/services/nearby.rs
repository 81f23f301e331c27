use crate::config::Settings;
use crate::core::merge::{self, SourceBatch};
use crate::core::query::{Category, FilterSelection, QueryBuilder};
use crate::models::{GeoBoundingBox, PoiFeature, PoiSource, RadiusQuery, SearchArea};
use crate::services::cache::ResultCache;
use crate::services::dispatcher::{DispatchError, DispatchPolicy, MirrorDispatcher};
use crate::services::places_api::{PlacesApiClient, PlacesApiError};
use crate::services::retry::{Backoff, RetryPolicy};
use crate::services::transport::{OverpassTransport, ReqwestTransport};
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the lookup pipeline
#[derive(Debug, Error)]
pub enum NearbyError {
    #[error(transparent)]
    Upstream(#[from] DispatchError),

    #[error("primary places API failed: {0}")]
    Primary(#[from] PlacesApiError),
}

/// Errors while wiring the service from settings
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid Overpass mirror URL {url}: {reason}")]
    InvalidMirror { url: String, reason: String },

    #[error("no Overpass mirrors configured")]
    NoMirrors,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to build places API client: {0}")]
    PlacesApi(#[from] PlacesApiError),
}

/// When to query OpenStreetMap in radius mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsmMode {
    /// Always query OSM and merge it behind the primary source
    Always,
    /// Only query OSM when the primary source is absent, failed or empty
    WhenPrimaryEmpty,
}

impl OsmMode {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "when_primary_empty" | "fallback" => OsmMode::WhenPrimaryEmpty,
            _ => OsmMode::Always,
        }
    }
}

/// The nearby-places pipeline: compile, dispatch, normalize, merge
pub struct NearbyService {
    builder: QueryBuilder,
    dispatcher: MirrorDispatcher,
    places_api: Option<PlacesApiClient>,
    osm_mode: OsmMode,
}

impl NearbyService {
    pub fn new(
        builder: QueryBuilder,
        dispatcher: MirrorDispatcher,
        places_api: Option<PlacesApiClient>,
        osm_mode: OsmMode,
    ) -> Self {
        Self {
            builder,
            dispatcher,
            places_api,
            osm_mode,
        }
    }

    /// Wire the service from settings with the reqwest transport
    pub fn from_settings(settings: &Settings, cache: Arc<ResultCache>) -> Result<Self, StartupError> {
        let overpass = &settings.overpass;
        let transport = ReqwestTransport::new(
            Duration::from_secs(overpass.request_timeout_secs),
            &overpass.user_agent,
            overpass.allow_insecure_tls_fallback,
        )?;

        Self::with_transport(settings, cache, Arc::new(transport))
    }

    /// Wire the service from settings with a caller-supplied transport
    pub fn with_transport(
        settings: &Settings,
        cache: Arc<ResultCache>,
        transport: Arc<dyn OverpassTransport>,
    ) -> Result<Self, StartupError> {
        let overpass = &settings.overpass;

        let mirrors = overpass
            .mirrors
            .iter()
            .map(|raw| {
                Url::parse(raw).map_err(|e| StartupError::InvalidMirror {
                    url: raw.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if mirrors.is_empty() {
            return Err(StartupError::NoMirrors);
        }

        let policy = DispatchPolicy {
            retry: RetryPolicy::new(
                overpass.max_retries,
                Duration::from_millis(overpass.retry_delay_ms),
                Duration::from_millis(overpass.max_retry_delay_ms),
                Backoff::from_name(&overpass.backoff),
            ),
            jitter_min: Duration::from_millis(overpass.jitter_min_ms),
            jitter_max: Duration::from_millis(overpass.jitter_max_ms),
            allow_insecure_tls_fallback: overpass.allow_insecure_tls_fallback,
        };

        let places_api = match settings.places_api.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Some(PlacesApiClient::new(
                settings.places_api.endpoint.clone(),
                key.to_string(),
                settings.places_api.limit_per_category,
                Duration::from_secs(settings.places_api.timeout_secs),
            )?),
            _ => None,
        };

        tracing::info!(
            "Nearby service configured with {} mirrors, primary API {}",
            mirrors.len(),
            if places_api.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self::new(
            QueryBuilder::new(overpass.query_timeout_secs),
            MirrorDispatcher::new(mirrors, transport, cache, policy),
            places_api,
            OsmMode::from_name(&settings.merge.osm_mode),
        ))
    }

    /// Center + radius lookup, merged across sources and sorted by distance
    pub async fn search_radius(
        &self,
        query: &RadiusQuery,
        selection: &FilterSelection,
    ) -> Result<Vec<PoiFeature>, NearbyError> {
        let mut batches = Vec::new();
        let mut primary_error = None;

        let categories = primary_categories(selection);
        if let Some(client) = self.places_api.as_ref().filter(|_| !categories.is_empty()) {
            match self.fetch_primary(client, query, &categories).await {
                Ok(batch) => batches.push(batch),
                Err(e) => {
                    tracing::warn!("Primary places API unavailable, using OSM only: {}", e);
                    primary_error = Some(e);
                }
            }
        }

        let primary_found = batches.iter().any(|b| !b.features.is_empty());
        let query_osm = match self.osm_mode {
            OsmMode::Always => true,
            OsmMode::WhenPrimaryEmpty => !primary_found,
        };

        if query_osm {
            let area = SearchArea::Radius(*query);
            match self.fetch_osm(&area, selection).await {
                Ok(batch) => batches.push(batch),
                // a successful primary answer still stands on its own
                Err(e) if !batches.is_empty() => {
                    tracing::warn!("OSM fallback failed, returning primary results only: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        if batches.is_empty() {
            if let Some(e) = primary_error {
                return Err(NearbyError::Primary(e));
            }
        }

        let features = merge::merge(batches, true);
        tracing::info!(
            "Resolved {} places within {}m of ({}, {})",
            features.len(),
            query.radius_m(),
            query.lat(),
            query.lon()
        );
        Ok(features)
    }

    /// Bounding-box lookup against OSM, in source order
    pub async fn search_bbox(
        &self,
        bbox: &GeoBoundingBox,
        selection: &FilterSelection,
    ) -> Result<Vec<PoiFeature>, NearbyError> {
        let area = SearchArea::BoundingBox(*bbox);
        let batch = self.fetch_osm(&area, selection).await?;
        Ok(merge::merge(vec![batch], false))
    }

    async fn fetch_osm(&self, area: &SearchArea, selection: &FilterSelection) -> Result<SourceBatch, NearbyError> {
        let compiled = self.builder.compile(area, selection);
        let outcome = self.dispatcher.fetch(&compiled).await?;

        let records = outcome
            .value()
            .get("elements")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        Ok(merge::normalize_overpass(records, area.reference_point()))
    }

    /// Query the primary API once per category. A failed category is
    /// logged and skipped; the call only fails when every category failed.
    async fn fetch_primary(
        &self,
        client: &PlacesApiClient,
        query: &RadiusQuery,
        categories: &[Category],
    ) -> Result<SourceBatch, PlacesApiError> {
        let mut features = Vec::new();
        let mut last_error = None;
        let mut succeeded = 0usize;

        for &category in categories {
            match client.search_nearby(query, category).await {
                Ok(records) => {
                    succeeded += 1;
                    features.extend(merge::normalize_places(&records, category, Some(query.center())).features);
                }
                Err(e) => {
                    tracing::warn!("Primary places API failed for {}: {}", category.name(), e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => Ok(SourceBatch {
                source: PoiSource::Primary,
                features,
            }),
        }
    }
}

/// Categories to ask the primary API for. An empty selection means every
/// category; tag-only selections have no primary equivalent.
fn primary_categories(selection: &FilterSelection) -> Vec<Category> {
    if selection.is_empty() {
        return Category::ALL.to_vec();
    }
    selection.categories().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osm_mode_from_name() {
        assert_eq!(OsmMode::from_name("always"), OsmMode::Always);
        assert_eq!(OsmMode::from_name("WHEN_PRIMARY_EMPTY"), OsmMode::WhenPrimaryEmpty);
        assert_eq!(OsmMode::from_name(""), OsmMode::Always);
    }

    #[test]
    fn test_primary_categories() {
        assert_eq!(primary_categories(&FilterSelection::default()), Category::ALL.to_vec());
        assert_eq!(primary_categories(&FilterSelection::parse(["nutritionist"])), vec![Category::Nutritionist]);
        assert!(primary_categories(&FilterSelection::parse(["shop=bakery"])).is_empty());
        assert_eq!(primary_categories(&FilterSelection::parse(["gym", "wheelchair=yes"])), vec![Category::Gym]);
    }

    #[test]
    fn test_rejects_bad_mirror_url() {
        let mut settings = Settings::default();
        settings.overpass.mirrors = vec!["not a url".to_string()];
        let cache = Arc::new(ResultCache::new(
            10,
            Duration::from_secs(1),
            Duration::from_secs(1),
            Arc::new(crate::services::clock::SystemClock),
        ));

        let result = NearbyService::from_settings(&settings, cache);
        assert!(matches!(result, Err(StartupError::InvalidMirror { .. })));
    }

    #[test]
    fn test_rejects_empty_mirror_list() {
        let mut settings = Settings::default();
        settings.overpass.mirrors.clear();
        let cache = Arc::new(ResultCache::new(
            10,
            Duration::from_secs(1),
            Duration::from_secs(1),
            Arc::new(crate::services::clock::SystemClock),
        ));

        assert!(matches!(NearbyService::from_settings(&settings, cache), Err(StartupError::NoMirrors)));
    }
}
