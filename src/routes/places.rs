use actix_web::{web, HttpRequest, HttpResponse, Responder};
use crate::config::Settings;
use crate::core::geometry::{self, GeometryLimits, InvalidGeometry};
use crate::core::query::FilterSelection;
use crate::models::{Center, Feature, FeatureCollection, HealthResponse, PlacesParams, RadiusResponse};
use crate::routes::error::ApiError;
use crate::services::clock::Clock;
use crate::services::rate_limiter::{RateLimitDecision, RateLimiter};
use crate::services::{NearbyService, ResultCache, StartupError};
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub nearby: Arc<NearbyService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub cache: Arc<ResultCache>,
    pub limits: GeometryLimits,
    pub trust_forwarded_for: bool,
}

impl AppState {
    /// Build the shared state from settings
    pub fn from_settings(settings: &Settings, clock: Arc<dyn Clock>) -> Result<Self, StartupError> {
        let cache = Arc::new(ResultCache::new(
            settings.cache.max_entries,
            Duration::from_secs(settings.cache.ttl_secs),
            Duration::from_secs(settings.cache.stale_retention_secs),
            clock.clone(),
        ));

        let nearby = Arc::new(NearbyService::from_settings(settings, cache.clone())?);

        let rate_limiter = Arc::new(RateLimiter::new(
            settings.rate_limit.max_requests,
            Duration::from_secs(settings.rate_limit.window_secs),
            clock,
        ));

        Ok(Self {
            nearby,
            rate_limiter,
            cache,
            limits: GeometryLimits::from(&settings.geometry),
            trust_forwarded_for: settings.rate_limit.trust_forwarded_for,
        })
    }
}

/// Configure place lookup routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/places", web::get().to(find_places));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        cache_entries: state.cache.stats().entries,
    })
}

/// Nearby places endpoint
///
/// GET /api/v1/places?lat=33.8938&lon=35.5018&radius=1500&types=gym
/// GET /api/v1/places?bbox=33.85,35.45,33.95,35.55&filters[]=nutritionist
///
/// Radius lookups return `{center, radius, results}` sorted by distance;
/// bounding-box lookups return a `FeatureCollection`.
async fn find_places(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let client = client_key(&req, state.trust_forwarded_for);
    if let RateLimitDecision::Limited { retry_after } = state.rate_limiter.check(&client) {
        tracing::info!("Rate limited client {} on {}", client, req.path());
        return Err(ApiError::RateLimited { retry_after });
    }

    let pairs = web::Query::<Vec<(String, String)>>::from_query(req.query_string())
        .map_err(|e| InvalidGeometry(format!("malformed query string: {}", e)))?
        .into_inner();
    let params = PlacesParams::from_pairs(pairs);
    let selection = FilterSelection::parse(&params.filters);

    if let Some(raw_bbox) = params.bbox.as_deref() {
        let bbox = geometry::parse_bbox(raw_bbox, &state.limits)?;

        let features = state.nearby.search_bbox(&bbox, &selection).await.map_err(|e| {
            tracing::error!("Bounding-box lookup failed for {}: {}", raw_bbox, e);
            ApiError::from(e)
        })?;

        tracing::info!("Returning {} features for bbox {}", features.len(), raw_bbox);
        let features = features.into_iter().map(Feature::from).collect();
        return Ok(HttpResponse::Ok().json(FeatureCollection::new(features)));
    }

    let query = geometry::validate_radius(
        params.lat.as_deref(),
        params.lon.as_deref(),
        params.radius.as_deref(),
        &state.limits,
    )?;

    let results = state.nearby.search_radius(&query, &selection).await.map_err(|e| {
        tracing::error!(
            "Radius lookup failed at ({}, {}) r={}: {}",
            query.lat(),
            query.lon(),
            query.radius_m(),
            e
        );
        ApiError::from(e)
    })?;

    Ok(HttpResponse::Ok().json(RadiusResponse {
        center: Center {
            lat: query.lat(),
            lon: query.lon(),
        },
        radius: query.radius_m(),
        results: results.into_iter().map(Feature::from).collect(),
    }))
}

/// Client identity for rate limiting: the peer address, or the first
/// `X-Forwarded-For` hop when the proxy is trusted
fn client_key(req: &HttpRequest, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }

    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_client_key_uses_peer_ip() {
        let req = TestRequest::default()
            .peer_addr("10.0.0.7:5123".parse().unwrap())
            .insert_header(("x-forwarded-for", "203.0.113.9"))
            .to_http_request();

        assert_eq!(client_key(&req, false), "10.0.0.7");
    }

    #[test]
    fn test_client_key_trusts_forwarded_for_when_enabled() {
        let req = TestRequest::default()
            .peer_addr("10.0.0.7:5123".parse().unwrap())
            .insert_header(("x-forwarded-for", "203.0.113.9, 10.0.0.1"))
            .to_http_request();

        assert_eq!(client_key(&req, true), "203.0.113.9");
    }

    #[test]
    fn test_client_key_without_peer() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(client_key(&req, true), "unknown");
    }
}
