use crate::core::query::Category;
use crate::models::RadiusQuery;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when calling the commercial places API
#[derive(Debug, Error)]
pub enum PlacesApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Commercial places API client
///
/// Speaks the Foursquare v3 place search shape:
/// `GET {base}/places/search?ll=lat,lon&radius=r&query=term&limit=n`
/// with the key in the `Authorization` header. One call per category.
pub struct PlacesApiClient {
    base_url: String,
    api_key: String,
    limit: u32,
    client: Client,
}

impl PlacesApiClient {
    /// Create a new places API client
    pub fn new(
        base_url: String,
        api_key: String,
        limit: u32,
        timeout: Duration,
    ) -> Result<Self, PlacesApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            limit: limit.clamp(1, 50),
            client,
        })
    }

    fn search_url(&self, query: &RadiusQuery, category: Category) -> String {
        let ll = format!("{:.6},{:.6}", query.lat(), query.lon());
        format!(
            "{}/places/search?ll={}&radius={}&query={}&limit={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&ll),
            query.radius_m(),
            urlencoding::encode(category.search_term()),
            self.limit
        )
    }

    /// Search around `query` for one category, returning the raw `results`
    pub async fn search_nearby(
        &self,
        query: &RadiusQuery,
        category: Category,
    ) -> Result<Vec<Value>, PlacesApiError> {
        let url = self.search_url(query, category);

        tracing::debug!("Querying places API for {}", category.name());

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(PlacesApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
            tracing::warn!("Places API search failed: {} - {}", status, body.chars().take(200).collect::<String>());
            return Err(PlacesApiError::ApiError(format!("Failed to search places: {}", status)));
        }

        let mut json: Value = response.json().await?;

        let results = json
            .get_mut("results")
            .map(Value::take)
            .ok_or_else(|| PlacesApiError::InvalidResponse("Missing results array".into()))?;

        match results {
            Value::Array(records) => {
                tracing::debug!("Places API returned {} {} results", records.len(), category.name());
                Ok(records)
            }
            _ => Err(PlacesApiError::InvalidResponse("results is not an array".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::{validate_radius, GeometryLimits};

    fn client(base_url: &str) -> PlacesApiClient {
        PlacesApiClient::new(base_url.to_string(), "test_key".to_string(), 100, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_places_client_creation() {
        let client = client("https://places.test/v3/");
        assert_eq!(client.base_url, "https://places.test/v3/");
        assert_eq!(client.api_key, "test_key");
        assert_eq!(client.limit, 50);
    }

    #[test]
    fn test_search_url() {
        let query = validate_radius(Some("33.8938"), Some("35.5018"), Some("1500"), &GeometryLimits::default()).unwrap();
        let url = client("https://places.test/v3/").search_url(&query, Category::Nutritionist);

        assert_eq!(
            url,
            "https://places.test/v3/places/search?ll=33.893800%2C35.501800&radius=1500&query=nutritionist&limit=50"
        );
    }

    #[tokio::test]
    async fn test_search_nearby_parses_results() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/places/search")
            .match_query(mockito::Matcher::UrlEncoded("query".into(), "gym".into()))
            .match_header("authorization", "test_key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results":[{"fsq_id":"a","name":"Fit"}]}"#)
            .create_async()
            .await;

        let query = validate_radius(Some("33.8938"), Some("35.5018"), None, &GeometryLimits::default()).unwrap();
        let results = client(&server.url()).search_nearby(&query, Category::Gym).await.unwrap();

        assert_eq!(results.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_nearby_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", mockito::Matcher::Any).with_status(401).create_async().await;

        let query = validate_radius(Some("1"), Some("2"), None, &GeometryLimits::default()).unwrap();
        let error = client(&server.url()).search_nearby(&query, Category::Gym).await.unwrap_err();
        assert!(matches!(error, PlacesApiError::Unauthorized));
    }
}
