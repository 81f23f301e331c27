use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use crate::core::geometry::InvalidGeometry;
use crate::models::ErrorResponse;
use crate::services::NearbyError;
use std::time::Duration;
use thiserror::Error;

/// Message shown for any upstream or internal failure
pub const UPSTREAM_MESSAGE: &str =
    "Place data is temporarily unavailable. Please try again shortly or zoom in to a smaller area.";

/// Errors returned to HTTP clients
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidGeometry(#[from] InvalidGeometry),

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("upstream unavailable: {0}")]
    Upstream(#[from] NearbyError),
}

impl ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            ApiError::InvalidGeometry(_) => "invalid_geometry",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Upstream(_) => "upstream_unavailable",
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::InvalidGeometry(InvalidGeometry(message)) => message.clone(),
            ApiError::RateLimited { retry_after } => format!(
                "Too many requests. Retry in {} seconds.",
                retry_after_secs(*retry_after)
            ),
            // upstream details stay in the logs
            ApiError::Upstream(_) => UPSTREAM_MESSAGE.to_string(),
        }
    }
}

/// Whole seconds for the `Retry-After` header, never zero
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidGeometry(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut builder = HttpResponse::build(status);

        if let ApiError::RateLimited { retry_after } = self {
            builder.insert_header((header::RETRY_AFTER, retry_after_secs(*retry_after).to_string()));
        }

        builder.json(ErrorResponse {
            error: self.error_code().to_string(),
            message: self.public_message(),
            status_code: status.as_u16(),
        })
    }
}
