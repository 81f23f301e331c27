//! Mirror dispatcher.
//!
//! Executes a compiled query against Overpass mirrors one at a time, in
//! priority order:
//!
//! 1. Fresh cache hit returns immediately.
//! 2. Each mirror is preceded by a random jitter sleep and tried under the
//!    retry policy (transport failures, 429 and 5xx are retryable).
//! 3. A mirror that ends on a TLS failure gets one extra attempt with
//!    certificate verification disabled, only if explicitly enabled.
//! 4. The first parseable 2xx response is cached and returned.
//! 5. When every mirror fails, any retained cache entry is served stale;
//!    otherwise the per-mirror failures surface as `UpstreamUnavailable`.

use crate::models::CompiledQuery;
use crate::services::cache::ResultCache;
use crate::services::retry::{RetryOutcome, RetryPolicy};
use crate::services::transport::{OverpassTransport, TlsMode, TransportError, TransportErrorKind};
use rand::Rng;
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Characters of an upstream error body kept for logs
const BODY_PREVIEW_CHARS: usize = 200;

/// Why one attempt against a mirror failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("status {status}: {body_preview}")]
    Status { status: u16, body_preview: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl AttemptError {
    /// Transport failures, 429 and 5xx are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Transport(_) => true,
            AttemptError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            AttemptError::Malformed(_) => false,
        }
    }

    fn is_tls(&self) -> bool {
        matches!(self, AttemptError::Transport(e) if e.kind == TransportErrorKind::Tls)
    }
}

/// Final failure detail for one mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorFailure {
    pub endpoint: String,
    pub attempts: u32,
    pub error: AttemptError,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("all {} Overpass mirrors failed", .failures.len())]
    UpstreamUnavailable { failures: Vec<MirrorFailure> },
}

/// How a dispatch produced its value
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Fetched from a mirror just now
    Fresh(Value),
    /// Served from a non-expired cache entry
    Cached(Value),
    /// Every mirror failed; served from an expired cache entry
    Stale(Value),
}

impl FetchOutcome {
    pub fn value(&self) -> &Value {
        match self {
            FetchOutcome::Fresh(v) | FetchOutcome::Cached(v) | FetchOutcome::Stale(v) => v,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            FetchOutcome::Fresh(v) | FetchOutcome::Cached(v) | FetchOutcome::Stale(v) => v,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, FetchOutcome::Stale(_))
    }
}

/// Dispatch tuning
#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    pub retry: RetryPolicy,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub allow_insecure_tls_fallback: bool,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::no_retry(),
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            allow_insecure_tls_fallback: false,
        }
    }
}

pub struct MirrorDispatcher {
    mirrors: Vec<Url>,
    transport: Arc<dyn OverpassTransport>,
    cache: Arc<ResultCache>,
    policy: DispatchPolicy,
}

impl MirrorDispatcher {
    pub fn new(
        mirrors: Vec<Url>,
        transport: Arc<dyn OverpassTransport>,
        cache: Arc<ResultCache>,
        policy: DispatchPolicy,
    ) -> Self {
        if policy.allow_insecure_tls_fallback {
            tracing::warn!("Insecure TLS fallback is enabled for Overpass mirrors");
        }

        Self {
            mirrors,
            transport,
            cache,
            policy,
        }
    }

    /// Resolve `query` from cache or mirrors
    pub async fn fetch(&self, query: &CompiledQuery) -> Result<FetchOutcome, DispatchError> {
        if let Some(value) = self.cache.get(&query.cache_key).await {
            tracing::debug!("Serving {} from cache", query.cache_key);
            return Ok(FetchOutcome::Cached(value));
        }

        let mut failures = Vec::with_capacity(self.mirrors.len());

        for endpoint in &self.mirrors {
            let jitter = self.jitter();
            if !jitter.is_zero() {
                tokio::time::sleep(jitter).await;
            }

            match self.try_mirror(endpoint, &query.text).await {
                Ok(value) => {
                    self.cache.put_default(&query.cache_key, value.clone()).await;
                    tracing::debug!("Fetched {} from {}", query.cache_key, endpoint);
                    return Ok(FetchOutcome::Fresh(value));
                }
                Err(failure) => {
                    tracing::warn!(
                        endpoint = %failure.endpoint,
                        attempts = failure.attempts,
                        "Overpass mirror failed: {}",
                        failure.error
                    );
                    failures.push(failure);
                }
            }
        }

        if let Some(value) = self.cache.get_stale(&query.cache_key).await {
            tracing::warn!(
                cache_key = %query.cache_key,
                failed_mirrors = failures.len(),
                "All Overpass mirrors failed, stale served"
            );
            return Ok(FetchOutcome::Stale(value));
        }

        tracing::error!(
            cache_key = %query.cache_key,
            "All {} Overpass mirrors failed and nothing is cached",
            failures.len()
        );
        Err(DispatchError::UpstreamUnavailable { failures })
    }

    async fn try_mirror(&self, endpoint: &Url, query: &str) -> Result<Value, MirrorFailure> {
        let outcome = self
            .policy
            .retry
            .run(
                |attempt| {
                    tracing::debug!("Querying {} (attempt {})", endpoint, attempt);
                    self.attempt(endpoint, query, TlsMode::Verified)
                },
                AttemptError::is_retryable,
            )
            .await;

        let (last_error, attempts) = match outcome {
            RetryOutcome::Success(value) => return Ok(value),
            RetryOutcome::Failed { last_error, attempts } => (last_error, attempts),
        };

        if last_error.is_tls() && self.policy.allow_insecure_tls_fallback {
            return self.insecure_fallback(endpoint, query, attempts).await;
        }

        Err(MirrorFailure {
            endpoint: endpoint.to_string(),
            attempts,
            error: last_error,
        })
    }

    /// One attempt with certificate verification disabled, then give up on
    /// this mirror
    async fn insecure_fallback(
        &self,
        endpoint: &Url,
        query: &str,
        attempts: u32,
    ) -> Result<Value, MirrorFailure> {
        tracing::warn!(
            endpoint = %endpoint,
            "TLS failure, retrying once with certificate verification DISABLED"
        );

        self.attempt(endpoint, query, TlsMode::Insecure)
            .await
            .map_err(|error| MirrorFailure {
                endpoint: endpoint.to_string(),
                attempts: attempts + 1,
                error,
            })
    }

    async fn attempt(&self, endpoint: &Url, query: &str, tls: TlsMode) -> Result<Value, AttemptError> {
        let response = self.transport.execute(endpoint, query, tls).await?;

        if !(200..300).contains(&response.status) {
            return Err(AttemptError::Status {
                status: response.status,
                body_preview: body_preview(&response.body),
            });
        }

        let value: Value = serde_json::from_slice(&response.body)
            .map_err(|e| AttemptError::Malformed(format!("invalid JSON: {}", e)))?;

        if !value.get("elements").map(Value::is_array).unwrap_or(false) {
            return Err(AttemptError::Malformed("missing elements array".to_string()));
        }

        Ok(value)
    }

    fn jitter(&self) -> Duration {
        let min = self.policy.jitter_min;
        let max = self.policy.jitter_max.max(min);
        if max.is_zero() {
            return Duration::ZERO;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

fn body_preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    let preview: String = trimmed.chars().take(BODY_PREVIEW_CHARS).collect();
    if trimmed.chars().count() > BODY_PREVIEW_CHARS {
        format!("{}...", preview)
    } else {
        preview
    }
}
