//! HTTP transport for Overpass mirrors.
//!
//! Owns request serialisation, per-attempt timeouts and classification of
//! transport failures. Status handling and retries live in the dispatcher.

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

/// Certificate verification mode for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Verified,
    /// Verification disabled; only used by the explicit fallback path
    Insecure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Tls,
    Connect,
    Other,
}

/// Failure before an HTTP status was received
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Raw upstream response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Sends compiled queries to one endpoint
#[async_trait]
pub trait OverpassTransport: Send + Sync {
    async fn execute(
        &self,
        endpoint: &Url,
        query: &str,
        tls: TlsMode,
    ) -> Result<UpstreamResponse, TransportError>;
}

/// Reqwest-backed transport
pub struct ReqwestTransport {
    client: Client,
    insecure_client: Option<Client>,
}

impl ReqwestTransport {
    /// Build the transport. The insecure client only exists when the
    /// fallback is enabled.
    pub fn new(
        timeout: Duration,
        user_agent: &str,
        allow_insecure: bool,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        let insecure_client = if allow_insecure {
            Some(
                Client::builder()
                    .timeout(timeout)
                    .user_agent(user_agent)
                    .danger_accept_invalid_certs(true)
                    .build()?,
            )
        } else {
            None
        };

        Ok(Self {
            client,
            insecure_client,
        })
    }
}

#[async_trait]
impl OverpassTransport for ReqwestTransport {
    async fn execute(
        &self,
        endpoint: &Url,
        query: &str,
        tls: TlsMode,
    ) -> Result<UpstreamResponse, TransportError> {
        let client = match tls {
            TlsMode::Verified => &self.client,
            TlsMode::Insecure => self.insecure_client.as_ref().ok_or_else(|| {
                TransportError::new(TransportErrorKind::Other, "insecure TLS fallback is disabled")
            })?,
        };

        let response = client
            .post(endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("data", query)])
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify_reqwest_error)?;

        Ok(UpstreamResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Classify a reqwest failure, looking through its source chain for TLS
/// and certificate errors
pub fn classify_reqwest_error(error: reqwest::Error) -> TransportError {
    let message = error_chain_message(&error);

    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if looks_like_tls_failure(&message) {
        TransportErrorKind::Tls
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    };

    TransportError::new(kind, message)
}

fn error_chain_message(error: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

/// Whether an error message describes a TLS handshake or certificate failure
pub fn looks_like_tls_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["certificate", "tls", "ssl", "handshake", "unknownissuer"]
        .iter()
        .any(|needle| lower.contains(needle))
}
