use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub overpass: OverpassSettings,
    #[serde(default)]
    pub places_api: PlacesApiSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub geometry: GeometrySettings,
    #[serde(default)]
    pub merge: MergeSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

/// Upstream Overpass mirrors and the dispatch policy applied to them
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassSettings {
    /// Mirror interpreter URLs in priority order
    #[serde(default = "default_mirrors")]
    pub mirrors: Vec<String>,
    /// Per-attempt HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// `[timeout:N]` directive embedded in the query text
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u32,
    /// Retries per mirror after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    /// `fixed` or `exponential`
    #[serde(default = "default_backoff")]
    pub backoff: String,
    #[serde(default = "default_jitter_min_ms")]
    pub jitter_min_ms: u64,
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
    /// Retry once without certificate verification after a TLS failure.
    /// Never enable in production.
    #[serde(default)]
    pub allow_insecure_tls_fallback: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for OverpassSettings {
    fn default() -> Self {
        Self {
            mirrors: default_mirrors(),
            request_timeout_secs: default_request_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            backoff: default_backoff(),
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
            allow_insecure_tls_fallback: false,
            user_agent: default_user_agent(),
        }
    }
}

fn default_mirrors() -> Vec<String> {
    vec![
        "https://overpass-api.de/api/interpreter".to_string(),
        "https://overpass.kumi.systems/api/interpreter".to_string(),
        "https://maps.mail.ru/osm/tools/overpass/api/interpreter".to_string(),
    ]
}
fn default_request_timeout_secs() -> u64 { 25 }
fn default_query_timeout_secs() -> u32 { 25 }
fn default_max_retries() -> u32 { 2 }
fn default_retry_delay_ms() -> u64 { 500 }
fn default_max_retry_delay_ms() -> u64 { 4_000 }
fn default_backoff() -> String { "exponential".to_string() }
fn default_jitter_min_ms() -> u64 { 100 }
fn default_jitter_max_ms() -> u64 { 300 }
fn default_user_agent() -> String {
    format!("nearby-places/{}", env!("CARGO_PKG_VERSION"))
}

/// Commercial places API. Disabled unless `api_key` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct PlacesApiSettings {
    #[serde(default = "default_places_endpoint")]
    pub endpoint: String,
    pub api_key: Option<String>,
    #[serde(default = "default_places_limit")]
    pub limit_per_category: u32,
    #[serde(default = "default_places_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PlacesApiSettings {
    fn default() -> Self {
        Self {
            endpoint: default_places_endpoint(),
            api_key: None,
            limit_per_category: default_places_limit(),
            timeout_secs: default_places_timeout_secs(),
        }
    }
}

fn default_places_endpoint() -> String { "https://api.foursquare.com/v3".to_string() }
fn default_places_limit() -> u32 { 20 }
fn default_places_timeout_secs() -> u64 { 10 }

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// How long expired entries stay around for stale serving
    #[serde(default = "default_stale_retention_secs")]
    pub stale_retention_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            stale_retention_secs: default_stale_retention_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 { 6 * 60 * 60 }
fn default_stale_retention_secs() -> u64 { 24 * 60 * 60 }
fn default_cache_max_entries() -> u64 { 10_000 }

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Use the first `X-Forwarded-For` hop as the client key
    #[serde(default)]
    pub trust_forwarded_for: bool,
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            trust_forwarded_for: false,
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

fn default_window_secs() -> u64 { 60 }
fn default_max_requests() -> u32 { 20 }
fn default_purge_interval_secs() -> u64 { 300 }

#[derive(Debug, Clone, Deserialize)]
pub struct GeometrySettings {
    #[serde(default = "default_min_radius_m")]
    pub min_radius_m: u32,
    #[serde(default = "default_max_radius_m")]
    pub max_radius_m: u32,
    #[serde(default = "default_radius_m")]
    pub default_radius_m: u32,
    #[serde(default = "default_max_bbox_span_deg")]
    pub max_bbox_span_deg: f64,
    /// Clamp out-of-range radii instead of rejecting them
    #[serde(default)]
    pub clamp_radius: bool,
}

impl Default for GeometrySettings {
    fn default() -> Self {
        Self {
            min_radius_m: default_min_radius_m(),
            max_radius_m: default_max_radius_m(),
            default_radius_m: default_radius_m(),
            max_bbox_span_deg: default_max_bbox_span_deg(),
            clamp_radius: false,
        }
    }
}

fn default_min_radius_m() -> u32 { 200 }
fn default_max_radius_m() -> u32 { 5_000 }
fn default_radius_m() -> u32 { 1_500 }
fn default_max_bbox_span_deg() -> f64 { 0.5 }

#[derive(Debug, Clone, Deserialize)]
pub struct MergeSettings {
    /// `always` or `when_primary_empty`
    #[serde(default = "default_osm_mode")]
    pub osm_mode: String,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            osm_mode: default_osm_mode(),
        }
    }
}

fn default_osm_mode() -> String { "always".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with NEARBY__)
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., NEARBY__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("NEARBY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings = apply_env_shortcuts(settings)?;

        settings.try_deserialize()
    }
}

/// Apply the short environment variables operators usually set by hand:
/// `OVERPASS_MIRRORS` (comma-separated, in priority order) and `PLACES_API_KEY`.
fn apply_env_shortcuts(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(raw) = env::var("OVERPASS_MIRRORS") {
        let mirrors = parse_mirror_list(&raw);
        if !mirrors.is_empty() {
            builder = builder.set_override("overpass.mirrors", mirrors)?;
        }
    }

    if let Ok(api_key) = env::var("PLACES_API_KEY") {
        if !api_key.trim().is_empty() {
            builder = builder.set_override("places_api.api_key", api_key)?;
        }
    }

    builder.build()
}

fn parse_mirror_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_config_file() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.overpass.mirrors.len(), 3);
        assert_eq!(settings.rate_limit.max_requests, 20);
        assert_eq!(settings.rate_limit.window_secs, 60);
        assert_eq!(settings.geometry.min_radius_m, 200);
        assert_eq!(settings.geometry.max_radius_m, 5_000);
        assert!(settings.places_api.api_key.is_none());
    }

    #[test]
    fn test_insecure_tls_fallback_defaults_off() {
        assert!(!OverpassSettings::default().allow_insecure_tls_fallback);
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let settings: Settings = Config::builder()
            .set_override("overpass.max_retries", 5)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.overpass.max_retries, 5);
        assert_eq!(settings.overpass.jitter_max_ms, 300);
        assert_eq!(settings.cache.ttl_secs, 21_600);
    }

    #[test]
    fn test_parse_mirror_list() {
        let mirrors = parse_mirror_list(" https://a.example/api , ,https://b.example/api");
        assert_eq!(mirrors, vec!["https://a.example/api", "https://b.example/api"]);
    }

    #[test]
    fn test_default_logging() {
        assert_eq!(default_log_level(), "info");
        assert_eq!(default_log_format(), "json");
    }
}
