//! Configuration for the trading journal client.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::bootstrap::default_endpoint_cache_path;
use crate::db::RetryPolicy;
use crate::error::ConfigError;

/// Base URL used when `TRADEJOURNAL_ENDPOINTS` is not set.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000/api";

/// Which backend dialect the adapter speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// The journal's own REST API (`{base}/{table}`, `{data, error}` bodies).
    #[default]
    Rest,
    /// A hosted PostgREST-style BaaS (`{base}/rest/v1/{table}`, bare rows).
    Postgrest,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rest => write!(f, "rest"),
            Self::Postgrest => write!(f, "postgrest"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rest" | "api" | "custom" => Ok(Self::Rest),
            "postgrest" | "supabase" | "baas" => Ok(Self::Postgrest),
            _ => Err(format!(
                "invalid transport '{}', expected 'rest' or 'postgrest'",
                s
            )),
        }
    }
}

/// Everything the data-access core needs to run.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Candidate base URLs, primary first.
    pub endpoints: Vec<String>,
    pub transport: TransportKind,
    /// Anon key for the hosted BaaS. Required for [`TransportKind::Postgrest`].
    pub api_key: Option<SecretString>,
    /// Timeout for each liveness probe.
    pub probe_timeout: Duration,
    /// Timeout and backoff policy for data calls.
    pub retry: RetryPolicy,
    /// Where the last working endpoint is remembered between runs.
    pub endpoint_cache_path: PathBuf,
    /// Telegram id of the session user, if known.
    pub telegram_id: Option<String>,
}

impl ClientConfig {
    /// Config with defaults for everything except the candidate list.
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            transport: TransportKind::default(),
            api_key: None,
            probe_timeout: Duration::from_millis(2000),
            retry: RetryPolicy::default(),
            endpoint_cache_path: default_endpoint_cache_path(),
            telegram_id: None,
        }
    }

    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::resolve()
    }

    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let raw_endpoints =
            optional_env("TRADEJOURNAL_ENDPOINTS")?.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoints = parse_endpoints(&raw_endpoints)?;

        let transport: TransportKind = if let Some(t) = optional_env("TRADEJOURNAL_TRANSPORT")? {
            t.parse().map_err(|e| ConfigError::InvalidValue {
                key: "TRADEJOURNAL_TRANSPORT".to_string(),
                message: e,
            })?
        } else {
            TransportKind::default()
        };

        let api_key = optional_env("TRADEJOURNAL_API_KEY")?.map(SecretString::from);
        if transport == TransportKind::Postgrest && api_key.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "TRADEJOURNAL_API_KEY".to_string(),
                hint: "The postgrest transport needs the project's anon key".to_string(),
            });
        }

        let probe_timeout_ms: u64 = parse_optional_env("TRADEJOURNAL_PROBE_TIMEOUT_MS", 2000)?;
        let request_timeout_ms: u64 =
            parse_optional_env("TRADEJOURNAL_REQUEST_TIMEOUT_MS", 10_000)?;
        let max_attempts: u32 = parse_optional_env("TRADEJOURNAL_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRADEJOURNAL_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        let base_delay_ms: u64 = parse_optional_env("TRADEJOURNAL_BASE_DELAY_MS", 1000)?;

        let endpoint_cache_path = optional_env("TRADEJOURNAL_ENDPOINT_CACHE")?
            .map(PathBuf::from)
            .unwrap_or_else(default_endpoint_cache_path);

        let telegram_id = optional_env("TRADEJOURNAL_TELEGRAM_ID")?;

        Ok(Self {
            endpoints,
            transport,
            api_key,
            probe_timeout: Duration::from_millis(probe_timeout_ms),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(base_delay_ms),
                timeout: Duration::from_millis(request_timeout_ms),
            },
            endpoint_cache_path,
            telegram_id,
        })
    }

    /// Get the BaaS key (exposes the secret).
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret())
    }
}

/// Parse a comma-separated list of base URLs.
///
/// Entries are trimmed, empty entries skipped, and a trailing `/` removed.
/// Order is preserved: the first entry is the primary endpoint.
pub fn parse_endpoints(raw: &str) -> Result<Vec<String>, ConfigError> {
    let mut endpoints = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parsed = url::Url::parse(entry).map_err(|e| ConfigError::InvalidValue {
            key: "TRADEJOURNAL_ENDPOINTS".to_string(),
            message: format!("'{entry}' is not a valid URL: {e}"),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::InvalidValue {
                key: "TRADEJOURNAL_ENDPOINTS".to_string(),
                message: format!("'{entry}' must use http:// or https://"),
            });
        }
        let normalized = entry.trim_end_matches('/').to_string();
        if !endpoints.contains(&normalized) {
            endpoints.push(normalized);
        }
    }

    if endpoints.is_empty() {
        return Err(ConfigError::MissingRequired {
            key: "TRADEJOURNAL_ENDPOINTS".to_string(),
            hint: "Set at least one backend base URL".to_string(),
        });
    }
    Ok(endpoints)
}

/// Read an env var, treating an empty value as unset.
pub fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::ParseError(format!(
            "failed to read {key}: {e}"
        ))),
    }
}

pub(crate) fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}"),
            })
        })
        .transpose()
        .map(|opt| opt.unwrap_or(default))
}
