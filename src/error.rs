//! Error types for the trading journal client.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Errors raised while talking to the journal backend.
///
/// Terminal query operations never return these directly; they are folded
/// into [`crate::db::Envelope::error`] through `Display`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DataError {
    #[error("No working endpoint: all {tried} candidates failed the liveness check")]
    NoEndpoint { tried: usize },

    #[error("Client is not bound to an endpoint; probe before querying")]
    NotConnected,

    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Network error calling {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("HTTP 429: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Backend returned an error: {message}")]
    Backend { message: String },

    #[error("Malformed response: {reason}")]
    Decode { reason: String },

    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Internal error during query execution: {reason}")]
    Internal { reason: String },
}

impl DataError {
    /// Whether the executor should retry the request that produced this error.
    ///
    /// Timeouts, transport failures, 5xx, 408 and 429 are transient. Other
    /// 4xx responses, validation and decode failures are permanent: sending
    /// the same request again will not fix them.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::NoEndpoint { .. }
            | Self::NotConnected
            | Self::Backend { .. }
            | Self::Decode { .. }
            | Self::Validation(_)
            | Self::Internal { .. } => false,
        }
    }

    /// Delay the server asked for before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Domain validation failures, raised before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Strategy name is required")]
    EmptyStrategyName,

    #[error("Strategy name is too long: {len} > {max} characters")]
    StrategyNameTooLong { len: usize, max: usize },

    #[error("ID is required for {operation} operation")]
    MissingId { operation: &'static str },

    #[error("Table name is required")]
    EmptyTable,

    #[error("Analysis is incomplete: {answered} of {total} fields rated")]
    IncompleteAnalysis { answered: usize, total: usize },

    #[error("Strategy {name} has no fields to analyse")]
    EmptyStrategy { name: String },

    #[error("No session user: set TRADEJOURNAL_TELEGRAM_ID or pass --telegram-id")]
    NoSessionUser,
}
