//! Transport strategies: how a [`QueryRequest`] becomes an HTTP call.
//!
//! The builder and executor are backend-agnostic. A [`Transport`] owns the
//! URL layout, filter syntax, auth headers and response unwrapping of one
//! backend flavour, and is selected from configuration.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::config::{ClientConfig, TransportKind};
use crate::db::postgrest::PostgrestTransport;
use crate::db::query::QueryRequest;
use crate::db::rest::RestTransport;
use crate::error::DataError;

/// Session facts a transport or transform may need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Telegram id of the session user, as a string.
    pub telegram_id: Option<String>,
}

impl RequestContext {
    pub fn for_telegram_id(id: impl Into<String>) -> Self {
        Self {
            telegram_id: Some(id.into()),
        }
    }
}

/// A compiled HTTP call, relative to a base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path segments appended to the base URL. Each is percent-encoded.
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new<S: Into<String>>(method: Method, segments: impl IntoIterator<Item = S>) -> Self {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self::new(Method::GET, segments)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Resolve against `base` (e.g. `http://host:5000/api`).
    pub fn url(&self, base: &str) -> Result<Url, DataError> {
        let mut url = Url::parse(base).map_err(|e| DataError::Network {
            url: base.to_string(),
            reason: format!("invalid base URL: {e}"),
        })?;
        {
            let mut path = url.path_segments_mut().map_err(|()| DataError::Network {
                url: base.to_string(),
                reason: "base URL cannot carry a path".to_string(),
            })?;
            path.pop_if_empty();
            path.extend(&self.segments);
        }
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

/// Body of a response as received, before transport-specific unwrapping.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    /// The body was not valid JSON; kept so error text is never lost.
    Text(String),
}

impl ResponseBody {
    /// Parse raw response text: JSON when possible, plain text otherwise.
    pub fn parse(text: &str) -> Self {
        if text.trim().is_empty() {
            return Self::Empty;
        }
        match serde_json::from_str(text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text.to_string()),
        }
    }
}

/// One backend flavour.
pub trait Transport: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Request used by the prober and the health helper.
    fn liveness_request(&self) -> HttpRequest;

    /// Request for the per-user statistics helper.
    fn stats_request(&self, telegram_id: &str) -> HttpRequest;

    /// Translate an accumulated query into one HTTP call.
    fn compile(&self, request: &QueryRequest, ctx: &RequestContext) -> Result<HttpRequest, DataError>;

    /// Unwrap a successful response body into the row payload.
    fn decode(&self, body: ResponseBody) -> Result<Option<Value>, DataError>;
}

/// Build the transport selected by `config`.
pub fn transport_for(config: &ClientConfig) -> Arc<dyn Transport> {
    match config.transport {
        TransportKind::Rest => Arc::new(RestTransport::new()),
        TransportKind::Postgrest => Arc::new(PostgrestTransport::new(
            config.api_key().unwrap_or_default().to_string(),
        )),
    }
}

/// Shorten a body for inclusion in an error message.
pub(crate) fn snippet(text: &str) -> String {
    const MAX: usize = 200;
    let text = text.trim();
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
