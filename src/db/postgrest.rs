//! Transport for a hosted PostgREST backend (anon-key auth).

use reqwest::Method;
use serde_json::{Value, json};

use crate::db::query::{QueryAction, QueryRequest};
use crate::db::transport::{HttpRequest, RequestContext, ResponseBody, Transport, snippet};
use crate::error::{DataError, ValidationError};

const REST_PREFIX: [&str; 2] = ["rest", "v1"];

#[derive(Clone)]
pub struct PostgrestTransport {
    api_key: String,
}

impl PostgrestTransport {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    fn with_auth(&self, http: HttpRequest) -> HttpRequest {
        http.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    fn table_request(&self, method: Method, table: &str) -> HttpRequest {
        let segments = REST_PREFIX.iter().copied().chain(std::iter::once(table));
        self.with_auth(HttpRequest::new(method, segments))
    }

    fn with_filters(http: HttpRequest, request: &QueryRequest) -> HttpRequest {
        request
            .filters
            .iter()
            .fold(http, |http, (column, value)| http.query(column, format!("eq.{value}")))
    }

    /// Writes that touch existing rows must name at least one row filter.
    fn require_filter(request: &QueryRequest, operation: &'static str) -> Result<(), DataError> {
        if request.filters.is_empty() {
            return Err(ValidationError::MissingId { operation }.into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for PostgrestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestTransport")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl Transport for PostgrestTransport {
    fn name(&self) -> &'static str {
        "postgrest"
    }

    fn liveness_request(&self) -> HttpRequest {
        self.table_request(Method::GET, "")
    }

    fn stats_request(&self, telegram_id: &str) -> HttpRequest {
        let segments = REST_PREFIX.iter().copied().chain(["rpc", "get_user_stats"]);
        self.with_auth(HttpRequest::new(Method::POST, segments))
            .json(json!({ "telegram_user_id": telegram_id }))
    }

    fn compile(&self, request: &QueryRequest, _ctx: &RequestContext) -> Result<HttpRequest, DataError> {
        let table = request.table.as_str();
        let http = match &request.action {
            QueryAction::Select => {
                let mut http = self
                    .table_request(Method::GET, table)
                    .query("select", &request.select_columns);
                http = Self::with_filters(http, request);
                if let Some(order) = &request.order_by {
                    http = http.query("order", format!("{}.{}", order.column, order.direction.as_str()));
                }
                if let Some(limit) = request.limit {
                    http = http.query("limit", limit.to_string());
                }
                http
            }
            QueryAction::Insert(payload) => self
                .table_request(Method::POST, table)
                .query("select", &request.select_columns)
                .header("Prefer", "return=representation")
                .json(payload.clone()),
            QueryAction::Update(payload) => {
                Self::require_filter(request, "update")?;
                let http = self
                    .table_request(Method::PATCH, table)
                    .header("Prefer", "return=representation")
                    .json(payload.clone());
                Self::with_filters(http, request)
            }
            QueryAction::Delete => {
                Self::require_filter(request, "delete")?;
                Self::with_filters(self.table_request(Method::DELETE, table), request)
            }
        };
        Ok(http)
    }

    fn decode(&self, body: ResponseBody) -> Result<Option<Value>, DataError> {
        match body {
            ResponseBody::Empty => Ok(None),
            ResponseBody::Json(Value::Null) => Ok(None),
            ResponseBody::Json(value) => Ok(Some(value)),
            ResponseBody::Text(text) => Err(DataError::Decode {
                reason: format!("expected a JSON body, got: {}", snippet(&text)),
            }),
        }
    }
}
