//! Transport for the journal's own HTTP API.
//!
//! Layout: `GET /{table}?col=value`, `POST /{table}`, `PUT /{table}/{id}`,
//! `DELETE /{table}/{id}`. Every response body is a `{data, error}` object.
//! Reads are scoped by a `telegram_user_id` query parameter.

use reqwest::Method;
use serde_json::Value;

use crate::db::query::{QueryAction, QueryRequest};
use crate::db::transport::{HttpRequest, RequestContext, ResponseBody, Transport, snippet};
use crate::error::{DataError, ValidationError};

/// Query parameter the API uses to scope rows to a user.
const SCOPE_PARAM: &str = "telegram_user_id";

#[derive(Debug, Clone, Default)]
pub struct RestTransport;

impl RestTransport {
    pub fn new() -> Self {
        Self
    }

    fn row_path(request: &QueryRequest, operation: &'static str) -> Result<Vec<String>, DataError> {
        let id = request
            .id()
            .ok_or(ValidationError::MissingId { operation })?;
        Ok(vec![request.table.clone(), id.to_string()])
    }
}

impl Transport for RestTransport {
    fn name(&self) -> &'static str {
        "rest"
    }

    fn liveness_request(&self) -> HttpRequest {
        HttpRequest::get(["health"])
    }

    fn stats_request(&self, telegram_id: &str) -> HttpRequest {
        HttpRequest::get(["users", "stats", telegram_id])
    }

    fn compile(&self, request: &QueryRequest, ctx: &RequestContext) -> Result<HttpRequest, DataError> {
        let table = request.table.as_str();
        let http = match &request.action {
            QueryAction::Select => {
                let mut http = HttpRequest::get([table]);
                for (column, value) in &request.filters {
                    http = http.query(column, value);
                }
                if request.filter(SCOPE_PARAM).is_none()
                    && let Some(id) = request.filter("telegram_id").or(ctx.telegram_id.as_deref())
                {
                    http = http.query(SCOPE_PARAM, id);
                }
                if request.select_columns != "*" {
                    http = http.query("select", &request.select_columns);
                }
                if let Some(order) = &request.order_by {
                    http = http.query("order", format!("{}.{}", order.column, order.direction.as_str()));
                }
                if let Some(limit) = request.limit {
                    http = http.query("limit", limit.to_string());
                }
                http
            }
            QueryAction::Insert(payload) => HttpRequest::new(Method::POST, [table]).json(payload.clone()),
            QueryAction::Update(payload) => {
                HttpRequest::new(Method::PUT, Self::row_path(request, "update")?).json(payload.clone())
            }
            QueryAction::Delete => HttpRequest::new(Method::DELETE, Self::row_path(request, "delete")?),
        };
        Ok(http)
    }

    fn decode(&self, body: ResponseBody) -> Result<Option<Value>, DataError> {
        match body {
            ResponseBody::Empty => Ok(None),
            ResponseBody::Json(Value::Object(mut fields))
                if fields.contains_key("data") || fields.contains_key("error") =>
            {
                match fields.remove("error") {
                    Some(Value::Null) | None => {}
                    Some(Value::String(message)) => return Err(DataError::Backend { message }),
                    Some(other) => {
                        return Err(DataError::Backend {
                            message: other.to_string(),
                        });
                    }
                }
                Ok(fields.remove("data").filter(|v| !v.is_null()))
            }
            // Bare payloads are accepted as the data itself.
            ResponseBody::Json(value) => Ok(Some(value)),
            ResponseBody::Text(text) => Err(DataError::Decode {
                reason: format!("expected a JSON body, got: {}", snippet(&text)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::query::{OrderBy, SortDirection};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pairs(http: &HttpRequest) -> Vec<(&str, &str)> {
        http.query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    #[test]
    fn select_compiles_filters_order_and_limit() {
        let mut req = QueryRequest::new("strategies");
        req.filters.insert("user_id".into(), "u1".into());
        req.order_by = Some(OrderBy {
            column: "created_at".into(),
            direction: SortDirection::Descending,
        });
        req.limit = Some(5);

        let http = RestTransport.compile(&req, &RequestContext::default()).unwrap();
        assert_eq!(http.method, Method::GET);
        assert_eq!(http.segments, vec!["strategies"]);
        assert_eq!(
            pairs(&http),
            vec![("user_id", "u1"), ("order", "created_at.desc"), ("limit", "5")]
        );
        assert_eq!(
            http.url("http://localhost:5000/api").unwrap().as_str(),
            "http://localhost:5000/api/strategies?user_id=u1&order=created_at.desc&limit=5"
        );
    }

    #[test]
    fn select_scopes_to_session_user_unless_filtered() {
        let req = QueryRequest::new("strategies");
        let ctx = RequestContext::for_telegram_id("777");
        let http = RestTransport.compile(&req, &ctx).unwrap();
        assert_eq!(pairs(&http), vec![("telegram_user_id", "777")]);

        let mut req = QueryRequest::new("strategies");
        req.filters.insert("telegram_user_id".into(), "1".into());
        let http = RestTransport.compile(&req, &ctx).unwrap();
        assert_eq!(pairs(&http), vec![("telegram_user_id", "1")]);
    }

    #[test]
    fn telegram_id_filter_doubles_as_scope() {
        let mut req = QueryRequest::new("users");
        req.filters.insert("telegram_id".into(), "55".into());
        let http = RestTransport.compile(&req, &RequestContext::for_telegram_id("777")).unwrap();
        assert_eq!(pairs(&http), vec![("telegram_id", "55"), ("telegram_user_id", "55")]);
    }

    #[test]
    fn explicit_columns_are_forwarded() {
        let mut req = QueryRequest::new("users");
        req.select_columns = "id".into();
        let http = RestTransport.compile(&req, &RequestContext::default()).unwrap();
        assert_eq!(pairs(&http), vec![("select", "id")]);
    }

    #[test]
    fn writes_use_row_paths() {
        let mut req = QueryRequest::new("strategies");
        req.action = QueryAction::Insert(json!({"name": "S"}));
        let http = RestTransport.compile(&req, &RequestContext::default()).unwrap();
        assert_eq!(http.method, Method::POST);
        assert_eq!(http.segments, vec!["strategies"]);
        assert_eq!(http.body, Some(json!({"name": "S"})));

        req.action = QueryAction::Update(json!({"name": "T"}));
        req.filters.insert("id".into(), "42".into());
        let http = RestTransport.compile(&req, &RequestContext::default()).unwrap();
        assert_eq!(http.method, Method::PUT);
        assert_eq!(http.segments, vec!["strategies", "42"]);
        assert!(http.query.is_empty());

        req.action = QueryAction::Delete;
        let http = RestTransport.compile(&req, &RequestContext::default()).unwrap();
        assert_eq!(http.method, Method::DELETE);
        assert_eq!(http.segments, vec!["strategies", "42"]);
        assert_eq!(http.body, None);
    }

    #[test]
    fn update_and_delete_require_id() {
        let mut req = QueryRequest::new("strategies");
        req.action = QueryAction::Delete;
        let err = RestTransport.compile(&req, &RequestContext::default()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: ID is required for delete operation");

        req.filters.insert("id".into(), String::new());
        req.action = QueryAction::Update(json!({}));
        assert!(RestTransport.compile(&req, &RequestContext::default()).is_err());
    }

    #[test]
    fn decode_unwraps_envelope() {
        let t = RestTransport;
        assert_eq!(
            t.decode(ResponseBody::Json(json!({"data": [1], "error": null}))).unwrap(),
            Some(json!([1]))
        );
        assert_eq!(t.decode(ResponseBody::Json(json!({"error": null}))).unwrap(), None);
        assert_eq!(t.decode(ResponseBody::Empty).unwrap(), None);
        assert_eq!(
            t.decode(ResponseBody::Json(json!([{"id": 1}]))).unwrap(),
            Some(json!([{"id": 1}]))
        );
    }

    #[test]
    fn decode_surfaces_backend_and_text_errors() {
        let t = RestTransport;
        let err = t
            .decode(ResponseBody::Json(json!({"data": null, "error": "duplicate key"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Backend returned an error: duplicate key");

        let err = t.decode(ResponseBody::Text("<html>".into())).unwrap_err();
        assert!(matches!(err, DataError::Decode { .. }));
        assert!(err.to_string().contains("<html>"));
    }
}
