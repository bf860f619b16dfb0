//! Chainable, table-scoped query builder.
//!
//! A [`QueryBuilder`] accumulates a [`QueryRequest`] synchronously and does no
//! I/O until it is executed, either by `.await`ing it directly or by calling
//! [`QueryBuilder::execute`]. Execution is memoized: the first call performs
//! the network round trip and later calls return the stored envelope.

use std::collections::BTreeMap;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::db::envelope::{Envelope, first_row};
use crate::db::executor::HttpExecutor;
use crate::db::transform::TransformRegistry;
use crate::db::transport::{RequestContext, Transport};
use crate::error::{DataError, ValidationError};

/// Sort direction for `order()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

/// What the terminal call does.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum QueryAction {
    #[default]
    Select,
    Insert(Value),
    Update(Value),
    Delete,
}

impl QueryAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete => "delete",
        }
    }
}

/// Everything a chain has accumulated.
///
/// Filters live in a `BTreeMap` so the compiled request does not depend on
/// the order `eq` calls were made in; a repeated column keeps the last value.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub table: String,
    pub select_columns: String,
    pub filters: BTreeMap<String, String>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub action: QueryAction,
    pub want_single: bool,
}

impl QueryRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select_columns: "*".to_string(),
            filters: BTreeMap::new(),
            order_by: None,
            limit: None,
            action: QueryAction::Select,
            want_single: false,
        }
    }

    pub fn filter(&self, column: &str) -> Option<&str> {
        self.filters.get(column).map(String::as_str)
    }

    /// The row id targeted by an update or delete, if any.
    pub fn id(&self) -> Option<&str> {
        self.filter("id").filter(|id| !id.is_empty())
    }
}

enum QueryState {
    Pending(QueryRequest),
    Resolved(Result<Option<Value>, DataError>),
}

/// The query builder bound to one table.
///
/// Chain methods consume and return the builder. Once resolved, further
/// filter or action calls are ignored (with a warning); `single()` still
/// applies to the memoized envelope since it only shapes the result.
pub struct QueryBuilder {
    state: QueryState,
    base_url: Option<String>,
    transport: Arc<dyn Transport>,
    executor: Arc<HttpExecutor>,
    transforms: Arc<TransformRegistry>,
    context: RequestContext,
}

impl QueryBuilder {
    /// `base_url` is a copy taken when the builder is created; rebinding the
    /// client afterwards does not affect this builder.
    pub fn new(
        table: impl Into<String>,
        base_url: Option<String>,
        transport: Arc<dyn Transport>,
        executor: Arc<HttpExecutor>,
        transforms: Arc<TransformRegistry>,
        context: RequestContext,
    ) -> Self {
        Self {
            state: QueryState::Pending(QueryRequest::new(table)),
            base_url,
            transport,
            executor,
            transforms,
            context,
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// The accumulated request, while still pending.
    pub fn request(&self) -> Option<&QueryRequest> {
        match &self.state {
            QueryState::Pending(request) => Some(request),
            QueryState::Resolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, QueryState::Resolved(_))
    }

    fn modify(mut self, op: &'static str, f: impl FnOnce(&mut QueryRequest)) -> Self {
        match &mut self.state {
            QueryState::Pending(request) => f(request),
            QueryState::Resolved(_) => {
                tracing::warn!(op, "Query already executed; ignoring chained call");
            }
        }
        self
    }

    pub fn select(self, columns: &str) -> Self {
        let columns = columns.trim();
        let columns = if columns.is_empty() { "*" } else { columns };
        self.modify("select", |r| r.select_columns = columns.to_string())
    }

    pub fn eq(self, column: impl Into<String>, value: impl fmt::Display) -> Self {
        let column = column.into();
        let value = value.to_string();
        self.modify("eq", |r| {
            r.filters.insert(column, value);
        })
    }

    pub fn order(self, column: impl Into<String>, direction: SortDirection) -> Self {
        let column = column.into();
        self.modify("order", |r| r.order_by = Some(OrderBy { column, direction }))
    }

    pub fn limit(self, n: usize) -> Self {
        self.modify("limit", |r| r.limit = Some(n))
    }

    /// Reduce the result to its first row (or nothing).
    pub fn single(mut self) -> Self {
        match &mut self.state {
            QueryState::Pending(request) => request.want_single = true,
            QueryState::Resolved(Ok(data)) => *data = first_row(data.take()),
            QueryState::Resolved(Err(_)) => {}
        }
        self
    }

    pub fn insert(self, payload: Value) -> Self {
        self.modify("insert", |r| r.action = QueryAction::Insert(payload))
    }

    pub fn update(self, payload: Value) -> Self {
        self.modify("update", |r| r.action = QueryAction::Update(payload))
    }

    pub fn delete(self) -> Self {
        self.modify("delete", |r| r.action = QueryAction::Delete)
    }

    /// Run the query, or return the memoized envelope if it already ran.
    ///
    /// Never fails: every error, including a panic inside a transport,
    /// is folded into the envelope.
    pub async fn execute(&mut self) -> Envelope {
        Envelope::from_result(self.try_execute().await)
    }

    /// Execute and deserialize the payload.
    pub async fn fetch<T: DeserializeOwned>(&mut self) -> Envelope<T> {
        self.execute().await.decode()
    }

    /// Same memoized execution as [`execute`](Self::execute), keeping the
    /// typed error so callers can still tell a timeout from a rejection.
    pub async fn try_execute(&mut self) -> Result<Option<Value>, DataError> {
        let request = match &self.state {
            QueryState::Resolved(result) => return result.clone(),
            QueryState::Pending(request) => request.clone(),
        };
        let result = self.run(request).await;
        self.state = QueryState::Resolved(result.clone());
        result
    }

    /// [`try_execute`](Self::try_execute) plus deserialization.
    pub async fn try_fetch<T: DeserializeOwned>(&mut self) -> Result<Option<T>, DataError> {
        match self.try_execute().await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| DataError::Decode {
                    reason: e.to_string(),
                }),
        }
    }

    async fn run(&self, request: QueryRequest) -> Result<Option<Value>, DataError> {
        let table = request.table.clone();
        let action = request.action.name();
        let want_single = request.want_single;

        let outcome = AssertUnwindSafe(self.dispatch(request)).catch_unwind().await;
        match outcome {
            Ok(Ok(data)) if want_single => Ok(first_row(data)),
            Ok(Ok(data)) => Ok(data),
            Ok(Err(e)) => {
                tracing::warn!(table = %table, action, error = %e, "Query failed");
                Err(e)
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(table = %table, action, reason = %reason, "Query panicked");
                Err(DataError::Internal { reason })
            }
        }
    }

    async fn dispatch(&self, mut request: QueryRequest) -> Result<Option<Value>, DataError> {
        if request.table.trim().is_empty() {
            return Err(ValidationError::EmptyTable.into());
        }
        let base = self.base_url.as_deref().ok_or(DataError::NotConnected)?;

        if let QueryAction::Insert(payload) = request.action {
            request.action =
                QueryAction::Insert(self.transforms.apply(&request.table, payload, &self.context));
        }

        let http = self.transport.compile(&request, &self.context)?;
        tracing::debug!(
            table = %request.table,
            action = request.action.name(),
            method = %http.method,
            "Executing query"
        );
        let response = self.executor.execute(base, &http).await?;
        self.transport.decode(response.body)
    }
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("QueryBuilder");
        match &self.state {
            QueryState::Pending(request) => s.field("request", request),
            QueryState::Resolved(result) => s.field("resolved", result),
        };
        s.field("base_url", &self.base_url)
            .field("transport", &self.transport.name())
            .finish()
    }
}

impl IntoFuture for QueryBuilder {
    type Output = Envelope;
    type IntoFuture = Pin<Box<dyn Future<Output = Envelope> + Send>>;

    fn into_future(mut self) -> Self::IntoFuture {
        Box::pin(async move { self.execute().await })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
