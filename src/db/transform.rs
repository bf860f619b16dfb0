//! Per-table payload shaping applied to inserts before transmission.
//!
//! Some tables expect fields the callers do not naturally produce (the
//! session's Telegram id, renamed event fields). Those quirks live here as
//! pure `payload -> payload` functions keyed by table name, so the query
//! builder never grows table-specific branches.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::db::transport::RequestContext;

/// A pure payload transformation.
pub type PayloadTransform = Arc<dyn Fn(Value, &RequestContext) -> Value + Send + Sync>;

/// Registry of per-table transforms.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, PayloadTransform>,
}

impl TransformRegistry {
    /// An empty registry: payloads pass through untouched.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shaping rules the journal backend expects.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("user_events", shape_user_event);
        registry.register("strategies", stamp_telegram_user);
        registry.register("analysis_results", stamp_telegram_user);
        registry
    }

    /// Register (or replace) the transform for `table`.
    pub fn register<F>(&mut self, table: impl Into<String>, transform: F)
    where
        F: Fn(Value, &RequestContext) -> Value + Send + Sync + 'static,
    {
        self.transforms.insert(table.into(), Arc::new(transform));
    }

    pub fn contains(&self, table: &str) -> bool {
        self.transforms.contains_key(table)
    }

    /// Shape `payload` for `table`. Arrays are shaped row by row.
    pub fn apply(&self, table: &str, payload: Value, ctx: &RequestContext) -> Value {
        let Some(transform) = self.transforms.get(table) else {
            return payload;
        };
        match payload {
            Value::Array(rows) => Value::Array(rows.into_iter().map(|row| transform(row, ctx)).collect()),
            row => transform(row, ctx),
        }
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tables: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        tables.sort_unstable();
        f.debug_struct("TransformRegistry")
            .field("tables", &tables)
            .finish()
    }
}

/// Render a JSON scalar as the string form the backend stores ids in.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `user_events` rows: `{telegram_user_id, event_type, event_data}`.
pub fn shape_user_event(payload: Value, ctx: &RequestContext) -> Value {
    let mut fields = match payload {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("event_data".to_string(), other);
            map
        }
    };

    let telegram_user_id = fields
        .get("telegram_user_id")
        .and_then(id_string)
        .or_else(|| ctx.telegram_id.clone());

    let event_type = ["event_type", "event_name", "type"]
        .iter()
        .find_map(|key| match fields.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "event".to_string());

    let event_data = ["event_data", "properties", "data"]
        .iter()
        .find_map(|key| fields.remove(*key).filter(|v| !v.is_null()))
        .unwrap_or_else(|| json!({}));

    json!({
        "telegram_user_id": telegram_user_id,
        "event_type": event_type,
        "event_data": event_data,
    })
}

/// Add `telegram_user_id` from the session when the row lacks one.
pub fn stamp_telegram_user(payload: Value, ctx: &RequestContext) -> Value {
    let Value::Object(mut fields) = payload else {
        return payload;
    };
    let present = fields.get("telegram_user_id").and_then(id_string);
    match (present, &ctx.telegram_id) {
        (Some(id), _) => {
            fields.insert("telegram_user_id".to_string(), Value::String(id));
        }
        (None, Some(session)) => {
            fields.insert("telegram_user_id".to_string(), Value::String(session.clone()));
        }
        (None, None) => {}
    }
    Value::Object(fields)
}
