//! Journal domain: strategies, analyses, users and usage events.
//!
//! Each store wraps a [`DataClient`](crate::db::DataClient) and turns the
//! query envelopes into typed `Result`s.

pub mod analysis;
pub mod events;
pub mod strategy;
pub mod user;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::DataError;

pub use analysis::{
    Analysis, AnalysisResults, AnalysisSession, AnalysisStore, Answer, Factor, NewAnalysis, Rating,
    Recommendation, Score,
};
pub use events::EventTracker;
pub use strategy::{Field, Input, InputType, NewStrategy, Strategy, StrategyStore};
pub use user::{SessionUser, User, UserDirectory};

/// Server-assigned row id. The custom API uses integers, the hosted
/// backend UUIDs; both are carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RowId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for RowId {
    fn from(id: &str) -> Self {
        match id.parse::<i64>() {
            Ok(n) => Self::Int(n),
            Err(_) => Self::Text(id.to_string()),
        }
    }
}

/// Deserialize `null` as the type's default (JSONB columns may be null).
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn to_payload<T: Serialize>(value: &T) -> Result<Value, DataError> {
    serde_json::to_value(value).map_err(|e| DataError::Internal {
        reason: format!("failed to serialize payload: {e}"),
    })
}

/// A query outcome that must carry a row.
pub(crate) fn require<T>(result: Result<Option<T>, DataError>, what: &str) -> Result<T, DataError> {
    result?.ok_or_else(|| DataError::Decode {
        reason: format!("{what} returned no row"),
    })
}

/// Decode rows leniently: a single object is a one-element list.
pub(crate) fn decode_rows<T: DeserializeOwned>(result: Result<Option<Value>, DataError>) -> Result<Vec<T>, DataError> {
    let rows = match result? {
        None => return Ok(Vec::new()),
        Some(Value::Array(rows)) => rows,
        Some(row) => vec![row],
    };
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|e| DataError::Decode {
                reason: e.to_string(),
            })
        })
        .collect()
}
