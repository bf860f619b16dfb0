//! The `{data, error}` result shape returned by every terminal query.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DataError;

/// Uniform outcome of a terminal query.
///
/// Exactly one of the two states holds: success with optional data, or an
/// error message with `data` set to `None`. Constructors keep that invariant;
/// the fields stay public so callers can destructure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// Success without a payload (e.g. a delete, or `single()` on no rows).
    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "Unknown error".to_string();
        }
        Self {
            data: None,
            error: Some(message),
        }
    }

    pub fn from_result(result: Result<Option<T>, DataError>) -> Self {
        match result {
            Ok(Some(data)) => Self::ok(data),
            Ok(None) => Self::empty(),
            Err(e) => Self::err(e.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            data: self.data.map(f),
            error: self.error,
        }
    }
}

impl Envelope<Value> {
    /// Deserialize the payload into a typed envelope.
    ///
    /// A payload that does not match `T` becomes an error envelope rather
    /// than a panic, so typed callers keep the same folding guarantees.
    pub fn decode<T: DeserializeOwned>(self) -> Envelope<T> {
        if let Some(message) = self.error {
            return Envelope::err(message);
        }
        match self.data {
            None | Some(Value::Null) => Envelope::empty(),
            Some(value) => match serde_json::from_value(value) {
                Ok(data) => Envelope::ok(data),
                Err(e) => Envelope::err(
                    DataError::Decode {
                        reason: e.to_string(),
                    }
                    .to_string(),
                ),
            },
        }
    }

    /// Result reduction for `single()`: first row of an array, or nothing.
    ///
    /// Objects pass through untouched; error envelopes are returned as is.
    pub fn into_single(self) -> Self {
        if self.error.is_some() {
            return self;
        }
        match first_row(self.data) {
            Some(row) => Self::ok(row),
            None => Self::empty(),
        }
    }

    /// Number of rows carried by the payload.
    pub fn row_count(&self) -> usize {
        match &self.data {
            Some(Value::Array(rows)) => rows.len(),
            Some(Value::Null) | None => 0,
            Some(_) => 1,
        }
    }
}

/// First row of an array payload; objects pass through, nulls vanish.
pub(crate) fn first_row(data: Option<Value>) -> Option<Value> {
    match data {
        Some(Value::Array(rows)) => rows.into_iter().next().filter(|row| !row.is_null()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other),
    }
}

impl<T> Default for Envelope<T> {
    fn default() -> Self {
        Self::empty()
    }
}
