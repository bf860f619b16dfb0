//! Strategies: named checklists of fields, each with typed inputs.

use serde::{Deserialize, Serialize};

use crate::db::{DataClient, SortDirection};
use crate::error::{DataError, ValidationError};
use crate::journal::{RowId, decode_rows, null_as_default, require, to_payload};

const TABLE: &str = "strategies";

/// Longest accepted strategy name, in characters.
pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    Text,
    Number,
    Select,
    Boolean,
    Textarea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    #[serde(rename = "type", default)]
    pub input_type: InputType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(default)]
    pub required: bool,
    /// Choices; only meaningful for `select` inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl Input {
    pub fn new(input_type: InputType, label: impl Into<String>) -> Self {
        Self {
            input_type,
            label: label.into(),
            required: false,
            options: None,
        }
    }

    pub fn select(label: impl Into<String>, options: &[&str]) -> Self {
        Self {
            options: Some(options.iter().map(|o| o.to_string()).collect()),
            ..Self::new(InputType::Select, label)
        }
    }

    fn normalized(mut self) -> Self {
        self.label = self.label.trim().to_string();
        self.options = match self.input_type {
            InputType::Select => Some(
                self.options
                    .unwrap_or_default()
                    .into_iter()
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
            ),
            _ => None,
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub inputs: Vec<Input>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            inputs: Vec::new(),
        }
    }
}

/// A persisted strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: RowId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Strategy contents as written by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewStrategy {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl NewStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Validate and normalize for persistence.
    ///
    /// The name is trimmed and must be 1..=255 characters. Fields with a blank
    /// name are dropped; options survive only on `select` inputs.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyStrategyName);
        }
        let len = name.chars().count();
        if len > MAX_NAME_LEN {
            return Err(ValidationError::StrategyNameTooLong {
                len,
                max: MAX_NAME_LEN,
            });
        }

        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let fields = self
            .fields
            .into_iter()
            .filter_map(|field| {
                let name = field.name.trim().to_string();
                if name.is_empty() {
                    return None;
                }
                Some(Field {
                    name,
                    description: field.description.trim().to_string(),
                    inputs: field.inputs.into_iter().map(Input::normalized).collect(),
                })
            })
            .collect();

        Ok(Self {
            name,
            description,
            fields,
        })
    }
}

impl From<Strategy> for NewStrategy {
    fn from(s: Strategy) -> Self {
        Self {
            name: s.name,
            description: s.description,
            fields: s.fields,
        }
    }
}

/// CRUD over the `strategies` table.
#[derive(Debug, Clone)]
pub struct StrategyStore {
    client: DataClient,
}

impl StrategyStore {
    pub fn new(client: DataClient) -> Self {
        Self { client }
    }

    /// Most recent first.
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<Strategy>, DataError> {
        let mut query = self
            .client
            .from(TABLE)
            .select("*")
            .order("created_at", SortDirection::Descending);
        if let Some(n) = limit {
            query = query.limit(n);
        }
        decode_rows(query.try_execute().await)
    }

    pub async fn get(&self, id: &RowId) -> Result<Option<Strategy>, DataError> {
        self.client
            .from(TABLE)
            .select("*")
            .eq("id", id)
            .single()
            .try_fetch::<Strategy>()
            .await
    }

    pub async fn exists(&self, id: &RowId) -> Result<bool, DataError> {
        let row = self.client.from(TABLE).select("id").eq("id", id).single().try_execute().await?;
        Ok(row.is_some())
    }

    pub async fn create(&self, strategy: NewStrategy) -> Result<Strategy, DataError> {
        let strategy = strategy.validate()?;
        let payload = to_payload(&strategy)?;
        let result = self
            .client
            .from(TABLE)
            .insert(payload)
            .select("*")
            .single()
            .try_fetch::<Strategy>()
            .await;
        let created = require(result, "strategy insert")?;
        tracing::info!(id = %created.id, name = %created.name, "Created strategy");
        Ok(created)
    }

    /// Replace a strategy's contents. Returns the updated row when the
    /// backend sends one back.
    pub async fn update(&self, id: &RowId, strategy: NewStrategy) -> Result<Option<Strategy>, DataError> {
        let strategy = strategy.validate()?;
        let payload = to_payload(&strategy)?;
        self.client
            .from(TABLE)
            .update(payload)
            .eq("id", id)
            .single()
            .try_fetch::<Strategy>()
            .await
    }

    pub async fn delete(&self, id: &RowId) -> Result<(), DataError> {
        self.client.from(TABLE).delete().eq("id", id).try_execute().await?;
        tracing::info!(id = %id, "Deleted strategy");
        Ok(())
    }
}
