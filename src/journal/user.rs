//! Users, keyed externally by their Telegram id.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;

use crate::db::DataClient;
use crate::error::{DataError, ValidationError};
use crate::journal::{RowId, require};

const TABLE: &str = "users";

/// A row of the `users` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: RowId,
    pub telegram_id: RowId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// The person using this session.
///
/// The server-side `id` is resolved on first use and cached here, so the
/// lookup happens at most once per session.
#[derive(Debug, Default)]
pub struct SessionUser {
    pub telegram_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    id: OnceCell<RowId>,
}

impl SessionUser {
    pub fn new(telegram_id: impl Into<String>) -> Self {
        Self {
            telegram_id: telegram_id.into(),
            ..Self::default()
        }
    }

    pub fn with_names(
        mut self,
        username: Option<String>,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Self {
        self.username = username;
        self.first_name = first_name;
        self.last_name = last_name;
        self
    }

    /// The cached server id, if already resolved.
    pub fn id(&self) -> Option<&RowId> {
        self.id.get()
    }

    /// "first last", else first, else username, else "User".
    pub fn display_name(&self) -> String {
        let nonblank = |s: &Option<String>| s.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        match (nonblank(&self.first_name), nonblank(&self.last_name)) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first,
            _ => nonblank(&self.username).unwrap_or_else(|| "User".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: RowId,
}

/// Lookup and registration of users.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    client: DataClient,
}

impl UserDirectory {
    pub fn new(client: DataClient) -> Self {
        Self { client }
    }

    pub async fn find(&self, telegram_id: &str) -> Result<Option<User>, DataError> {
        self.client
            .from(TABLE)
            .select("*")
            .eq("telegram_id", telegram_id)
            .single()
            .try_fetch::<User>()
            .await
    }

    /// Resolve the session user's server id, registering them if needed.
    pub async fn ensure(&self, user: &SessionUser) -> Result<RowId, DataError> {
        if user.telegram_id.trim().is_empty() {
            return Err(ValidationError::NoSessionUser.into());
        }
        let id = user
            .id
            .get_or_try_init(|| async {
                let existing = self
                    .client
                    .from(TABLE)
                    .select("id")
                    .eq("telegram_id", &user.telegram_id)
                    .single()
                    .try_fetch::<IdRow>()
                    .await?;
                if let Some(row) = existing {
                    tracing::debug!(telegram_id = %user.telegram_id, id = %row.id, "Resolved user");
                    return Ok(row.id);
                }

                let payload = json!({
                    "telegram_id": user.telegram_id,
                    "username": user.username,
                    "first_name": user.first_name,
                    "last_name": user.last_name,
                });
                let result = self
                    .client
                    .from(TABLE)
                    .insert(payload)
                    .select("id")
                    .single()
                    .try_fetch::<IdRow>()
                    .await;
                let created = require(result, "user insert")?;
                tracing::info!(telegram_id = %user.telegram_id, id = %created.id, "Registered user");
                Ok::<_, DataError>(created.id)
            })
            .await?;
        Ok(id.clone())
    }
}
