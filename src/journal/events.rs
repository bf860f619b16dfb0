//! Usage events written to `user_events`.
//!
//! Tracking is best effort: a failed write is logged and dropped so it never
//! interrupts the action being tracked.

use serde_json::{Value, json};

use crate::db::DataClient;

const TABLE: &str = "user_events";

#[derive(Debug, Clone)]
pub struct EventTracker {
    client: DataClient,
}

impl EventTracker {
    pub fn new(client: DataClient) -> Self {
        Self { client }
    }

    /// Record `event_type` with free-form `data`. Returns whether it was stored.
    pub async fn track(&self, event_type: &str, data: Value) -> bool {
        let envelope = self
            .client
            .from(TABLE)
            .insert(json!({ "event_type": event_type, "event_data": data }))
            .await;
        match envelope.error {
            None => true,
            Some(error) => {
                tracing::debug!(event_type, error = %error, "Dropped usage event");
                false
            }
        }
    }
}
