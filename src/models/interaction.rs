//! Interaction log: one row per admitted assistant exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable audit/metering record. Counting a user's rows inside a UTC day
/// gives that day's usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub user_id: String,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Interaction {
    pub fn new(user_id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at,
        }
    }
}
