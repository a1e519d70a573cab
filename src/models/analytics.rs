//! Append-only analytics events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named analytics events written by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsEventType {
    SubscriptionCreated,
    SubscriptionCancelled,
    Refund,
    FeedbackSubmitted,
}

impl AnalyticsEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsEventType::SubscriptionCreated => "subscription_created",
            AnalyticsEventType::SubscriptionCancelled => "subscription_cancelled",
            AnalyticsEventType::Refund => "refund",
            AnalyticsEventType::FeedbackSubmitted => "feedback_submitted",
        }
    }
}

/// Stored event. Never read back by the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: String,
    pub user_id: Option<String>,
    pub event_type: String,
    /// JSON-encoded metadata
    pub metadata: Option<String>,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(
        user_id: Option<&str>,
        event_type: AnalyticsEventType,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.map(str::to_string),
            event_type: event_type.as_str().to_string(),
            metadata: metadata.map(|m| m.to_string()),
            created_at: Utc::now(),
        }
    }

    /// Decoded metadata, if present and valid JSON.
    pub fn metadata_json(&self) -> Option<serde_json::Value> {
        self.metadata
            .as_deref()
            .and_then(|m| serde_json::from_str(m).ok())
    }
}
