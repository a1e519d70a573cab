//! Database layer: the entitlement store contract and its backends.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::models::{
    AnalyticsEvent, Entitlement, Feedback, Interaction, SubscriptionStatus, SubscriptionUpdate,
    User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const INTERACTIONS: &str = "interactions";
    pub const FEEDBACK: &str = "feedback";
    pub const ANALYTICS_EVENTS: &str = "analytics_events";
}

/// Transport or storage failure. Callers decide per call whether to fail
/// open or propagate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Persisted per-user subscription and usage state.
///
/// Every write is a single-document upsert or update; nothing here spans
/// documents atomically.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    /// Users linked to a billing customer (normally zero or one).
    async fn find_users_by_customer(&self, customer_id: &str) -> Result<Vec<User>, StoreError>;

    /// Create the user if absent. Never overwrites an existing row.
    /// Returns `true` when a new row was created.
    async fn upsert_user_stub(&self, user_id: &str, email: Option<&str>)
        -> Result<bool, StoreError>;

    /// Set `stripe_customer_id` on the user. Overwrites any previous link.
    /// Fails with `StoreError::NotFound` if the user has no row.
    async fn link_customer_by_user_id(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<(), StoreError>;

    /// Fallback link by email. Returns how many users were linked.
    async fn link_customer_by_email(
        &self,
        email: &str,
        customer_id: &str,
    ) -> Result<usize, StoreError>;

    /// Apply `update` to every user linked to `customer_id`.
    /// Returns the ids of the users that were updated.
    async fn update_subscription(
        &self,
        customer_id: &str,
        update: &SubscriptionUpdate,
    ) -> Result<Vec<String>, StoreError>;

    async fn record_interaction(&self, interaction: &Interaction) -> Result<(), StoreError>;

    /// Interactions for `user_id` with `created_at` in `[start, end)`.
    async fn count_interactions_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    /// All-time interaction count.
    async fn count_interactions(&self, user_id: &str) -> Result<u32, StoreError>;

    async fn insert_feedback(&self, feedback: &Feedback) -> Result<(), StoreError>;

    async fn has_feedback(&self, user_id: &str) -> Result<bool, StoreError>;

    async fn record_event(&self, event: &AnalyticsEvent) -> Result<(), StoreError>;

    /// Entitlement view of a user; `None` if the user is unknown.
    async fn get_entitlement(&self, user_id: &str) -> Result<Option<Entitlement>, StoreError> {
        Ok(self.get_user(user_id).await?.map(|u| u.entitlement()))
    }

    /// Transition every user linked to `customer_id` to `active`.
    async fn set_subscription_active(
        &self,
        customer_id: &str,
        subscription_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let update = SubscriptionUpdate {
            status: SubscriptionStatus::Active,
            subscription_id: Some(subscription_id.to_string()),
            start_date: Some(start),
            end_date: Some(end),
        };
        self.update_subscription(customer_id, &update).await
    }

    /// Transition every user linked to `customer_id` to `status`.
    async fn set_subscription_status(
        &self,
        customer_id: &str,
        status: SubscriptionStatus,
    ) -> Result<Vec<String>, StoreError> {
        self.update_subscription(customer_id, &SubscriptionUpdate::status_only(status))
            .await
    }
}
