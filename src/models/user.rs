//! User model: identity plus subscription sub-state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Billing state of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Inactive,
    Active,
    Cancelled,
    PastDue,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::PastDue => "past_due",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User document stored in Firestore (document ID = user id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Externally issued identity (JWT `sub`)
    pub id: String,
    /// Email address, if the identity provider shared one
    pub email: Option<String>,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub subscription_status: SubscriptionStatus,
    /// Billing-provider customer; last link wins
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub stripe_subscription_id: Option<String>,
    #[serde(default, with = "firestore::serialize_as_optional_timestamp")]
    pub subscription_start_date: Option<DateTime<Utc>>,
    #[serde(default, with = "firestore::serialize_as_optional_timestamp")]
    pub subscription_end_date: Option<DateTime<Utc>>,
    /// Admin override: bypasses both the paywall and the daily cap
    #[serde(default)]
    pub disable_usage_limit: bool,
}

impl User {
    /// A fresh stub as created on first sight of an identity.
    pub fn stub(id: &str, email: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            email: email.map(str::to_string),
            created_at: now,
            subscription_status: SubscriptionStatus::Inactive,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            subscription_start_date: None,
            subscription_end_date: None,
            disable_usage_limit: false,
        }
    }

    pub fn entitlement(&self) -> Entitlement {
        Entitlement {
            status: self.subscription_status,
            disable_usage_limit: self.disable_usage_limit,
            customer_id: self.stripe_customer_id.clone(),
            subscription_id: self.stripe_subscription_id.clone(),
            start_date: self.subscription_start_date,
            end_date: self.subscription_end_date,
        }
    }

    /// Apply a subscription update. `None` fields are left untouched.
    pub fn apply(&mut self, update: &SubscriptionUpdate) {
        self.subscription_status = update.status;
        if let Some(id) = &update.subscription_id {
            self.stripe_subscription_id = Some(id.clone());
        }
        if let Some(start) = update.start_date {
            self.subscription_start_date = Some(start);
        }
        if let Some(end) = update.end_date {
            self.subscription_end_date = Some(end);
        }
    }
}

/// The slice of a user the admission decision is made from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entitlement {
    pub status: SubscriptionStatus,
    pub disable_usage_limit: bool,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Entitlement {
    /// Unrestricted access: the override flag wins over any status.
    pub fn is_subscribed(&self) -> bool {
        self.disable_usage_limit || self.status == SubscriptionStatus::Active
    }
}

/// A transition applied to every user linked to a billing customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub status: SubscriptionStatus,
    pub subscription_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl SubscriptionUpdate {
    pub fn status_only(status: SubscriptionStatus) -> Self {
        Self {
            status,
            subscription_id: None,
            start_date: None,
            end_date: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_always_entitled() {
        for status in [
            SubscriptionStatus::Inactive,
            SubscriptionStatus::Active,
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::PastDue,
        ] {
            let entitlement = Entitlement {
                status,
                disable_usage_limit: true,
                ..Default::default()
            };
            assert!(entitlement.is_subscribed(), "status {status} should be entitled");
        }
    }

    #[test]
    fn test_only_active_is_subscribed() {
        let mut entitlement = Entitlement::default();
        assert!(!entitlement.is_subscribed());
        entitlement.status = SubscriptionStatus::PastDue;
        assert!(!entitlement.is_subscribed());
        entitlement.status = SubscriptionStatus::Active;
        assert!(entitlement.is_subscribed());
    }

    #[test]
    fn test_status_only_update_keeps_dates() {
        let now = Utc::now();
        let mut user = User::stub("u1", None, now);
        user.subscription_start_date = Some(now);
        user.apply(&SubscriptionUpdate::status_only(SubscriptionStatus::Cancelled));
        assert_eq!(user.subscription_status, SubscriptionStatus::Cancelled);
        assert_eq!(user.subscription_start_date, Some(now));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SubscriptionStatus::PastDue).unwrap(),
            "\"past_due\""
        );
    }
}
