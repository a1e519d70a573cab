// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payment-provider port used by the subscription lifecycle and billing routes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, thiserror::Error)]
pub enum BillingError {
    #[error("billing request failed: {0}")]
    Transport(String),

    #[error("billing API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode billing response: {0}")]
    Decode(String),
}

/// Hosted checkout request for one subscription seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub email: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// A subscription as seen at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSubscription {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub start_date: DateTime<Utc>,
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a hosted checkout session and return its URL.
    async fn create_checkout_session(&self, request: &CheckoutRequest)
        -> Result<String, BillingError>;

    /// Create a self-service portal session and return its URL.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, BillingError>;

    /// First customer registered under `email`, if any.
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<String>, BillingError>;

    /// First active subscription of `customer_id`, if any.
    async fn find_active_subscription(
        &self,
        customer_id: &str,
    ) -> Result<Option<ProviderSubscription>, BillingError>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, BillingError>;
}
