// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stripe REST client.
//!
//! Talks form-encoded HTTP to `api.stripe.com/v1` and only decodes the
//! handful of fields the subscription lifecycle needs.

use super::billing::{BillingError, BillingProvider, CheckoutRequest, ProviderSubscription};
use crate::time_utils::from_unix_seconds;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://api.stripe.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct CustomerObject {
    id: String,
}

#[derive(Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: String,
    status: String,
    start_date: i64,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl TryFrom<SubscriptionObject> for ProviderSubscription {
    type Error = BillingError;

    fn try_from(sub: SubscriptionObject) -> Result<Self, Self::Error> {
        let start_date = from_unix_seconds(sub.start_date)
            .ok_or_else(|| BillingError::Decode(format!("bad start_date {}", sub.start_date)))?;
        Ok(ProviderSubscription {
            id: sub.id,
            customer_id: sub.customer,
            status: sub.status,
            start_date,
        })
    }
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
            secret_key: secret_key.into(),
        })
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, BillingError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| BillingError::Transport(e.to_string()))?;
        Self::check_response_json(response).await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, BillingError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .query(query)
            .send()
            .await
            .map_err(|e| BillingError::Transport(e.to_string()))?;
        Self::check_response_json(response).await
    }

    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, BillingError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or(body);
            tracing::error!(status = %status, message = %message, "Stripe API error");
            return Err(BillingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BillingError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<String, BillingError> {
        let session: SessionResponse = self
            .post_form(
                "/checkout/sessions",
                &[
                    ("mode", "subscription"),
                    ("customer_email", &request.email),
                    ("line_items[0][price]", &request.price_id),
                    ("line_items[0][quantity]", "1"),
                    ("success_url", &request.success_url),
                    ("cancel_url", &request.cancel_url),
                    ("metadata[userId]", &request.user_id),
                ],
            )
            .await?;
        session
            .url
            .ok_or_else(|| BillingError::Decode("checkout session has no url".into()))
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, BillingError> {
        let session: SessionResponse = self
            .post_form(
                "/billing_portal/sessions",
                &[("customer", customer_id), ("return_url", return_url)],
            )
            .await?;
        session
            .url
            .ok_or_else(|| BillingError::Decode("portal session has no url".into()))
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<String>, BillingError> {
        let customers: ListResponse<CustomerObject> = self
            .get_json("/customers", &[("email", email), ("limit", "1")])
            .await?;
        Ok(customers.data.into_iter().next().map(|c| c.id))
    }

    async fn find_active_subscription(
        &self,
        customer_id: &str,
    ) -> Result<Option<ProviderSubscription>, BillingError> {
        let subs: ListResponse<SubscriptionObject> = self
            .get_json(
                "/subscriptions",
                &[("customer", customer_id), ("status", "active"), ("limit", "1")],
            )
            .await?;
        subs.data
            .into_iter()
            .next()
            .map(ProviderSubscription::try_from)
            .transpose()
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, BillingError> {
        let path = format!("/subscriptions/{}", urlencoding::encode(subscription_id));
        let sub: SubscriptionObject = self.get_json(&path, &[]).await?;
        sub.try_into()
    }
}
