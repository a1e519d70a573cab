// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Billing webhook authentication and event decoding.
//!
//! Signature header format: `t=<unix seconds>,v1=<hex>` where `v1` is
//! HMAC-SHA256 over `"{t}.{raw body}"` keyed with the endpoint secret.
//! Timestamps more than 300 seconds from now are rejected.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use stripe::{Webhook, WebhookError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,

    #[error("timestamp outside tolerance")]
    Expired,

    #[error("signature mismatch")]
    Mismatch,
}

/// Verify a signature header against the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
) -> Result<(), SignatureError> {
    let payload = std::str::from_utf8(payload).map_err(|_| SignatureError::Malformed)?;

    match Webhook::construct_event(payload, header, secret) {
        Ok(_) => Ok(()),
        // Signature and timestamp held; the body is decoded by `parse_event`.
        Err(WebhookError::BadParse(_)) => Ok(()),
        Err(WebhookError::BadTimestamp(_)) => Err(SignatureError::Expired),
        Err(WebhookError::BadSignature) => Err(SignatureError::Mismatch),
        Err(e) => {
            tracing::debug!(error = %e, "Unreadable signature header");
            Err(SignatureError::Malformed)
        }
    }
}

/// A verified billing event, reduced to the fields the lifecycle acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    CheckoutCompleted {
        mode: String,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        user_id: Option<String>,
        email: Option<String>,
    },
    SubscriptionUpdated {
        customer_id: String,
        subscription_id: String,
        status: String,
        start_date: DateTime<Utc>,
    },
    SubscriptionDeleted {
        customer_id: String,
    },
    ChargeRefunded {
        customer_id: Option<String>,
        amount_refunded: i64,
    },
    InvoicePaymentFailed {
        customer_id: String,
    },
    Unhandled(String),
}

impl BillingEvent {
    pub fn kind(&self) -> &str {
        match self {
            BillingEvent::CheckoutCompleted { .. } => "checkout.session.completed",
            BillingEvent::SubscriptionUpdated { .. } => "customer.subscription.updated",
            BillingEvent::SubscriptionDeleted { .. } => "customer.subscription.deleted",
            BillingEvent::ChargeRefunded { .. } => "charge.refunded",
            BillingEvent::InvoicePaymentFailed { .. } => "invoice.payment_failed",
            BillingEvent::Unhandled(kind) => kind,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid timestamp {0}")]
    Timestamp(i64),
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct CheckoutSession {
    mode: Option<String>,
    customer: Option<String>,
    subscription: Option<String>,
    customer_email: Option<String>,
    #[serde(default)]
    metadata: Option<CheckoutMetadata>,
}

#[derive(Deserialize)]
struct CheckoutMetadata {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct Subscription {
    id: String,
    customer: String,
    status: String,
    start_date: i64,
}

#[derive(Deserialize)]
struct Charge {
    customer: Option<String>,
    #[serde(default)]
    amount_refunded: i64,
}

#[derive(Deserialize)]
struct Invoice {
    customer: String,
}

/// Decode a (verified) webhook body.
pub fn parse_event(payload: &[u8]) -> Result<BillingEvent, EventParseError> {
    let raw: RawEvent = serde_json::from_slice(payload)?;
    let object = raw.data.object;

    let event = match raw.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSession = serde_json::from_value(object)?;
            BillingEvent::CheckoutCompleted {
                mode: session.mode.unwrap_or_default(),
                customer_id: session.customer,
                subscription_id: session.subscription,
                user_id: session.metadata.and_then(|m| m.user_id),
                email: session.customer_email,
            }
        }
        "customer.subscription.updated" => {
            let sub: Subscription = serde_json::from_value(object)?;
            let start_date = crate::time_utils::from_unix_seconds(sub.start_date)
                .ok_or(EventParseError::Timestamp(sub.start_date))?;
            BillingEvent::SubscriptionUpdated {
                customer_id: sub.customer,
                subscription_id: sub.id,
                status: sub.status,
                start_date,
            }
        }
        "customer.subscription.deleted" => {
            let sub: Subscription = serde_json::from_value(object)?;
            BillingEvent::SubscriptionDeleted {
                customer_id: sub.customer,
            }
        }
        "charge.refunded" => {
            let charge: Charge = serde_json::from_value(object)?;
            BillingEvent::ChargeRefunded {
                customer_id: charge.customer,
                amount_refunded: charge.amount_refunded,
            }
        }
        "invoice.payment_failed" => {
            let invoice: Invoice = serde_json::from_value(object)?;
            BillingEvent::InvoicePaymentFailed {
                customer_id: invoice.customer,
            }
        }
        _ => BillingEvent::Unhandled(raw.event_type),
    };

    Ok(event)
}
