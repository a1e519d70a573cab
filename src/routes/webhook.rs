// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook route for billing-provider events.

use crate::error::{AppError, Result};
use crate::services::webhook::{parse_event, verify_signature};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Header carrying `t=<unix>,v1=<hex>`.
const SIGNATURE_HEADER: &str = "stripe-signature";

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhooks/billing", post(handle_event))
}

#[derive(Serialize)]
struct WebhookAck {
    received: bool,
}

/// Receive one billing event.
///
/// The signature is checked over the raw body before anything is parsed.
/// Unhandled event types are acknowledged. Store failures while applying a
/// verified event answer 500 so the provider redelivers.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::SignatureInvalid("missing signature header".into()))?;

    verify_signature(&body, signature, &state.config.stripe_webhook_secret)
        .map_err(|e| AppError::SignatureInvalid(e.to_string()))?;

    let event = parse_event(&body).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse verified webhook");
        AppError::BadRequest("Invalid event payload".into())
    })?;

    tracing::info!(event_type = %event.kind(), "Processing billing webhook");
    state.subscriptions.apply_event(event).await?;

    Ok(Json(WebhookAck { received: true }))
}
