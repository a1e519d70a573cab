// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Checkout, customer portal and manual subscription sync.

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::services::billing::CheckoutRequest;
use crate::AppState;
use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Billing routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/portal", post(create_portal))
        .route("/subscription/sync", post(sync_subscription))
}

/// A hosted page on the billing provider's site.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RedirectResponse {
    pub url: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
}

/// Checkout and sync key off the email the identity provider shared.
fn require_email(user: &AuthUser) -> Result<&str> {
    user.email.as_deref().ok_or(AppError::Unauthorized)
}

/// Start a hosted subscription checkout tagged with the user id.
async fn create_checkout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RedirectResponse>> {
    let email = require_email(&user)?;
    let frontend = &state.config.frontend_url;

    let request = CheckoutRequest {
        user_id: user.user_id.clone(),
        email: email.to_string(),
        price_id: state.config.stripe_price_id.clone(),
        success_url: format!("{}?subscribed=true", frontend),
        cancel_url: format!("{}?cancelled=true", frontend),
    };
    let url = state.billing.create_checkout_session(&request).await?;

    tracing::info!(user_id = %user.user_id, "Checkout session created");
    Ok(Json(RedirectResponse { url }))
}

/// Open the self-service portal for the linked customer.
async fn create_portal(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RedirectResponse>> {
    let customer_id = state
        .store
        .get_entitlement(&user.user_id)
        .await?
        .and_then(|e| e.customer_id)
        .ok_or_else(|| {
            AppError::NotFound("No Stripe customer found. Please subscribe first.".into())
        })?;

    let url = state
        .billing
        .create_portal_session(&customer_id, &state.config.frontend_url)
        .await?;
    Ok(Json(RedirectResponse { url }))
}

/// Pull subscription state from the provider when a webhook has not landed.
async fn sync_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SyncResponse>> {
    let email = require_email(&user)?;
    state.subscriptions.sync_for_user(&user.user_id, email).await?;

    Ok(Json(SyncResponse {
        success: true,
        message: "Subscription synced successfully!".to_string(),
    }))
}
