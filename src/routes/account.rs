// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user usage, subscription status, feedback and signup routes.

use crate::error::Result;
use crate::middleware::AuthUser;
use crate::models::{AnalyticsEventType, Feedback};
use crate::services::metering::{usage_summary, UsageSummary};
use crate::services::notifier::{Notification, SignupMethod};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// The feedback prompt is offered in this window of lifetime interactions.
const FEEDBACK_WINDOW: std::ops::RangeInclusive<u32> = 3..=10;

/// Account routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/usage", get(get_usage))
        .route("/subscription", get(get_subscription))
        .route("/feedback", post(submit_feedback))
        .route("/notifications/signup", post(notify_signup))
}

// ─── Usage ───────────────────────────────────────────────────

async fn get_usage(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UsageSummary>> {
    let limit = state.gate.daily_limit();
    let usage = state.meter.check_daily_limit(&user.user_id, limit).await;
    let unlimited = state
        .subscriptions
        .subscription_info(&user.user_id)
        .await
        .disable_usage_limit;

    Ok(Json(usage_summary(usage.count, limit, unlimited)))
}

// ─── Subscription ────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SubscriptionResponse {
    pub is_subscribed: bool,
    pub status: String,
    pub subscription_start_date: Option<String>,
    pub subscription_end_date: Option<String>,
    pub interaction_count: u32,
    pub has_feedback: bool,
    pub should_show_feedback: bool,
}

async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SubscriptionResponse>> {
    let info = state.subscriptions.subscription_info(&user.user_id).await;
    let interaction_count = state.meter.total_interactions(&user.user_id).await;
    let has_feedback = state.store.has_feedback(&user.user_id).await?;
    let is_subscribed = info.is_subscribed();

    Ok(Json(SubscriptionResponse {
        is_subscribed,
        status: info.status.as_str().to_string(),
        subscription_start_date: info.start_date.map(format_utc_rfc3339),
        subscription_end_date: info.end_date.map(format_utc_rfc3339),
        interaction_count,
        has_feedback,
        should_show_feedback: is_subscribed
            && FEEDBACK_WINDOW.contains(&interaction_count)
            && !has_feedback,
    }))
}

// ─── Feedback ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedbackRequest {
    pub problem_solved: Option<String>,
    pub most_important_feature: Option<String>,
    pub improvement: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SuccessResponse {
    pub success: bool,
}

fn answer(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<FeedbackRequest>,
) -> Result<Json<SuccessResponse>> {
    let feedback = Feedback {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.user_id.clone(),
        problem_solved: answer(body.problem_solved),
        most_important_feature: answer(body.most_important_feature),
        improvement: answer(body.improvement),
        created_at: Utc::now(),
    };
    state.store.insert_feedback(&feedback).await?;

    state
        .subscriptions
        .track_event(
            Some(&user.user_id),
            AnalyticsEventType::FeedbackSubmitted,
            serde_json::json!({
                "hasResponse": {
                    "problemSolved": feedback.problem_solved.is_some(),
                    "mostImportantFeature": feedback.most_important_feature.is_some(),
                    "improvement": feedback.improvement.is_some(),
                }
            }),
        )
        .await;

    Ok(Json(SuccessResponse { success: true }))
}

// ─── Signup notification ─────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupRequest {
    pub method: SignupMethod,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SignupResponse {
    pub success: bool,
    pub notified: bool,
}

/// Record a first sign-in and tell the operator. Repeat calls are no-ops.
async fn notify_signup(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<SignupRequest>,
) -> Result<Json<SignupResponse>> {
    let created = state
        .store
        .upsert_user_stub(&user.user_id, user.email.as_deref())
        .await?;

    let notified = if created {
        let who = user.email.as_deref().unwrap_or(&user.user_id);
        tracing::info!(user_id = %user.user_id, method = ?body.method, "New user signup");
        state
            .notifier
            .notify(&Notification::signup(who, body.method))
            .await
    } else {
        false
    };

    Ok(Json(SignupResponse {
        success: true,
        notified,
    }))
}
