// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Daily usage metering.
//!
//! Usage is the number of Interaction rows a user has in the current UTC
//! calendar day. The check and the later write are separate store calls, so
//! concurrent requests can overshoot the limit: this is a soft cap.

use crate::db::EntitlementStore;
use crate::models::Interaction;
use crate::time_utils::utc_day_bounds;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Result of a daily limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyUsage {
    pub exceeded: bool,
    pub count: u32,
}

/// `GET /usage` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UsageSummary {
    pub count: u32,
    pub remaining: u32,
    pub limit: u32,
    pub percentage: u32,
    pub unlimited: bool,
}

/// Shape the usage numbers for display.
pub fn usage_summary(count: u32, limit: u32, unlimited: bool) -> UsageSummary {
    let percentage = if limit == 0 {
        100
    } else {
        ((count as f64 / limit as f64) * 100.0).round() as u32
    };
    UsageSummary {
        count,
        remaining: limit.saturating_sub(count),
        limit,
        percentage,
        unlimited,
    }
}

#[derive(Clone)]
pub struct UsageMeter {
    store: Arc<dyn EntitlementStore>,
}

impl UsageMeter {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn check_daily_limit(&self, user_id: &str, limit: u32) -> DailyUsage {
        self.check_daily_limit_at(user_id, limit, Utc::now()).await
    }

    /// Count today's interactions as of `now`. Fails open.
    pub async fn check_daily_limit_at(
        &self,
        user_id: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> DailyUsage {
        let (start, end) = utc_day_bounds(now);
        match self
            .store
            .count_interactions_between(user_id, start, end)
            .await
        {
            Ok(count) => DailyUsage {
                exceeded: count >= limit,
                count,
            },
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Usage check failed, allowing request");
                DailyUsage {
                    exceeded: false,
                    count: 0,
                }
            }
        }
    }

    /// All-time interaction count, 0 when the store is unreachable.
    pub async fn total_interactions(&self, user_id: &str) -> u32 {
        self.store
            .count_interactions(user_id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(user_id, error = %e, "Failed to count interactions");
                0
            })
    }

    /// Commit one interaction: ensure the user row exists, then append the
    /// Interaction. Failures are logged and swallowed.
    pub async fn record_interaction(&self, user_id: &str, email: Option<&str>) -> Option<String> {
        if let Err(e) = self.store.upsert_user_stub(user_id, email).await {
            tracing::error!(user_id, error = %e, "Failed to ensure user exists");
            return None;
        }

        let interaction = Interaction::new(user_id, Utc::now());
        match self.store.record_interaction(&interaction).await {
            Ok(()) => {
                tracing::info!(user_id, interaction_id = %interaction.id, "Recorded interaction");
                Some(interaction.id)
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to record interaction");
                None
            }
        }
    }
}
