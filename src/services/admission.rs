// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admission and paywall gate for `/interact`.

use super::metering::UsageMeter;
use crate::db::EntitlementStore;
use crate::error::AppError;
use crate::middleware::AuthUser;
use std::sync::Arc;

/// How a request was admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// No identity; runs without metering.
    Anonymous,
    /// Override flag set; no paywall, no cap.
    Unlimited,
    /// Under today's limit.
    Metered { count: u32 },
    /// Limit reached: answer with the limit message, skip all providers.
    RateLimited { count: u32, limit: u32 },
}

#[derive(Clone)]
pub struct AdmissionGate {
    store: Arc<dyn EntitlementStore>,
    meter: UsageMeter,
    daily_limit: u32,
    require_subscription: bool,
    allow_anonymous: bool,
}

impl AdmissionGate {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        meter: UsageMeter,
        daily_limit: u32,
        require_subscription: bool,
        allow_anonymous: bool,
    ) -> Self {
        Self {
            store,
            meter,
            daily_limit,
            require_subscription,
            allow_anonymous,
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Decide whether `user` may run one more interaction.
    ///
    /// Errors are `Unauthorized` (no identity and anonymous use disabled) and
    /// `SubscriptionRequired`. Store failures never deny: an unreadable
    /// entitlement skips the paywall and falls through to metering, which
    /// itself fails open.
    pub async fn admit(&self, user: Option<&AuthUser>) -> Result<Admission, AppError> {
        let Some(user) = user else {
            return if self.allow_anonymous {
                Ok(Admission::Anonymous)
            } else {
                Err(AppError::Unauthorized)
            };
        };
        let user_id = user.user_id.as_str();

        let entitlement = match self.store.get_entitlement(user_id).await {
            Ok(entitlement) => Some(entitlement.unwrap_or_default()),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Entitlement lookup failed, skipping paywall");
                None
            }
        };

        if let Some(entitlement) = &entitlement {
            if entitlement.disable_usage_limit {
                return Ok(Admission::Unlimited);
            }
            if self.require_subscription && !entitlement.is_subscribed() {
                tracing::info!(user_id, status = %entitlement.status, "Subscription required");
                return Err(AppError::SubscriptionRequired);
            }
        }

        let usage = self.meter.check_daily_limit(user_id, self.daily_limit).await;
        if usage.exceeded {
            tracing::info!(user_id, count = usage.count, limit = self.daily_limit, "Daily limit reached");
            return Ok(Admission::RateLimited {
                count: usage.count,
                limit: self.daily_limit,
            });
        }

        Ok(Admission::Metered { count: usage.count })
    }
}
