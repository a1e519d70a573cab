// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription lifecycle.
//!
//! Transitions over `{inactive, active, cancelled, past_due}` driven by
//! verified billing webhooks and by user-initiated sync. Events may arrive
//! more than once; every transition writes absolute state so replays land
//! in the same place (analytics rows are at-least-once).
//!
//! Linking a customer and activating it are two separate store writes. A
//! partial application is repaired by the next webhook or sync.

use super::billing::{BillingProvider, ProviderSubscription};
use super::notifier::{dispatch, Notification, Notifier};
use super::webhook::BillingEvent;
use crate::db::{EntitlementStore, StoreError};
use crate::error::{AppError, Result};
use crate::models::{
    AnalyticsEvent, AnalyticsEventType, Entitlement, SubscriptionStatus, SubscriptionUpdate,
};
use crate::time_utils::subscription_period_end;
use std::sync::Arc;

#[derive(Clone)]
pub struct SubscriptionManager {
    store: Arc<dyn EntitlementStore>,
    billing: Arc<dyn BillingProvider>,
    notifier: Arc<dyn Notifier>,
    price_cents: i64,
}

impl SubscriptionManager {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        billing: Arc<dyn BillingProvider>,
        notifier: Arc<dyn Notifier>,
        price_cents: i64,
    ) -> Self {
        Self {
            store,
            billing,
            notifier,
            price_cents,
        }
    }

    /// Apply one verified webhook event.
    pub async fn apply_event(&self, event: BillingEvent) -> Result<()> {
        match event {
            BillingEvent::CheckoutCompleted {
                mode,
                customer_id,
                subscription_id,
                user_id,
                email,
            } => {
                if mode != "subscription" {
                    tracing::info!(mode = %mode, "Ignoring non-subscription checkout");
                    return Ok(());
                }
                let customer_id = customer_id
                    .ok_or_else(|| AppError::BadRequest("Missing customer".into()))?;

                // By user id first; email is the fallback. A user can reach
                // checkout without ever having a row, so create it first.
                if let Some(user_id) = user_id.as_deref() {
                    self.store
                        .upsert_user_stub(user_id, email.as_deref())
                        .await?;
                    self.store
                        .link_customer_by_user_id(user_id, &customer_id)
                        .await?;
                } else if let Some(email) = email.as_deref() {
                    let linked = self.store.link_customer_by_email(email, &customer_id).await?;
                    if linked == 0 {
                        tracing::warn!(customer_id = %customer_id, "No user matched checkout email");
                    }
                } else {
                    tracing::error!(customer_id = %customer_id, "Cannot link customer: missing userId and email");
                    return Err(AppError::BadRequest("Missing userId or email".into()));
                }

                let subscription_id = subscription_id
                    .ok_or_else(|| AppError::BadRequest("Missing subscription".into()))?;
                let subscription = self.billing.retrieve_subscription(&subscription_id).await?;
                self.activate(&customer_id, &subscription).await?;

                tracing::info!(
                    customer_id = %customer_id,
                    user_id = ?user_id,
                    "Subscription activated from checkout"
                );
            }

            BillingEvent::SubscriptionUpdated {
                customer_id,
                subscription_id,
                status,
                start_date,
            } => {
                match status.as_str() {
                    "active" => {
                        let update = SubscriptionUpdate {
                            status: SubscriptionStatus::Active,
                            subscription_id: Some(subscription_id),
                            start_date: Some(start_date),
                            end_date: Some(subscription_period_end(start_date)),
                        };
                        self.store.update_subscription(&customer_id, &update).await?;
                    }
                    "past_due" => {
                        self.deactivate(&customer_id, SubscriptionStatus::PastDue, "past_due")
                            .await?;
                    }
                    _ => {}
                }
                tracing::info!(customer_id = %customer_id, status = %status, "Subscription updated");
            }

            BillingEvent::SubscriptionDeleted { customer_id } => {
                self.deactivate(&customer_id, SubscriptionStatus::Cancelled, "cancelled")
                    .await?;
                tracing::info!(customer_id = %customer_id, "Subscription cancelled");
            }

            BillingEvent::ChargeRefunded {
                customer_id,
                amount_refunded,
            } => {
                let Some(customer_id) = customer_id else {
                    tracing::info!("Refund without customer, ignoring");
                    return Ok(());
                };
                self.deactivate(&customer_id, SubscriptionStatus::Cancelled, "cancelled")
                    .await?;
                self.track_event(
                    None,
                    AnalyticsEventType::Refund,
                    serde_json::json!({
                        "stripeCustomerId": customer_id,
                        "amount": amount_refunded,
                    }),
                )
                .await;
                tracing::info!(customer_id = %customer_id, amount_refunded, "Refund processed");
            }

            BillingEvent::InvoicePaymentFailed { customer_id } => {
                let user_ids = self
                    .deactivate(&customer_id, SubscriptionStatus::PastDue, "past_due")
                    .await?;
                dispatch(
                    &self.notifier,
                    Notification::payment_failed(&customer_id, &user_ids),
                );
                tracing::info!(customer_id = %customer_id, "Payment failed");
            }

            BillingEvent::Unhandled(kind) => {
                tracing::info!(event_type = %kind, "Unhandled webhook event");
            }
        }

        Ok(())
    }

    /// Mark every user linked to `customer_id` active for `subscription`.
    ///
    /// The end date is approximated as start + 30 days. Matching no user is
    /// an error so a paid activation is never dropped silently.
    pub async fn activate(
        &self,
        customer_id: &str,
        subscription: &ProviderSubscription,
    ) -> Result<Vec<String>> {
        let start = subscription.start_date;
        let end = subscription_period_end(start);

        let user_ids = self
            .store
            .set_subscription_active(customer_id, &subscription.id, start, end)
            .await?;

        let Some(user_id) = user_ids.first() else {
            tracing::error!(customer_id, "Activation matched no linked user");
            return Err(StoreError::NotFound(format!(
                "user linked to customer {}",
                customer_id
            ))
            .into());
        };
        self.track_event(
            Some(user_id),
            AnalyticsEventType::SubscriptionCreated,
            serde_json::json!({
                "stripeSubscriptionId": subscription.id,
                "amount": self.price_cents,
            }),
        )
        .await;

        Ok(user_ids)
    }

    /// Move every user linked to `customer_id` to `status`.
    pub async fn deactivate(
        &self,
        customer_id: &str,
        status: SubscriptionStatus,
        reason: &str,
    ) -> Result<Vec<String>> {
        let user_ids = self
            .store
            .set_subscription_status(customer_id, status)
            .await?;

        if let Some(user_id) = user_ids.first() {
            self.track_event(
                Some(user_id),
                AnalyticsEventType::SubscriptionCancelled,
                serde_json::json!({ "reason": reason }),
            )
            .await;
        }

        Ok(user_ids)
    }

    /// Re-query the billing provider for the user's email and activate a
    /// found subscription.
    pub async fn sync_for_user(&self, user_id: &str, email: &str) -> Result<()> {
        let customer_id = self
            .billing
            .find_customer_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("No Stripe customer found with your email".into()))?;

        self.store.upsert_user_stub(user_id, Some(email)).await?;
        self.store
            .link_customer_by_user_id(user_id, &customer_id)
            .await?;

        let subscription = self
            .billing
            .find_active_subscription(&customer_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(
                    "No active subscription found. If you just subscribed, please wait a moment and try again."
                        .into(),
                )
            })?;

        self.activate(&customer_id, &subscription).await?;
        tracing::info!(user_id, customer_id = %customer_id, "Manual sync activated subscription");
        Ok(())
    }

    /// Entitlement for display. Unknown users and store failures read as
    /// inactive.
    pub async fn subscription_info(&self, user_id: &str) -> Entitlement {
        match self.store.get_entitlement(user_id).await {
            Ok(entitlement) => entitlement.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to read subscription info");
                Entitlement::default()
            }
        }
    }

    /// Append an analytics event. Failures are logged only.
    pub async fn track_event(
        &self,
        user_id: Option<&str>,
        event_type: AnalyticsEventType,
        metadata: serde_json::Value,
    ) {
        let event = AnalyticsEvent::new(user_id, event_type, Some(metadata));
        if let Err(e) = self.store.record_event(&event).await {
            tracing::warn!(event_type = event_type.as_str(), error = %e, "Failed to track analytics event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::User;
    use crate::services::billing::{BillingError, CheckoutRequest};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBilling {
        customer: Option<String>,
        subscription: Option<ProviderSubscription>,
    }

    #[async_trait]
    impl BillingProvider for FakeBilling {
        async fn create_checkout_session(
            &self,
            _: &CheckoutRequest,
        ) -> std::result::Result<String, BillingError> {
            Ok("https://checkout.test".into())
        }

        async fn create_portal_session(
            &self,
            _: &str,
            _: &str,
        ) -> std::result::Result<String, BillingError> {
            Ok("https://portal.test".into())
        }

        async fn find_customer_by_email(
            &self,
            _: &str,
        ) -> std::result::Result<Option<String>, BillingError> {
            Ok(self.customer.clone())
        }

        async fn find_active_subscription(
            &self,
            _: &str,
        ) -> std::result::Result<Option<ProviderSubscription>, BillingError> {
            Ok(self.subscription.clone())
        }

        async fn retrieve_subscription(
            &self,
            _: &str,
        ) -> std::result::Result<ProviderSubscription, BillingError> {
            self.subscription
                .clone()
                .ok_or_else(|| BillingError::Api {
                    status: 404,
                    message: "No such subscription".into(),
                })
        }
    }

    #[derive(Default)]
    struct CountingNotifier(AtomicUsize);

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, _: &Notification) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 8, 30, 0).unwrap()
    }

    fn subscription() -> ProviderSubscription {
        ProviderSubscription {
            id: "sub_1".into(),
            customer_id: "cus_1".into(),
            status: "active".into(),
            start_date: start(),
        }
    }

    fn manager(store: &MemoryStore, billing: FakeBilling) -> SubscriptionManager {
        SubscriptionManager::new(
            Arc::new(store.clone()),
            Arc::new(billing),
            Arc::new(CountingNotifier::default()),
            900,
        )
    }

    fn with_subscription() -> FakeBilling {
        FakeBilling {
            customer: Some("cus_1".into()),
            subscription: Some(subscription()),
        }
    }

    fn checkout(user_id: Option<&str>, email: Option<&str>) -> BillingEvent {
        BillingEvent::CheckoutCompleted {
            mode: "subscription".into(),
            customer_id: Some("cus_1".into()),
            subscription_id: Some("sub_1".into()),
            user_id: user_id.map(str::to_string),
            email: email.map(str::to_string),
        }
    }

    fn count_events(store: &MemoryStore, kind: AnalyticsEventType) -> usize {
        store
            .events()
            .iter()
            .filter(|e| e.event_type == kind.as_str())
            .count()
    }

    #[tokio::test]
    async fn test_checkout_activates_with_thirty_day_period() {
        let store = MemoryStore::new();
        store.upsert_user_stub("u1", None).await.unwrap();
        let manager = manager(&store, with_subscription());

        manager.apply_event(checkout(Some("u1"), None)).await.unwrap();

        let user = store.get_entitlement("u1").await.unwrap().unwrap();
        assert_eq!(user.status, SubscriptionStatus::Active);
        assert_eq!(user.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(user.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(user.start_date, Some(start()));
        assert_eq!(user.end_date, Some(start() + Duration::days(30)));
        assert_eq!(count_events(&store, AnalyticsEventType::SubscriptionCreated), 1);
    }

    #[tokio::test]
    async fn test_checkout_falls_back_to_email() {
        let store = MemoryStore::new();
        store
            .upsert_user_stub("u1", Some("a@example.com"))
            .await
            .unwrap();
        let manager = manager(&store, with_subscription());

        manager
            .apply_event(checkout(None, Some("a@example.com")))
            .await
            .unwrap();

        let user = store.get_entitlement("u1").await.unwrap().unwrap();
        assert_eq!(user.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_checkout_without_identity_is_rejected() {
        let store = MemoryStore::new();
        let manager = manager(&store, with_subscription());
        let err = manager.apply_event(checkout(None, None)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_checkout_creates_missing_user_row() {
        let store = MemoryStore::new();
        let manager = manager(&store, with_subscription());

        manager
            .apply_event(checkout(Some("u1"), Some("a@example.com")))
            .await
            .unwrap();

        let user = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.email.as_deref(), Some("a@example.com"));
        assert_eq!(user.subscription_status, SubscriptionStatus::Active);
        assert_eq!(user.stripe_customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn test_checkout_email_matching_nobody_fails() {
        let store = MemoryStore::new();
        let manager = manager(&store, with_subscription());

        let err = manager
            .apply_event(checkout(None, Some("nobody@example.com")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::NotFound(_))));
        assert_eq!(count_events(&store, AnalyticsEventType::SubscriptionCreated), 0);
    }

    #[tokio::test]
    async fn test_activation_is_idempotent() {
        let store = MemoryStore::new();
        store.upsert_user_stub("u1", None).await.unwrap();
        let manager = manager(&store, with_subscription());

        manager.apply_event(checkout(Some("u1"), None)).await.unwrap();
        let first = store.get_entitlement("u1").await.unwrap().unwrap();
        manager.apply_event(checkout(Some("u1"), None)).await.unwrap();
        let second = store.get_entitlement("u1").await.unwrap().unwrap();

        assert_eq!(first, second);
        // At-least-once: a replay may record the analytics event again.
        assert!(count_events(&store, AnalyticsEventType::SubscriptionCreated) >= 1);
    }

    #[tokio::test]
    async fn test_refund_cancels_and_records_amount() {
        let store = MemoryStore::new();
        let mut user = User::stub("u1", None, Utc::now());
        user.stripe_customer_id = Some("cus_1".into());
        user.subscription_status = SubscriptionStatus::Active;
        store.put_user(user);
        let manager = manager(&store, with_subscription());

        manager
            .apply_event(BillingEvent::ChargeRefunded {
                customer_id: Some("cus_1".into()),
                amount_refunded: 900,
            })
            .await
            .unwrap();

        let user = store.get_entitlement("u1").await.unwrap().unwrap();
        assert_eq!(user.status, SubscriptionStatus::Cancelled);

        let refunds: Vec<_> = store
            .events()
            .into_iter()
            .filter(|e| e.event_type == "refund")
            .collect();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].user_id, None);
        let metadata = refunds[0].metadata_json().unwrap();
        assert_eq!(metadata["amount"], 900);
        assert_eq!(metadata["stripeCustomerId"], "cus_1");
    }

    #[tokio::test]
    async fn test_subscription_updates() {
        let store = MemoryStore::new();
        let mut user = User::stub("u1", None, Utc::now());
        user.stripe_customer_id = Some("cus_1".into());
        store.put_user(user);
        let manager = manager(&store, with_subscription());

        manager
            .apply_event(BillingEvent::SubscriptionUpdated {
                customer_id: "cus_1".into(),
                subscription_id: "sub_2".into(),
                status: "active".into(),
                start_date: start(),
            })
            .await
            .unwrap();
        let user = store.get_entitlement("u1").await.unwrap().unwrap();
        assert_eq!(user.status, SubscriptionStatus::Active);
        assert_eq!(user.subscription_id.as_deref(), Some("sub_2"));
        assert_eq!(user.end_date, Some(start() + Duration::days(30)));

        manager
            .apply_event(BillingEvent::SubscriptionUpdated {
                customer_id: "cus_1".into(),
                subscription_id: "sub_2".into(),
                status: "past_due".into(),
                start_date: start(),
            })
            .await
            .unwrap();
        let user = store.get_entitlement("u1").await.unwrap().unwrap();
        assert_eq!(user.status, SubscriptionStatus::PastDue);
        // Dates survive a status-only transition.
        assert_eq!(user.start_date, Some(start()));

        manager
            .apply_event(BillingEvent::SubscriptionDeleted {
                customer_id: "cus_1".into(),
            })
            .await
            .unwrap();
        let user = store.get_entitlement("u1").await.unwrap().unwrap();
        assert_eq!(user.status, SubscriptionStatus::Cancelled);
        assert_eq!(count_events(&store, AnalyticsEventType::SubscriptionCancelled), 2);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let manager = manager(&store, with_subscription());
        let err = manager
            .apply_event(BillingEvent::SubscriptionDeleted {
                customer_id: "cus_1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }

    #[tokio::test]
    async fn test_sync_links_and_activates() {
        let store = MemoryStore::new();
        store.upsert_user_stub("u1", None).await.unwrap();
        let manager = manager(&store, with_subscription());

        manager.sync_for_user("u1", "a@example.com").await.unwrap();

        let user = store.get_entitlement("u1").await.unwrap().unwrap();
        assert_eq!(user.status, SubscriptionStatus::Active);
        assert_eq!(user.customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn test_sync_creates_missing_user_row() {
        let store = MemoryStore::new();
        let manager = manager(&store, with_subscription());

        manager.sync_for_user("u1", "a@example.com").await.unwrap();

        let user = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.email.as_deref(), Some("a@example.com"));
        assert_eq!(user.subscription_status, SubscriptionStatus::Active);
        assert_eq!(user.stripe_subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn test_sync_without_customer_or_subscription() {
        let store = MemoryStore::new();
        store.upsert_user_stub("u1", None).await.unwrap();

        let none = manager(
            &store,
            FakeBilling {
                customer: None,
                subscription: None,
            },
        );
        assert!(matches!(
            none.sync_for_user("u1", "a@example.com").await,
            Err(AppError::NotFound(_))
        ));

        let no_sub = manager(
            &store,
            FakeBilling {
                customer: Some("cus_9".into()),
                subscription: None,
            },
        );
        assert!(matches!(
            no_sub.sync_for_user("u1", "a@example.com").await,
            Err(AppError::NotFound(_))
        ));
        // The customer link is kept even without an active subscription.
        let user = store.get_entitlement("u1").await.unwrap().unwrap();
        assert_eq!(user.customer_id.as_deref(), Some("cus_9"));
        assert_eq!(user.status, SubscriptionStatus::Inactive);
    }

    #[tokio::test]
    async fn test_subscription_info_fails_open() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let manager = manager(&store, with_subscription());
        let info = manager.subscription_info("u1").await;
        assert!(!info.is_subscribed());
        assert_eq!(info.status, SubscriptionStatus::Inactive);
    }
}
