// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed entitlement store.
//!
//! Collections:
//! - `users` (keyed by user id)
//! - `interactions` (one document per admitted request)
//! - `feedback`
//! - `analytics_events`
//!
//! The daily usage query filters `interactions` on `user_id` equality plus a
//! `created_at` range, which needs a composite index on
//! `(user_id ASC, created_at ASC)`.

use super::{collections, EntitlementStore, StoreError};
use crate::models::{AnalyticsEvent, Feedback, Interaction, SubscriptionUpdate, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use firestore::{path, FirestoreTimestamp, FirestoreWritePrecondition};
use serde::Deserialize;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

fn query_err(e: FirestoreError) -> StoreError {
    StoreError::Query(e.to_string())
}

/// Result row of a `COUNT` aggregation.
#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

/// User fields written by a subscription transition. Fields the update
/// leaves unset stay out of the mask.
fn subscription_fields(update: &SubscriptionUpdate) -> Vec<String> {
    let mut fields = vec![path!(User::subscription_status)];
    if update.subscription_id.is_some() {
        fields.push(path!(User::stripe_subscription_id));
    }
    if update.start_date.is_some() {
        fields.push(path!(User::subscription_start_date));
    }
    if update.end_date.is_some() {
        fields.push(path!(User::subscription_end_date));
    }
    fields
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, StoreError> {
        // The emulator rejects real credentials, so skip the metadata server.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, StoreError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a disconnected client (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, StoreError> {
        self.client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("Database not connected (offline mode)".into()))
    }

    /// Insert or replace a whole user document, including the
    /// admin-managed `disable_usage_limit` flag.
    pub async fn put_user(&self, user: &User) -> Result<(), StoreError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(query_err)?;
        Ok(())
    }

    /// Write only `fields` of `user`. Everything else in the document
    /// (email, the usage override) is left as stored. The document must
    /// already exist.
    async fn write_user_fields(
        &self,
        user: &User,
        fields: Vec<String>,
    ) -> Result<(), StoreError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(fields)
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(|e| match e {
                FirestoreError::DataNotFoundError(_) => {
                    StoreError::NotFound(format!("user {}", user.id))
                }
                e => query_err(e),
            })?;
        Ok(())
    }

    /// Run a `COUNT` aggregation over `interactions` for `user_id`,
    /// optionally bounded to `[start, end)`.
    async fn count_user_interactions(
        &self,
        user_id: &str,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<u32, StoreError> {
        let rows: Vec<CountResult> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::INTERACTIONS)
            .filter(|q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    window.and_then(|(start, _)| {
                        q.field("created_at")
                            .greater_than_or_equal(FirestoreTimestamp(start))
                    }),
                    window.and_then(|(_, end)| {
                        q.field("created_at").less_than(FirestoreTimestamp(end))
                    }),
                ])
            })
            .aggregate(|a| a.fields([a.field("count").count()]))
            .obj()
            .query()
            .await
            .map_err(query_err)?;
        Ok(rows.first().map_or(0, |r| r.count as u32))
    }

    async fn find_users_by_email(&self, email: &str) -> Result<Vec<User>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| q.for_all([q.field("email").eq(email)]))
            .obj()
            .query()
            .await
            .map_err(query_err)
    }
}

#[async_trait]
impl EntitlementStore for FirestoreDb {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(query_err)
    }

    async fn find_users_by_customer(&self, customer_id: &str) -> Result<Vec<User>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| q.for_all([q.field("stripe_customer_id").eq(customer_id)]))
            .obj()
            .query()
            .await
            .map_err(query_err)
    }

    async fn upsert_user_stub(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<bool, StoreError> {
        let stub = User::stub(user_id, email, Utc::now());

        // Insert fails with a conflict when the document exists, which is
        // exactly the create-if-absent semantics we want.
        let inserted: Result<User, FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::USERS)
            .document_id(user_id)
            .object(&stub)
            .execute()
            .await;

        match inserted {
            Ok(_) => {
                tracing::info!(user_id, "Created user stub");
                Ok(true)
            }
            Err(FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(query_err(e)),
        }
    }

    async fn link_customer_by_user_id(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<(), StoreError> {
        let Some(mut user) = self.get_user(user_id).await? else {
            tracing::error!(user_id, customer_id, "Cannot link customer: user not found");
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        };

        if let Some(previous) = user.stripe_customer_id.as_deref() {
            if previous != customer_id {
                tracing::warn!(
                    user_id,
                    previous_customer = previous,
                    customer_id,
                    "Replacing existing customer link"
                );
            }
        }

        user.stripe_customer_id = Some(customer_id.to_string());
        self.write_user_fields(&user, vec![path!(User::stripe_customer_id)])
            .await?;
        tracing::info!(user_id, customer_id, "Linked customer to user");
        Ok(())
    }

    async fn link_customer_by_email(
        &self,
        email: &str,
        customer_id: &str,
    ) -> Result<usize, StoreError> {
        let users = self.find_users_by_email(email).await?;
        for mut user in users.iter().cloned() {
            user.stripe_customer_id = Some(customer_id.to_string());
            self.write_user_fields(&user, vec![path!(User::stripe_customer_id)])
                .await?;
        }
        tracing::info!(customer_id, linked = users.len(), "Linked customer by email");
        Ok(users.len())
    }

    async fn update_subscription(
        &self,
        customer_id: &str,
        update: &SubscriptionUpdate,
    ) -> Result<Vec<String>, StoreError> {
        let users = self.find_users_by_customer(customer_id).await?;
        let mut updated = Vec::with_capacity(users.len());
        for mut user in users {
            user.apply(update);
            self.write_user_fields(&user, subscription_fields(update))
                .await?;
            updated.push(user.id);
        }
        Ok(updated)
    }

    async fn record_interaction(&self, interaction: &Interaction) -> Result<(), StoreError> {
        let _: Interaction = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::INTERACTIONS)
            .document_id(&interaction.id)
            .object(interaction)
            .execute()
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn count_interactions_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        self.count_user_interactions(user_id, Some((start, end)))
            .await
    }

    async fn count_interactions(&self, user_id: &str) -> Result<u32, StoreError> {
        self.count_user_interactions(user_id, None).await
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> Result<(), StoreError> {
        let _: Feedback = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::FEEDBACK)
            .document_id(&feedback.id)
            .object(feedback)
            .execute()
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn has_feedback(&self, user_id: &str) -> Result<bool, StoreError> {
        let rows: Vec<Feedback> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::FEEDBACK)
            .filter(|q| q.for_all([q.field("user_id").eq(user_id)]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(query_err)?;
        Ok(!rows.is_empty())
    }

    async fn record_event(&self, event: &AnalyticsEvent) -> Result<(), StoreError> {
        let _: AnalyticsEvent = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::ANALYTICS_EVENTS)
            .document_id(&event.id)
            .object(event)
            .execute()
            .await
            .map_err(query_err)?;
        Ok(())
    }
}
