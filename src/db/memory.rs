// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process entitlement store for tests and local development.

use super::{EntitlementStore, StoreError};
use crate::models::{AnalyticsEvent, Feedback, Interaction, SubscriptionUpdate, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// `DashMap`-backed store with the same single-document write semantics as
/// Firestore. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<DashMap<String, User>>,
    interactions: Arc<Mutex<Vec<Interaction>>>,
    feedback: Arc<Mutex<Vec<Feedback>>>,
    events: Arc<Mutex<Vec<AnalyticsEvent>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StoreError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Insert or replace a user document.
    pub fn put_user(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    /// Snapshot of recorded analytics events.
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Snapshot of recorded interactions.
    pub fn interactions(&self) -> Vec<Interaction> {
        self.interactions
            .lock()
            .map(|i| i.clone())
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".into())
}

#[async_trait]
impl EntitlementStore for MemoryStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.check_online()?;
        Ok(self.users.get(user_id).map(|u| u.value().clone()))
    }

    async fn find_users_by_customer(&self, customer_id: &str) -> Result<Vec<User>, StoreError> {
        self.check_online()?;
        Ok(self
            .users
            .iter()
            .filter(|u| u.stripe_customer_id.as_deref() == Some(customer_id))
            .map(|u| u.value().clone())
            .collect())
    }

    async fn upsert_user_stub(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut created = false;
        self.users.entry(user_id.to_string()).or_insert_with(|| {
            created = true;
            User::stub(user_id, email, Utc::now())
        });
        Ok(created)
    }

    async fn link_customer_by_user_id(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<(), StoreError> {
        self.check_online()?;
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        user.stripe_customer_id = Some(customer_id.to_string());
        Ok(())
    }

    async fn link_customer_by_email(
        &self,
        email: &str,
        customer_id: &str,
    ) -> Result<usize, StoreError> {
        self.check_online()?;
        let mut linked = 0;
        for mut user in self.users.iter_mut() {
            if user.email.as_deref() == Some(email) {
                user.stripe_customer_id = Some(customer_id.to_string());
                linked += 1;
            }
        }
        Ok(linked)
    }

    async fn update_subscription(
        &self,
        customer_id: &str,
        update: &SubscriptionUpdate,
    ) -> Result<Vec<String>, StoreError> {
        self.check_online()?;
        let mut updated = Vec::new();
        for mut user in self.users.iter_mut() {
            if user.stripe_customer_id.as_deref() == Some(customer_id) {
                user.apply(update);
                updated.push(user.id.clone());
            }
        }
        Ok(updated)
    }

    async fn record_interaction(&self, interaction: &Interaction) -> Result<(), StoreError> {
        self.check_online()?;
        self.interactions
            .lock()
            .map_err(poisoned)?
            .push(interaction.clone());
        Ok(())
    }

    async fn count_interactions_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        self.check_online()?;
        let rows = self.interactions.lock().map_err(poisoned)?;
        Ok(rows
            .iter()
            .filter(|i| i.user_id == user_id && i.created_at >= start && i.created_at < end)
            .count() as u32)
    }

    async fn count_interactions(&self, user_id: &str) -> Result<u32, StoreError> {
        self.check_online()?;
        let rows = self.interactions.lock().map_err(poisoned)?;
        Ok(rows.iter().filter(|i| i.user_id == user_id).count() as u32)
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> Result<(), StoreError> {
        self.check_online()?;
        self.feedback
            .lock()
            .map_err(poisoned)?
            .push(feedback.clone());
        Ok(())
    }

    async fn has_feedback(&self, user_id: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        let rows = self.feedback.lock().map_err(poisoned)?;
        Ok(rows.iter().any(|f| f.user_id == user_id))
    }

    async fn record_event(&self, event: &AnalyticsEvent) -> Result<(), StoreError> {
        self.check_online()?;
        self.events.lock().map_err(poisoned)?.push(event.clone());
        Ok(())
    }
}
