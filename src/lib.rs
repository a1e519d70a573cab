// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Swift: a voice assistant backend.
//!
//! This crate provides the HTTP API behind the Swift voice assistant: a
//! metered, subscription-gated speech pipeline plus the billing, account
//! and operator endpoints around it.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use bytes::Bytes;
use config::Config;
use db::EntitlementStore;
use services::{
    AdmissionGate, BillingProvider, InteractionPipeline, MessagingBot, Notifier, Providers,
    SubscriptionManager, UsageMeter,
};
use std::sync::Arc;

/// External collaborators, built in `main` or faked in tests.
pub struct Dependencies {
    pub store: Arc<dyn EntitlementStore>,
    pub billing: Arc<dyn BillingProvider>,
    pub providers: Providers,
    pub notifier: Arc<dyn Notifier>,
    /// Bot behind the admin messaging routes, if configured
    pub bot: Option<Arc<dyn MessagingBot>>,
    pub limit_audio: Option<Bytes>,
}

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn EntitlementStore>,
    pub gate: AdmissionGate,
    pub meter: UsageMeter,
    pub subscriptions: SubscriptionManager,
    pub pipeline: InteractionPipeline,
    pub billing: Arc<dyn BillingProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub bot: Option<Arc<dyn MessagingBot>>,
}

impl AppState {
    pub fn new(config: Config, deps: Dependencies) -> Self {
        let meter = UsageMeter::new(deps.store.clone());
        let gate = AdmissionGate::new(
            deps.store.clone(),
            meter.clone(),
            config.daily_interaction_limit,
            config.require_subscription,
            config.allow_anonymous,
        );
        let subscriptions = SubscriptionManager::new(
            deps.store.clone(),
            deps.billing.clone(),
            deps.notifier.clone(),
            config.subscription_price_cents,
        );
        let pipeline = InteractionPipeline::new(
            gate.clone(),
            meter.clone(),
            deps.providers,
            deps.notifier.clone(),
            deps.limit_audio,
        );

        Self {
            config,
            store: deps.store,
            gate,
            meter,
            subscriptions,
            pipeline,
            billing: deps.billing,
            notifier: deps.notifier,
            bot: deps.bot,
        }
    }
}
