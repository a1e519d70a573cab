// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod admission;
pub mod billing;
pub mod cartesia;
pub mod groq;
pub mod interaction;
pub mod metering;
pub mod notifier;
pub mod prompt;
pub mod providers;
pub mod stripe;
pub mod subscription;
pub mod telegram;
pub mod webhook;

pub use admission::{Admission, AdmissionGate};
pub use billing::BillingProvider;
pub use cartesia::CartesiaClient;
pub use groq::GroqClient;
pub use interaction::{InteractionPipeline, Providers};
pub use metering::UsageMeter;
pub use notifier::{Notifier, TelegramNotifier};
pub use stripe::StripeClient;
pub use subscription::SubscriptionManager;
pub use telegram::{MessagingBot, TelegramClient};
