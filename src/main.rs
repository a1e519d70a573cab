// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Swift API Server
//!
//! Voice assistant backend: speech in, speech out, behind a metered
//! subscription paywall.

use bytes::Bytes;
use std::sync::Arc;
use swift_voice::{
    config::{Config, StoreBackend},
    db::{EntitlementStore, FirestoreDb, MemoryStore},
    services::{
        BillingProvider, CartesiaClient, GroqClient, MessagingBot, Notifier, Providers,
        StripeClient, TelegramClient, TelegramNotifier,
    },
    AppState, Dependencies,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Swift API");

    let store: Arc<dyn EntitlementStore> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let groq = Arc::new(GroqClient::new(
        &config.groq_base_url,
        &config.groq_api_key,
        &config.transcription_model,
        &config.completion_model,
    )?);
    let providers = Providers {
        transcription: groq.clone(),
        completion: groq,
        speech: Arc::new(CartesiaClient::new(
            config.cartesia_api_key.clone(),
            config.cartesia_voice_id.clone(),
        )?),
    };

    let billing: Arc<dyn BillingProvider> =
        Arc::new(StripeClient::new(config.stripe_secret_key.clone())?);

    let bot: Option<Arc<dyn MessagingBot>> = match config.telegram_bot_token.as_deref() {
        Some(token) => Some(Arc::new(TelegramClient::new(token)?)),
        None => None,
    };
    let notifier = TelegramNotifier::new(bot.clone(), config.telegram_admin_user_id.as_deref());
    if !notifier.is_enabled() {
        tracing::warn!("Operator notifications disabled");
    }
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);

    let limit_audio = load_limit_audio(&config).await;

    // Build shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        Dependencies {
            store,
            billing,
            providers,
            notifier,
            bot,
            limit_audio,
        },
    ));

    // Build router
    let app = swift_voice::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Pre-rendered "limit reached" speech. Without it the message is
/// synthesized on demand.
async fn load_limit_audio(config: &Config) -> Option<Bytes> {
    let path = config.limit_audio_path.as_ref()?;
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            tracing::info!(path = %path.display(), size = bytes.len(), "Loaded limit audio");
            Some(Bytes::from(bytes))
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to load limit audio");
            None
        }
    }
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("swift_voice=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
