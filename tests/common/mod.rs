// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swift_voice::config::Config;
use swift_voice::db::{FirestoreDb, MemoryStore};
use swift_voice::middleware::auth::create_jwt;
use swift_voice::models::{ChatMessage, SubscriptionStatus, User};
use swift_voice::routes::create_router;
use swift_voice::services::billing::{
    BillingError, BillingProvider, CheckoutRequest, ProviderSubscription,
};
use swift_voice::services::cartesia::AUDIO_CONTENT_TYPE;
use swift_voice::services::providers::{
    AudioUpload, CompletionProvider, ProviderError, SpeechSynthesisProvider, SynthesizedSpeech,
    TranscriptionProvider,
};
use swift_voice::services::telegram::{
    BotInfo, ChatId, ChatInfo, MessagingBot, MessagingError, OutgoingMessage, Update,
};
use swift_voice::services::{Notifier, Providers, TelegramNotifier};
use swift_voice::{AppState, Dependencies};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

// ─── Fake providers ──────────────────────────────────────────

/// Calls made to the fake AI providers.
#[derive(Default)]
pub struct Calls {
    pub transcribe: AtomicUsize,
    pub complete: AtomicUsize,
    pub synthesize: AtomicUsize,
}

#[allow(dead_code)]
impl Calls {
    pub fn total(&self) -> usize {
        self.transcribe.load(Ordering::SeqCst)
            + self.complete.load(Ordering::SeqCst)
            + self.synthesize.load(Ordering::SeqCst)
    }
}

/// What the fake AI providers answer.
#[derive(Clone)]
pub struct Script {
    pub transcript: Result<String, ProviderError>,
    pub completion: Result<Option<String>, ProviderError>,
    pub speech: Result<Bytes, ProviderError>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            transcript: Ok("what is on my screen".to_string()),
            completion: Ok(Some("A code editor.".to_string())),
            speech: Ok(Bytes::from_static(b"\x00\x00\x80\x3f")),
        }
    }
}

pub struct FakeAi {
    pub calls: Arc<Calls>,
    script: Script,
    /// Conversations sent to completion
    pub conversations: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl TranscriptionProvider for FakeAi {
    async fn transcribe(&self, _audio: &AudioUpload) -> Result<String, ProviderError> {
        self.calls.transcribe.fetch_add(1, Ordering::SeqCst);
        self.script.transcript.clone()
    }
}

#[async_trait]
impl CompletionProvider for FakeAi {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>, ProviderError> {
        self.calls.complete.fetch_add(1, Ordering::SeqCst);
        self.conversations.lock().unwrap().push(messages.to_vec());
        self.script.completion.clone()
    }
}

#[async_trait]
impl SpeechSynthesisProvider for FakeAi {
    async fn synthesize(&self, _text: &str) -> Result<SynthesizedSpeech, ProviderError> {
        self.calls.synthesize.fetch_add(1, Ordering::SeqCst);
        self.script
            .speech
            .clone()
            .map(|bytes| SynthesizedSpeech::from_bytes(AUDIO_CONTENT_TYPE, bytes))
    }
}

/// Billing provider fake with a single customer and subscription.
#[derive(Default)]
pub struct FakeBilling {
    pub customer: Mutex<Option<String>>,
    pub subscription: Mutex<Option<ProviderSubscription>>,
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
    pub portals: Mutex<Vec<(String, String)>>,
}

#[allow(dead_code)]
impl FakeBilling {
    pub fn set_active(&self, customer_id: &str, subscription_id: &str, start: DateTime<Utc>) {
        *self.customer.lock().unwrap() = Some(customer_id.to_string());
        *self.subscription.lock().unwrap() = Some(ProviderSubscription {
            id: subscription_id.to_string(),
            customer_id: customer_id.to_string(),
            status: "active".to_string(),
            start_date: start,
        });
    }
}

#[async_trait]
impl BillingProvider for FakeBilling {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<String, BillingError> {
        self.checkouts.lock().unwrap().push(request.clone());
        Ok("https://checkout.example/session/cs_test".to_string())
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, BillingError> {
        self.portals
            .lock()
            .unwrap()
            .push((customer_id.to_string(), return_url.to_string()));
        Ok("https://billing.example/portal/bps_test".to_string())
    }

    async fn find_customer_by_email(&self, _email: &str) -> Result<Option<String>, BillingError> {
        Ok(self.customer.lock().unwrap().clone())
    }

    async fn find_active_subscription(
        &self,
        _customer_id: &str,
    ) -> Result<Option<ProviderSubscription>, BillingError> {
        Ok(self.subscription.lock().unwrap().clone())
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, BillingError> {
        self.subscription
            .lock()
            .unwrap()
            .clone()
            .filter(|s| s.id == subscription_id)
            .ok_or(BillingError::Api {
                status: 404,
                message: "No such subscription".to_string(),
            })
    }
}

/// Messaging bot fake that records what it was asked to send.
#[derive(Default)]
pub struct FakeBot {
    pub sent: Mutex<Vec<OutgoingMessage>>,
    pub fail: bool,
}

#[allow(dead_code)]
impl FakeBot {
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }
}

#[async_trait]
impl MessagingBot for FakeBot {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), MessagingError> {
        if self.fail {
            return Err(MessagingError::Api("Bad Request: chat not found".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn get_me(&self) -> Result<BotInfo, MessagingError> {
        if self.fail {
            return Err(MessagingError::Api("Unauthorized".to_string()));
        }
        Ok(BotInfo {
            id: 7,
            is_bot: true,
            first_name: "Swift Ops".to_string(),
            username: Some("swift_ops_bot".to_string()),
        })
    }

    async fn get_chat(&self, chat_id: &ChatId) -> Result<ChatInfo, MessagingError> {
        match chat_id {
            ChatId::Id(id) if !self.fail => Ok(ChatInfo {
                id: *id,
                chat_type: "private".to_string(),
                first_name: Some("Ada".to_string()),
                ..Default::default()
            }),
            _ => Err(MessagingError::Api("Bad Request: chat not found".to_string())),
        }
    }

    async fn get_updates(
        &self,
        _offset: Option<i64>,
        _limit: Option<u32>,
    ) -> Result<Vec<Update>, MessagingError> {
        if self.fail {
            return Err(MessagingError::Transport("timed out".to_string()));
        }
        Ok(vec![])
    }
}

// ─── Test app ────────────────────────────────────────────────

#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    pub ai: Arc<FakeAi>,
    pub billing: Arc<FakeBilling>,
    pub bot: Arc<FakeBot>,
}

#[allow(dead_code)]
impl TestApp {
    pub fn calls(&self) -> &Calls {
        &self.ai.calls
    }

    pub fn token(&self, user_id: &str, email: Option<&str>) -> String {
        create_jwt(user_id, email, &self.state.config.jwt_secret).unwrap()
    }

    /// Seed a user row with the given status.
    pub fn put_user(&self, user_id: &str, email: Option<&str>, status: SubscriptionStatus) {
        let mut user = User::stub(user_id, email, Utc::now());
        user.subscription_status = status;
        self.store.put_user(user);
    }
}

/// Create a test app with the default config and well-behaved fakes.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::default(), Script::default())
}

/// Create a test app over an in-memory store and fake providers.
#[allow(dead_code)]
pub fn create_test_app_with(config: Config, script: Script) -> TestApp {
    create_test_app_full(config, script, FakeBot::default(), None)
}

#[allow(dead_code)]
pub fn create_test_app_full(
    config: Config,
    script: Script,
    bot: FakeBot,
    limit_audio: Option<Bytes>,
) -> TestApp {
    let store = MemoryStore::new();
    let ai = Arc::new(FakeAi {
        calls: Arc::new(Calls::default()),
        script,
        conversations: Mutex::new(Vec::new()),
    });
    let billing = Arc::new(FakeBilling::default());
    let bot = Arc::new(bot);

    let bot_port: Arc<dyn MessagingBot> = bot.clone();
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(
        Some(bot_port.clone()),
        config.telegram_admin_user_id.as_deref(),
    ));

    let state = Arc::new(AppState::new(
        config,
        Dependencies {
            store: Arc::new(store.clone()),
            billing: billing.clone(),
            providers: Providers {
                transcription: ai.clone(),
                completion: ai.clone(),
                speech: ai.clone(),
            },
            notifier,
            bot: Some(bot_port),
            limit_audio,
        },
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        ai,
        billing,
        bot,
    }
}

// ─── Request helpers ─────────────────────────────────────────

const BOUNDARY: &str = "swift-test-boundary";

/// One multipart form part.
#[allow(dead_code)]
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

/// Build a `POST /interact` request.
#[allow(dead_code)]
pub fn interact_request(token: Option<&str>, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, file_name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri("/interact")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}

/// Audio input part.
#[allow(dead_code)]
pub fn audio(bytes: &[u8]) -> Part<'_> {
    Part::File {
        name: "input",
        file_name: "blob",
        content_type: "audio/webm",
        bytes,
    }
}

/// Authenticated request with an optional JSON body.
#[allow(dead_code)]
pub fn authed(method: &str, uri: &str, token: &str, json: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token));
    match json {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// `t=..,v1=..` header for `payload`, signed the way the billing provider
/// signs webhooks.
#[allow(dead_code)]
pub fn signature_header(secret: &str, timestamp: i64, payload: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// A billing webhook signed with `secret` at the current time.
#[allow(dead_code)]
pub fn signed_webhook(event: &serde_json::Value, secret: &str) -> Request<Body> {
    let payload = event.to_string();
    let header = signature_header(secret, Utc::now().timestamp(), &payload);
    webhook_request(payload, &header)
}

#[allow(dead_code)]
pub fn webhook_request(payload: String, signature_header: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/billing")
        .header("content-type", "application/json")
        .header("stripe-signature", signature_header)
        .body(Body::from(payload))
        .unwrap()
}

/// Billing event envelope.
#[allow(dead_code)]
pub fn event(event_type: &str, object: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "id": format!("evt_{}", uuid::Uuid::new_v4().simple()),
        "type": event_type,
        "data": { "object": object },
    })
}

#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[allow(dead_code)]
pub async fn body_bytes(response: axum::response::Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap()
}

/// Wait for detached work (notifications) to land.
#[allow(dead_code)]
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
