//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and kept in memory. Cloud Run injects
//! them as environment variables through secret bindings.

use std::env;
use std::path::PathBuf;

const DEFAULT_DAILY_LIMIT: u32 = 10;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Which entitlement store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for CORS and billing return URLs
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Store backend
    pub store_backend: StoreBackend,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Expected `aud` claim of identity tokens, if any
    pub jwt_audience: Option<String>,
    /// OpenAI-compatible base URL for transcription and completion
    pub groq_base_url: String,
    pub transcription_model: String,
    pub completion_model: String,
    pub cartesia_voice_id: String,
    /// Billing plan identifier
    pub stripe_price_id: String,
    /// Amount recorded with `subscription_created` events
    pub subscription_price_cents: i64,
    /// Operator destination for notifications
    pub telegram_admin_user_id: Option<String>,
    /// Interactions allowed per UTC day
    pub daily_interaction_limit: u32,
    /// Hard paywall on `/interact`
    pub require_subscription: bool,
    /// Admit unauthenticated interactions (unmetered)
    pub allow_anonymous: bool,
    /// Pre-rendered "limit reached" audio
    pub limit_audio_path: Option<PathBuf>,
    /// Multipart upload limit
    pub max_upload_bytes: usize,

    // --- Secrets ---
    /// HS256 secret of the identity provider (raw bytes)
    pub jwt_secret: Vec<u8>,
    pub groq_api_key: String,
    pub cartesia_api_key: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub telegram_bot_token: Option<String>,
    /// Bearer token for `/admin/*`
    pub admin_api_token: Option<String>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            jwt_audience: None,
            groq_base_url: "https://api.groq.com/openai/v1".to_string(),
            transcription_model: "whisper-large-v3".to_string(),
            completion_model: "meta-llama/llama-4-scout-17b-16e-instruct".to_string(),
            cartesia_voice_id: "79a125e8-cd45-4c13-8a67-188112f4dd22".to_string(),
            stripe_price_id: "price_test".to_string(),
            subscription_price_cents: 900,
            telegram_admin_user_id: Some("424242".to_string()),
            daily_interaction_limit: DEFAULT_DAILY_LIMIT,
            require_subscription: true,
            allow_anonymous: false,
            limit_audio_path: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            jwt_secret: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            groq_api_key: "test_groq_key".to_string(),
            cartesia_api_key: "test_cartesia_key".to_string(),
            stripe_secret_key: "sk_test".to_string(),
            stripe_webhook_secret: "whsec_test".to_string(),
            telegram_bot_token: Some("test_bot_token".to_string()),
            admin_api_token: Some("test_admin_token".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("firestore") | Err(_) => StoreBackend::Firestore,
            Ok(_) => return Err(ConfigError::Invalid("STORE_BACKEND")),
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            store_backend,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            jwt_audience: optional("JWT_AUDIENCE"),
            groq_base_url: env::var("GROQ_BASE_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
            transcription_model: env::var("TRANSCRIPTION_MODEL")
                .unwrap_or_else(|_| "whisper-large-v3".to_string()),
            completion_model: env::var("COMPLETION_MODEL")
                .unwrap_or_else(|_| "meta-llama/llama-4-scout-17b-16e-instruct".to_string()),
            cartesia_voice_id: env::var("CARTESIA_VOICE_ID")
                .unwrap_or_else(|_| "79a125e8-cd45-4c13-8a67-188112f4dd22".to_string()),
            stripe_price_id: required("STRIPE_PRICE_ID")?,
            subscription_price_cents: parse_or("SUBSCRIPTION_PRICE_CENTS", 900)?,
            telegram_admin_user_id: optional("TELEGRAM_ADMIN_USER_ID"),
            daily_interaction_limit: parse_or("DAILY_INTERACTION_LIMIT", DEFAULT_DAILY_LIMIT)?,
            require_subscription: parse_or("REQUIRE_SUBSCRIPTION", true)?,
            allow_anonymous: parse_or("ALLOW_ANONYMOUS", false)?,
            limit_audio_path: optional("LIMIT_AUDIO_PATH").map(PathBuf::from),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,

            jwt_secret: required("JWT_SECRET")?.into_bytes(),
            groq_api_key: required("GROQ_API_KEY")?,
            cartesia_api_key: required("CARTESIA_API_KEY")?,
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            telegram_bot_token: optional("TELEGRAM_ADMIN_BOT_TOKEN"),
            admin_api_token: optional("ADMIN_API_TOKEN"),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
