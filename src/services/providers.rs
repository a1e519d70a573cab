// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ports for the AI providers the interaction pipeline calls.
//!
//! Each external capability sits behind one narrow trait so the pipeline can
//! be driven with fakes in tests.

use crate::models::ChatMessage;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

/// Provider failure. Every variant is terminal for the current request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Raw provider error body, if the provider sent one.
    pub fn body(&self) -> Option<&str> {
        match self {
            ProviderError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Recorded audio uploaded by the client.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Bytes,
    pub file_name: String,
    pub content_type: String,
}

/// Audio body streamed back to the caller.
pub type AudioStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Synthesized speech ready to stream.
pub struct SynthesizedSpeech {
    pub content_type: String,
    pub body: AudioStream,
}

impl SynthesizedSpeech {
    /// Speech from a buffer already in memory (e.g. a pre-rendered asset).
    pub fn from_bytes(content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            content_type: content_type.into(),
            body: Box::pin(futures_util::stream::once(async move { Ok(bytes) })),
        }
    }
}

impl std::fmt::Debug for SynthesizedSpeech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesizedSpeech")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribe recorded audio to text. The raw provider text is returned
    /// untrimmed; callers decide what counts as empty.
    async fn transcribe(&self, audio: &AudioUpload) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete a conversation. `Ok(None)` means the provider answered but
    /// produced no content.
    async fn complete(&self, conversation: &[ChatMessage]) -> Result<Option<String>, ProviderError>;
}

#[async_trait]
pub trait SpeechSynthesisProvider: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech, ProviderError>;
}

/// Turn a non-success response into `ProviderError::Status` with its body.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status { status, body })
}
