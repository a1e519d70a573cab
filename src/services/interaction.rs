// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! The ask-the-assistant pipeline.
//!
//! Stages run strictly in order, each gated on the previous one:
//! admission, transcription, prompt assembly, completion, metering commit,
//! speech synthesis. Nothing is retried; the client resubmits.

use super::admission::{Admission, AdmissionGate};
use super::cartesia::AUDIO_CONTENT_TYPE;
use super::metering::UsageMeter;
use super::notifier::{dispatch, Notification, Notifier, Service};
use super::prompt::{build_conversation, RequestContext, Screenshot};
use super::providers::{
    AudioStream, AudioUpload, CompletionProvider, ProviderError, SpeechSynthesisProvider,
    SynthesizedSpeech, TranscriptionProvider,
};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::HistoryMessage;
use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::Arc;
use std::task::Poll;
use std::time::Instant;

/// What the user said or typed.
#[derive(Debug, Clone)]
pub enum InteractionInput {
    Text(String),
    Audio(AudioUpload),
}

#[derive(Debug, Clone)]
pub struct InteractionRequest {
    pub input: InteractionInput,
    pub history: Vec<HistoryMessage>,
    pub screenshot: Option<Screenshot>,
    pub context: RequestContext,
    /// Correlation id for logs and operator alerts
    pub request_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub count: u32,
    pub limit: u32,
}

#[derive(Debug)]
pub struct InteractionReply {
    pub transcript: String,
    pub response: String,
    pub audio: SynthesizedSpeech,
    pub rate_limited: Option<RateLimit>,
    pub interaction_id: Option<String>,
}

/// Spoken when the daily limit is reached.
pub fn limit_message(limit: u32) -> String {
    format!(
        "You've reached your daily limit of {} interactions. Your limit resets at midnight UTC, so come back tomorrow!",
        limit
    )
}

/// Provider ports the pipeline calls.
#[derive(Clone)]
pub struct Providers {
    pub transcription: Arc<dyn TranscriptionProvider>,
    pub completion: Arc<dyn CompletionProvider>,
    pub speech: Arc<dyn SpeechSynthesisProvider>,
}

#[derive(Clone)]
pub struct InteractionPipeline {
    gate: AdmissionGate,
    meter: UsageMeter,
    providers: Providers,
    notifier: Arc<dyn Notifier>,
    /// Pre-rendered limit message, same format as live synthesis
    limit_audio: Option<Bytes>,
}

impl InteractionPipeline {
    pub fn new(
        gate: AdmissionGate,
        meter: UsageMeter,
        providers: Providers,
        notifier: Arc<dyn Notifier>,
        limit_audio: Option<Bytes>,
    ) -> Self {
        Self {
            gate,
            meter,
            providers,
            notifier,
            limit_audio,
        }
    }

    pub async fn run(
        &self,
        user: Option<&AuthUser>,
        request: InteractionRequest,
    ) -> Result<InteractionReply, AppError> {
        let request_id = request.request_id.as_str();

        let admission = self.gate.admit(user).await?;
        if let Admission::RateLimited { count, limit } = admission {
            return self.limit_reply(&request, count, limit).await;
        }

        let started = Instant::now();
        let transcript = self.transcribe(&request.input, request_id).await?;
        tracing::info!(request_id, stage = "transcribe", elapsed_ms = started.elapsed().as_millis() as u64, "Stage complete");

        let conversation = build_conversation(
            &request.context,
            request.history,
            &transcript,
            request.screenshot.as_ref(),
        );

        let started = Instant::now();
        let response = match self.providers.completion.complete(&conversation).await {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => {
                self.alert(Service::Completion, "Completion returned no content", None, request_id);
                return Err(AppError::EmptyResult("Completion"));
            }
            Err(e) => {
                self.alert_provider(Service::Completion, &e, request_id);
                return Err(AppError::downstream("Completion", e.to_string()));
            }
        };
        tracing::info!(request_id, stage = "completion", elapsed_ms = started.elapsed().as_millis() as u64, "Stage complete");

        // Metered on the success path, before synthesis.
        let interaction_id = match (user, &admission) {
            (Some(user), Admission::Metered { .. } | Admission::Unlimited) => {
                self.meter
                    .record_interaction(&user.user_id, user.email.as_deref())
                    .await
            }
            _ => None,
        };

        let started = Instant::now();
        let audio = self.synthesize(&response, request_id).await?;
        tracing::info!(request_id, stage = "synthesis", elapsed_ms = started.elapsed().as_millis() as u64, "Stage complete");

        Ok(InteractionReply {
            transcript,
            response,
            audio: time_stream(audio, request_id.to_string()),
            rate_limited: None,
            interaction_id,
        })
    }

    async fn transcribe(&self, input: &InteractionInput, request_id: &str) -> Result<String, AppError> {
        let audio = match input {
            InteractionInput::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(AppError::BadRequest("Invalid request".into()));
                }
                return Ok(text.to_string());
            }
            InteractionInput::Audio(audio) => audio,
        };

        if audio.bytes.is_empty() {
            return Err(AppError::BadRequest("Invalid audio".into()));
        }

        match self.providers.transcription.transcribe(audio).await {
            Ok(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            Ok(_) => Err(AppError::BadRequest("Invalid audio".into())),
            Err(e) => {
                tracing::warn!(request_id, error = %e, "Transcription failed");
                Err(AppError::BadRequest("Invalid audio".into()))
            }
        }
    }

    async fn synthesize(&self, text: &str, request_id: &str) -> Result<SynthesizedSpeech, AppError> {
        self.providers.speech.synthesize(text).await.map_err(|e| {
            self.alert_provider(Service::SpeechSynthesis, &e, request_id);
            AppError::downstream("Speech synthesis", e.to_string())
        })
    }

    async fn limit_reply(
        &self,
        request: &InteractionRequest,
        count: u32,
        limit: u32,
    ) -> Result<InteractionReply, AppError> {
        let message = limit_message(limit);
        let audio = match &self.limit_audio {
            Some(bytes) => SynthesizedSpeech::from_bytes(AUDIO_CONTENT_TYPE, bytes.clone()),
            None => self.synthesize(&message, &request.request_id).await?,
        };
        let transcript = match &request.input {
            InteractionInput::Text(text) => text.trim().to_string(),
            InteractionInput::Audio(_) => String::new(),
        };

        Ok(InteractionReply {
            transcript,
            response: message,
            audio,
            rate_limited: Some(RateLimit { count, limit }),
            interaction_id: None,
        })
    }

    fn alert_provider(&self, service: Service, error: &ProviderError, request_id: &str) {
        self.alert(
            service,
            &error.to_string(),
            error.body().map(str::to_string),
            request_id,
        );
    }

    fn alert(&self, service: Service, message: &str, details: Option<String>, request_id: &str) {
        dispatch(
            &self.notifier,
            Notification::provider_error(service, message, details, Some(request_id)),
        );
    }
}

/// Log how long the body takes to stream, from a detached task that waits
/// for the end of the stream. Dropping the body early logs a disconnect.
pub fn time_stream(speech: SynthesizedSpeech, request_id: String) -> SynthesizedSpeech {
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let started = Instant::now();

    tokio::spawn(async move {
        match done_rx.await {
            Ok(()) => tracing::info!(
                request_id = %request_id,
                stage = "stream",
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Stage complete"
            ),
            Err(_) => tracing::debug!(request_id = %request_id, "Client went away before stream finished"),
        }
    });

    let mut done_tx = Some(done_tx);
    let trailer = futures_util::stream::poll_fn(move |_| {
        if let Some(tx) = done_tx.take() {
            let _ = tx.send(());
        }
        Poll::Ready(None)
    });

    let body: AudioStream = Box::pin(speech.body.chain(trailer));
    SynthesizedSpeech {
        content_type: speech.content_type,
        body,
    }
}
