// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cartesia text-to-speech client.

use super::providers::{check_status, ProviderError, SpeechSynthesisProvider, SynthesizedSpeech};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use std::time::Duration;

const BASE_URL: &str = "https://api.cartesia.ai";
const API_VERSION: &str = "2024-06-30";
const MODEL_ID: &str = "sonic-english";
const SAMPLE_RATE: u32 = 24_000;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw 32-bit float PCM at 24 kHz, as the browser player expects.
pub const AUDIO_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Serialize)]
struct TtsRequest<'a> {
    model_id: &'a str,
    transcript: &'a str,
    voice: Voice<'a>,
    output_format: OutputFormat,
}

#[derive(Serialize)]
struct Voice<'a> {
    mode: &'a str,
    id: &'a str,
}

#[derive(Serialize)]
struct OutputFormat {
    container: &'static str,
    encoding: &'static str,
    sample_rate: u32,
}

/// Cartesia API client.
#[derive(Clone)]
pub struct CartesiaClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    voice_id: String,
}

impl CartesiaClient {
    pub fn new(api_key: impl Into<String>, voice_id: impl Into<String>) -> anyhow::Result<Self> {
        // No overall timeout: the body is streamed to the caller.
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
            api_key: api_key.into(),
            voice_id: voice_id.into(),
        })
    }
}

#[async_trait]
impl SpeechSynthesisProvider for CartesiaClient {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech, ProviderError> {
        let body = TtsRequest {
            model_id: MODEL_ID,
            transcript: text,
            voice: Voice {
                mode: "id",
                id: &self.voice_id,
            },
            output_format: OutputFormat {
                container: "raw",
                encoding: "pcm_f32le",
                sample_rate: SAMPLE_RATE,
            },
        };

        let response = self
            .http
            .post(format!("{}/tts/bytes", self.base_url))
            .header("Cartesia-Version", API_VERSION)
            .header("X-API-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let response = check_status(response).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));

        Ok(SynthesizedSpeech {
            content_type: AUDIO_CONTENT_TYPE.to_string(),
            body: Box::pin(stream),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let body = TtsRequest {
            model_id: MODEL_ID,
            transcript: "hello",
            voice: Voice {
                mode: "id",
                id: "voice-1",
            },
            output_format: OutputFormat {
                container: "raw",
                encoding: "pcm_f32le",
                sample_rate: SAMPLE_RATE,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["transcript"], "hello");
        assert_eq!(json["voice"]["id"], "voice-1");
        assert_eq!(json["output_format"]["sample_rate"], 24000);
    }
}
