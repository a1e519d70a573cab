// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! `POST /interact`: one spoken (or typed) turn in, synthesized speech out.

use crate::error::{AppError, Result};
use crate::middleware::CurrentUser;
use crate::models::HistoryMessage;
use crate::services::interaction::{InteractionInput, InteractionReply, InteractionRequest};
use crate::services::prompt::{RequestContext, Screenshot};
use crate::services::providers::AudioUpload;
use crate::AppState;
use axum::{
    body::Body,
    extract::{multipart::Field, Multipart, State},
    http::{header, HeaderMap},
    response::Response,
    routing::post,
    Extension, Router,
};
use chrono::Utc;
use std::sync::Arc;

const DEFAULT_AUDIO_NAME: &str = "input.webm";
const DEFAULT_AUDIO_TYPE: &str = "audio/webm";

/// Interaction route. Identity is optional; admission decides.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/interact", post(interact))
}

/// Parsed multipart form.
#[derive(Debug, Default)]
struct InteractForm {
    input: Option<InteractionInput>,
    history: Vec<HistoryMessage>,
    screenshot: Option<String>,
}

fn invalid_request<E: std::fmt::Display>(e: E) -> AppError {
    tracing::debug!(error = %e, "Rejected interaction form");
    AppError::BadRequest("Invalid request".into())
}

/// A file part, or any part with a non-text content type, is audio.
fn is_audio(field: &Field<'_>) -> bool {
    field.file_name().is_some()
        || field
            .content_type()
            .is_some_and(|ct| !ct.starts_with("text/"))
}

async fn read_form(mut multipart: Multipart) -> Result<InteractForm> {
    let mut form = InteractForm::default();

    while let Some(field) = multipart.next_field().await.map_err(invalid_request)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "input" if is_audio(&field) => {
                let file_name = field.file_name().unwrap_or(DEFAULT_AUDIO_NAME).to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_AUDIO_TYPE)
                    .to_string();
                let bytes = field.bytes().await.map_err(invalid_request)?;
                form.input = Some(InteractionInput::Audio(AudioUpload {
                    bytes,
                    file_name,
                    content_type,
                }));
            }
            "input" => {
                let text = field.text().await.map_err(invalid_request)?;
                form.input = Some(InteractionInput::Text(text));
            }
            "message" | "message[]" => {
                let raw = field.text().await.map_err(invalid_request)?;
                let message: HistoryMessage = serde_json::from_str(&raw).map_err(invalid_request)?;
                form.history.push(message);
            }
            "screenshot" => {
                let data_url = field.text().await.map_err(invalid_request)?;
                form.screenshot = Some(data_url).filter(|s| !s.is_empty());
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown form field");
            }
        }
    }

    Ok(form)
}

/// Correlation id from the edge proxy, or a fresh one.
fn request_id(headers: &HeaderMap) -> String {
    ["x-request-id", "x-vercel-id"]
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

async fn interact(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response> {
    let form = read_form(multipart).await?;
    let input = form.input.ok_or_else(|| AppError::BadRequest("Invalid request".into()))?;
    let screenshot = form
        .screenshot
        .as_deref()
        .map(Screenshot::parse)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let request = InteractionRequest {
        input,
        history: form.history,
        screenshot,
        context: RequestContext::from_headers(&headers, Utc::now()),
        request_id: request_id(&headers),
    };

    let reply = state.pipeline.run(user.as_ref(), request).await?;
    into_response(reply)
}

/// Audio body plus the URL-encoded text of both turns in headers.
fn into_response(reply: InteractionReply) -> Result<Response> {
    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, reply.audio.content_type.as_str())
        .header("X-Transcript", urlencoding::encode(&reply.transcript).into_owned())
        .header("X-Response", urlencoding::encode(&reply.response).into_owned());

    if let Some(limit) = reply.rate_limited {
        builder = builder
            .header("X-Rate-Limited", "true")
            .header("X-Usage-Count", limit.count.to_string())
            .header("X-Daily-Limit", limit.limit.to_string());
    }
    if let Some(id) = &reply.interaction_id {
        builder = builder.header("X-Interaction-Id", id.as_str());
    }

    builder
        .body(Body::from_stream(reply.audio.body))
        .map_err(|e| AppError::Internal(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_prefers_proxy_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-vercel-id", "sfo1::abc".parse().unwrap());
        assert_eq!(request_id(&headers), "sfo1::abc");

        headers.insert("x-request-id", "req-9".parse().unwrap());
        assert_eq!(request_id(&headers), "req-9");
    }

    #[test]
    fn test_request_id_generated_when_absent() {
        let id = request_id(&HeaderMap::new());
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }
}
