// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Conversation assembly for the completion provider.

use crate::models::{ChatMessage, ContentPart, HistoryMessage, ImageUrl, MessageContent, Role};
use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};

const UNKNOWN: &str = "unknown";

/// Situational context derived from edge-proxy request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub location: String,
    pub local_time: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Self {
        Self {
            location: location(headers).unwrap_or_else(|| UNKNOWN.to_string()),
            local_time: local_time(headers, now).unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}

/// "City, Region, Country" when all three geo headers are present.
fn location(headers: &HeaderMap) -> Option<String> {
    let city = header_str(headers, "x-vercel-ip-city")?;
    let region = header_str(headers, "x-vercel-ip-country-region")?;
    let country = header_str(headers, "x-vercel-ip-country")?;
    // The proxy percent-encodes non-ASCII city names.
    let city = urlencoding::decode(city)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| city.to_string());
    Some(format!("{}, {}, {}", city, region, country))
}

/// Wall-clock time in the caller's IANA timezone.
fn local_time(headers: &HeaderMap, now: DateTime<Utc>) -> Option<String> {
    let tz: chrono_tz::Tz = header_str(headers, "x-vercel-ip-timezone")?.parse().ok()?;
    Some(
        now.with_timezone(&tz)
            .format("%-m/%-d/%Y, %-I:%M:%S %p")
            .to_string(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid screenshot")]
pub struct InvalidScreenshot;

/// A validated `data:image/<type>;base64,<payload>` screen capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub media_type: String,
    data_url: String,
}

impl Screenshot {
    pub fn parse(data_url: &str) -> Result<Self, InvalidScreenshot> {
        let rest = data_url.strip_prefix("data:image/").ok_or(InvalidScreenshot)?;
        let (subtype, payload) = rest.split_once(";base64,").ok_or(InvalidScreenshot)?;

        if subtype.is_empty() || !subtype.chars().all(|c| c.is_ascii_alphabetic() || c == '+') {
            return Err(InvalidScreenshot);
        }
        if payload.is_empty() || STANDARD.decode(payload).is_err() {
            return Err(InvalidScreenshot);
        }

        Ok(Self {
            media_type: format!("image/{}", subtype),
            data_url: data_url.to_string(),
        })
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }
}

/// The system instruction: persona, behavior rules and situational context.
pub fn system_prompt(context: &RequestContext, screen_visible: bool) -> String {
    let screen = if screen_visible {
        "- You are Swift, a friendly and helpful voice assistant. The user is sharing their screen with you and the current screenshot is attached to their message."
    } else {
        "- You are Swift, a friendly and helpful voice assistant. You cannot see the user's screen right now."
    };

    format!(
        "{screen}
- Respond briefly to the user's request, and do not provide unnecessary information.
- If you don't understand the user's request, ask for clarification.
- You do not have access to up-to-date information, so you should not provide real-time data.
- You are not capable of performing actions other than responding to the user.
- Do not use markdown, emojis, or other formatting in your responses. Respond in a way easily spoken by text-to-speech software.
- User location is {location}.
- The current time is {time}.",
        location = context.location,
        time = context.local_time,
    )
}

/// System turn, then prior history, then the new user turn (with the
/// screenshot attached when present).
pub fn build_conversation(
    context: &RequestContext,
    history: Vec<HistoryMessage>,
    transcript: &str,
    screenshot: Option<&Screenshot>,
) -> Vec<ChatMessage> {
    let mut conversation = Vec::with_capacity(history.len() + 2);
    conversation.push(ChatMessage::system(system_prompt(context, screenshot.is_some())));
    conversation.extend(history.into_iter().map(ChatMessage::from));

    let turn = match screenshot {
        Some(shot) => ChatMessage {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: transcript.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: shot.data_url().to_string(),
                    },
                },
            ]),
        },
        None => ChatMessage::user(transcript),
    };
    conversation.push(turn);

    conversation
}
