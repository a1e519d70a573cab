// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Operator pass-through to the messaging bot.

use crate::error::{AppError, Result};
use crate::services::telegram::{ChatId, ChatInfo, MessagingBot, OutgoingMessage, ParseMode, Update};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

const DEFAULT_UPDATES_LIMIT: u32 = 10;

/// Admin routes (require `ADMIN_API_TOKEN`).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/telegram/send", post(send_message))
        .route("/admin/telegram/bot", get(bot_info))
        .route("/admin/telegram/chat", post(chat_info))
        .route("/admin/telegram/updates", get(recent_updates))
}

fn bot(state: &AppState) -> Result<&Arc<dyn MessagingBot>> {
    state
        .bot
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("Messaging bot is not configured".into()))
}

fn invalid(e: validator::ValidationErrors) -> AppError {
    AppError::BadRequest(format!("Invalid request data: {}", e))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: ChatId,
    #[validate(length(min = 1, message = "Message cannot be empty"))]
    pub message: String,
    pub parse_mode: Option<ParseMode>,
    pub disable_web_page_preview: Option<bool>,
    pub disable_notification: Option<bool>,
    pub reply_to_message_id: Option<i64>,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message: String,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>> {
    body.validate().map_err(invalid)?;

    let message = OutgoingMessage {
        chat_id: body.chat_id,
        text: body.message,
        parse_mode: body.parse_mode,
        disable_web_page_preview: body.disable_web_page_preview,
        disable_notification: body.disable_notification,
        reply_to_message_id: body.reply_to_message_id,
    };

    bot(&state)?.send_message(&message).await.map_err(|e| {
        tracing::warn!(error = %e, "Admin send failed");
        AppError::BadRequest("Failed to send message".into())
    })?;

    Ok(Json(SendMessageResponse {
        success: true,
        message: "Message sent successfully".to_string(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSummary {
    pub id: i64,
    pub name: String,
    pub username: Option<String>,
    pub is_bot: bool,
}

#[derive(Serialize)]
pub struct BotInfoResponse {
    pub success: bool,
    pub bot: BotSummary,
}

/// Connectivity check for the configured bot token.
async fn bot_info(State(state): State<Arc<AppState>>) -> Result<Json<BotInfoResponse>> {
    let me = bot(&state)?.get_me().await.map_err(|e| {
        tracing::warn!(error = %e, "getMe failed");
        AppError::BadRequest("Failed to connect to Telegram bot".into())
    })?;

    Ok(Json(BotInfoResponse {
        success: true,
        bot: BotSummary {
            id: me.id,
            name: me.first_name,
            username: me.username,
            is_bot: me.is_bot,
        },
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub chat_id: ChatId,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub chat: ChatInfo,
}

async fn chat_info(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let chat = bot(&state)?.get_chat(&body.chat_id).await.map_err(|e| {
        tracing::info!(error = %e, "getChat failed");
        AppError::NotFound("Chat not found or bot has no access".into())
    })?;

    Ok(Json(ChatResponse {
        success: true,
        chat,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdatesQuery {
    pub offset: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct UpdatesResponse {
    pub success: bool,
    pub updates: Vec<Update>,
}

/// Recent updates, for checking which chats have talked to the bot.
/// A failed poll reads as no updates.
async fn recent_updates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UpdatesQuery>,
) -> Result<Json<UpdatesResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_UPDATES_LIMIT);
    let updates = match bot(&state)?.get_updates(query.offset, Some(limit)).await {
        Ok(updates) => updates,
        Err(e) => {
            tracing::warn!(error = %e, "getUpdates failed");
            Vec::new()
        }
    };

    Ok(Json(UpdatesResponse {
        success: true,
        updates,
    }))
}
