// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Telegram Bot API client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, thiserror::Error)]
pub enum MessagingError {
    #[error("bot request failed: {0}")]
    Transport(String),

    #[error("bot API error: {0}")]
    Api(String),
}

/// Chat identifier: numeric id or `@channel` username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Username(String),
}

impl From<&str> for ChatId {
    fn from(value: &str) -> Self {
        value
            .parse()
            .map(ChatId::Id)
            .unwrap_or_else(|_| ChatId::Username(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    #[serde(rename = "HTML")]
    Html,
    Markdown,
    MarkdownV2,
}

/// `sendMessage` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub chat_id: ChatId,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_web_page_preview: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_notification: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
}

impl OutgoingMessage {
    pub fn html(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            parse_mode: Some(ParseMode::Html),
            disable_web_page_preview: None,
            disable_notification: None,
            reply_to_message_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotInfo {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<UpdateMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub message_id: i64,
    pub from: Option<Sender>,
    pub chat: UpdateChat,
    pub date: i64,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: i64,
    pub first_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

/// The bot operations the notifier and admin routes use.
#[async_trait]
pub trait MessagingBot: Send + Sync {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), MessagingError>;

    async fn get_me(&self) -> Result<BotInfo, MessagingError>;

    async fn get_chat(&self, chat_id: &ChatId) -> Result<ChatInfo, MessagingError>;

    async fn get_updates(
        &self,
        offset: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Update>, MessagingError>;
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: format!("https://api.telegram.org/bot{}", bot_token),
        })
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, MessagingError> {
        let response = request
            .send()
            .await
            .map_err(|e| MessagingError::Transport(e.to_string()))?;

        // The Bot API reports failures in the envelope, with a non-2xx status.
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| MessagingError::Transport(e.to_string()))?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(MessagingError::Api(
                description.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

#[async_trait]
impl MessagingBot for TelegramClient {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), MessagingError> {
        let _: serde_json::Value = self
            .call(
                self.http
                    .post(format!("{}/sendMessage", self.base_url))
                    .json(message),
            )
            .await?;
        Ok(())
    }

    async fn get_me(&self) -> Result<BotInfo, MessagingError> {
        self.call(self.http.get(format!("{}/getMe", self.base_url)))
            .await
    }

    async fn get_chat(&self, chat_id: &ChatId) -> Result<ChatInfo, MessagingError> {
        self.call(
            self.http
                .post(format!("{}/getChat", self.base_url))
                .json(&serde_json::json!({ "chat_id": chat_id })),
        )
        .await
    }

    async fn get_updates(
        &self,
        offset: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Update>, MessagingError> {
        let mut query = Vec::new();
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        self.call(
            self.http
                .get(format!("{}/getUpdates", self.base_url))
                .query(&query),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_id_from_str() {
        assert_eq!(ChatId::from("424242"), ChatId::Id(424242));
        assert_eq!(ChatId::from("-100123"), ChatId::Id(-100123));
        assert_eq!(
            ChatId::from("@channel"),
            ChatId::Username("@channel".into())
        );
    }

    #[test]
    fn test_outgoing_message_omits_unset_options() {
        let msg = OutgoingMessage::html(ChatId::Id(1), "<b>hi</b>");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["chat_id"], 1);
        assert_eq!(json["parse_mode"], "HTML");
        assert!(json.get("disable_notification").is_none());
    }

    #[test]
    fn test_error_envelope() {
        let env: ApiResponse<BotInfo> =
            serde_json::from_str(r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#)
                .unwrap();
        assert!(!env.ok);
        assert_eq!(env.description.as_deref(), Some("Unauthorized"));
    }
}
