// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Best-effort operator alerts.
//!
//! `notify` never fails and never panics; delivery problems are logged and
//! reported as `false`. Callers on a request path use [`dispatch`] so the
//! alert runs detached from the response.

use super::telegram::{ChatId, MessagingBot, OutgoingMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// External service an operational error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Completion,
    SpeechSynthesis,
}

impl Service {
    pub fn label(&self) -> &'static str {
        match self {
            Service::Completion => "Completion",
            Service::SpeechSynthesis => "Speech synthesis",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignupMethod {
    #[default]
    Email,
    Google,
}

impl SignupMethod {
    fn label(&self) -> &'static str {
        match self {
            SignupMethod::Email => "Email/Password",
            SignupMethod::Google => "Google OAuth",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    ProviderError(Service),
    Signup(SignupMethod),
    PaymentFailed,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub details: Option<String>,
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn provider_error(
        service: Service,
        error: impl Into<String>,
        details: Option<String>,
        correlation_id: Option<&str>,
    ) -> Self {
        Self {
            kind: NotificationKind::ProviderError(service),
            message: error.into(),
            details,
            correlation_id: correlation_id.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    /// New identity signup. `message` is the email (or user id without one).
    pub fn signup(who: impl Into<String>, method: SignupMethod) -> Self {
        Self {
            kind: NotificationKind::Signup(method),
            message: who.into(),
            details: None,
            correlation_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn payment_failed(customer_id: impl Into<String>, user_ids: &[String]) -> Self {
        Self {
            kind: NotificationKind::PaymentFailed,
            message: customer_id.into(),
            details: (!user_ids.is_empty()).then(|| user_ids.join(", ")),
            correlation_id: None,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Attempt one delivery. Returns whether it succeeded.
    async fn notify(&self, notification: &Notification) -> bool;
}

/// Send `notification` on a detached task.
pub fn dispatch(
    notifier: &Arc<dyn Notifier>,
    notification: Notification,
) -> tokio::task::JoinHandle<bool> {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move { notifier.notify(&notification).await })
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a notification as Telegram HTML. All caller text is escaped.
pub fn format_message(notification: &Notification) -> String {
    let time = notification.timestamp.format("%Y-%m-%d %H:%M:%S");

    let mut message = match &notification.kind {
        NotificationKind::ProviderError(service) => format!(
            "<b>{} API Error</b>\n\n<b>Error:</b> {}\n\n<b>Request ID:</b> <code>{}</code>\n<b>Time:</b> {} UTC",
            service.label(),
            escape_html(&notification.message),
            escape_html(notification.correlation_id.as_deref().unwrap_or("unknown")),
            time,
        ),
        NotificationKind::Signup(method) => format!(
            "<b>New User Signup!</b>\n\n<b>Email:</b> {}\n<b>Method:</b> {}\n<b>Time:</b> {} UTC",
            escape_html(&notification.message),
            method.label(),
            time,
        ),
        NotificationKind::PaymentFailed => format!(
            "<b>Invoice Payment Failed</b>\n\n<b>Customer:</b> <code>{}</code>\n<b>Time:</b> {} UTC",
            escape_html(&notification.message),
            time,
        ),
    };

    if let Some(details) = &notification.details {
        message.push_str(&format!(
            "\n\n<b>Details:</b>\n<code>{}</code>",
            escape_html(details)
        ));
    }

    message
}

/// Notifier that messages a fixed operator chat through the bot.
pub struct TelegramNotifier {
    target: Option<(Arc<dyn MessagingBot>, ChatId)>,
}

impl TelegramNotifier {
    /// Disabled unless both a bot and an operator chat are configured.
    pub fn new(bot: Option<Arc<dyn MessagingBot>>, admin_chat: Option<&str>) -> Self {
        let target = match (bot, admin_chat) {
            (Some(bot), Some(chat)) => Some((bot, ChatId::from(chat))),
            _ => None,
        };
        Self { target }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, notification: &Notification) -> bool {
        let Some((bot, chat)) = &self.target else {
            tracing::debug!(kind = ?notification.kind, "Operator notifications disabled");
            return false;
        };

        let message = OutgoingMessage::html(chat.clone(), format_message(notification));
        match bot.send_message(&message).await {
            Ok(()) => {
                tracing::info!(kind = ?notification.kind, "Operator notification sent");
                true
            }
            Err(e) => {
                tracing::error!(kind = ?notification.kind, error = %e, "Operator notification failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::telegram::{BotInfo, ChatInfo, MessagingError, Update};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBot {
        sent: Mutex<Vec<OutgoingMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl MessagingBot for RecordingBot {
        async fn send_message(&self, message: &OutgoingMessage) -> Result<(), MessagingError> {
            if self.fail {
                return Err(MessagingError::Api("Forbidden".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn get_me(&self) -> Result<BotInfo, MessagingError> {
            Err(MessagingError::Api("unused".into()))
        }

        async fn get_chat(&self, _: &ChatId) -> Result<ChatInfo, MessagingError> {
            Err(MessagingError::Api("unused".into()))
        }

        async fn get_updates(
            &self,
            _: Option<i64>,
            _: Option<u32>,
        ) -> Result<Vec<Update>, MessagingError> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }

    #[test]
    fn test_format_provider_error_escapes_input() {
        let n = Notification::provider_error(
            Service::SpeechSynthesis,
            "HTTP 500",
            Some("<html>bad</html>".into()),
            Some("req-1"),
        );
        let msg = format_message(&n);
        assert!(msg.contains("<b>Speech synthesis API Error</b>"));
        assert!(msg.contains("<code>req-1</code>"));
        assert!(msg.contains("&lt;html&gt;bad&lt;/html&gt;"));
        assert!(!msg.contains("<html>"));
    }

    #[test]
    fn test_format_signup() {
        let msg = format_message(&Notification::signup("a@example.com", SignupMethod::Google));
        assert!(msg.contains("New User Signup!"));
        assert!(msg.contains("Google OAuth"));
    }

    #[tokio::test]
    async fn test_disabled_notifier_returns_false() {
        let notifier = TelegramNotifier::new(None, Some("1"));
        assert!(!notifier.is_enabled());
        assert!(!notifier.notify(&Notification::signup("a", SignupMethod::Email)).await);
    }

    #[tokio::test]
    async fn test_sends_html_to_operator_chat() {
        let bot = Arc::new(RecordingBot::default());
        let notifier = TelegramNotifier::new(Some(bot.clone()), Some("424242"));

        assert!(notifier.notify(&Notification::payment_failed("cus_1", &[])).await);

        let sent = bot.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, ChatId::Id(424242));
        assert!(sent[0].text.contains("cus_1"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let bot = Arc::new(RecordingBot {
            fail: true,
            ..Default::default()
        });
        let notifier: Arc<dyn Notifier> =
            Arc::new(TelegramNotifier::new(Some(bot), Some("424242")));

        let delivered = dispatch(&notifier, Notification::signup("a", SignupMethod::Email))
            .await
            .unwrap();
        assert!(!delivered);
    }
}
