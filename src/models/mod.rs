// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod analytics;
pub mod conversation;
pub mod feedback;
pub mod interaction;
pub mod user;

pub use analytics::{AnalyticsEvent, AnalyticsEventType};
pub use conversation::{ChatMessage, ContentPart, HistoryMessage, ImageUrl, MessageContent, Role};
pub use feedback::Feedback;
pub use interaction::Interaction;
pub use user::{Entitlement, SubscriptionStatus, SubscriptionUpdate, User};
