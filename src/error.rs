// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::db::StoreError;
use crate::services::billing::BillingError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Detail shown to users when a downstream provider fails.
const TRY_AGAIN: &str = "Something went wrong. Please try again.";

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Forbidden")]
    Forbidden,

    #[error("Subscription required")]
    SubscriptionRequired,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid webhook signature: {0}")]
    SignatureInvalid(String),

    /// A third-party provider failed in transport or answered non-2xx.
    #[error("{service} unavailable: {message}")]
    Downstream {
        service: &'static str,
        message: String,
    },

    /// A provider answered successfully but with nothing usable.
    #[error("{0} returned an empty result")]
    EmptyResult(&'static str),

    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn downstream(service: &'static str, message: impl Into<String>) -> Self {
        AppError::Downstream {
            service,
            message: message.into(),
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::SubscriptionRequired => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::SignatureInvalid(_) => StatusCode::BAD_REQUEST,
            AppError::Downstream { .. }
            | AppError::EmptyResult(_)
            | AppError::Store(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BillingError> for AppError {
    fn from(e: BillingError) -> Self {
        AppError::downstream("Stripe", e.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, details) = match &self {
            AppError::Unauthorized => ("unauthorized", None),
            AppError::InvalidToken => ("invalid_token", None),
            AppError::Forbidden => ("forbidden", None),
            AppError::SubscriptionRequired => ("subscription_required", None),
            AppError::NotFound(msg) => ("not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => ("bad_request", Some(msg.clone())),
            AppError::SignatureInvalid(msg) => {
                tracing::warn!(reason = %msg, "Rejected webhook with invalid signature");
                ("invalid_signature", None)
            }
            AppError::Downstream { service, message } => {
                tracing::error!(service = %service, error = %message, "Downstream provider error");
                ("downstream_unavailable", Some(TRY_AGAIN.to_string()))
            }
            AppError::EmptyResult(service) => {
                tracing::error!(service = %service, "Provider returned an empty result");
                ("empty_result", Some(TRY_AGAIN.to_string()))
            }
            AppError::Store(err) => {
                tracing::error!(error = %err, "Database error");
                ("database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                ("internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
