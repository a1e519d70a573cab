// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication middleware.
//!
//! Tokens are issued by the external identity provider and signed HS256 with
//! a shared secret. `sub` is the user id.

use crate::config::Config;
use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session cookie set by the frontend.
pub const SESSION_COOKIE: &str = "swift_token";

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: usize,
}

/// Authenticated user extracted from JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
}

/// Request extension set by [`optional_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<AuthUser>);

fn bearer_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    // Cookie first, then header
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Validate a token and return the user it names.
pub fn decode_user(token: &str, config: &Config) -> Result<AuthUser, AppError> {
    let key = DecodingKey::from_secret(&config.jwt_secret);
    let mut validation = Validation::new(Algorithm::HS256);
    match &config.jwt_audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| {
        tracing::debug!(error = %e, "Rejected JWT");
        AppError::InvalidToken
    })?;

    if token_data.claims.sub.is_empty() {
        return Err(AppError::InvalidToken);
    }

    Ok(AuthUser {
        user_id: token_data.claims.sub,
        email: token_data.claims.email.filter(|e| !e.is_empty()),
    })
}

/// Middleware that requires valid JWT authentication.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&jar, request.headers()).ok_or(AppError::Unauthorized)?;
    let auth_user = decode_user(&token, &state.config)?;
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Middleware that resolves the user if a token is present.
///
/// A missing token yields `CurrentUser(None)`; a present but invalid token
/// is still rejected.
pub async fn optional_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = match bearer_token(&jar, request.headers()) {
        Some(token) => Some(decode_user(&token, &state.config)?),
        None => None,
    };
    request.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(request).await)
}

/// Create a JWT the way the identity provider does. Used by tests and local
/// tooling.
pub fn create_jwt(
    user_id: &str,
    email: Option<&str>,
    signing_key: &[u8],
) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.map(str::to_string),
        iat: now,
        exp: now + 60 * 60, // 1 hour
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_claims() {
        let config = Config::default();
        let token = create_jwt("user-1", Some("a@example.com"), &config.jwt_secret).unwrap();
        let user = decode_user(&token, &config).unwrap();
        assert_eq!(user.user_id, "user-1");
        assert_eq!(user.email.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let config = Config::default();
        let token = create_jwt("user-1", None, b"some_other_key_that_is_long_enough").unwrap();
        assert!(matches!(
            decode_user(&token, &config),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_audience_enforced_when_configured() {
        let config = Config {
            jwt_audience: Some("authenticated".into()),
            ..Config::default()
        };
        // Token carries no aud claim.
        let token = create_jwt("user-1", None, &config.jwt_secret).unwrap();
        assert!(decode_user(&token, &config).is_err());
    }

    #[test]
    fn test_bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(
            bearer_token(&CookieJar::new(), &headers).as_deref(),
            Some("abc")
        );

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&CookieJar::new(), &headers), None);
    }
}
