// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, admin guard, security headers).

pub mod admin;
pub mod auth;
pub mod security;

pub use admin::require_admin_token;
pub use auth::{optional_auth, require_auth, AuthUser, CurrentUser};
