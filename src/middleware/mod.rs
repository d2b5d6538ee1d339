// SPDX-License-Identifier: MIT

//! Request middleware: token validation, session gating and security
//! headers.

pub mod auth;
pub mod security;

pub use auth::{restrict_to, require_auth, validate_token, CurrentUser, TokenContext};
pub use security::add_security_headers;
