//! Trustline authentication
//!
//! The identity provider is external: it issues HS256 bearer tokens whose
//! `sub` claim is the opaque user id. This crate only validates those tokens
//! and exposes the axum middleware that resolves them on protected routes.

pub mod jwt;
pub mod middleware;

pub use jwt::{issue_token, Claims};
pub use middleware::auth_middleware;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,
}

/// Token validation service shared across handlers.
pub struct AuthService {
    verifier: jwt::TokenVerifier,
}

impl AuthService {
    pub fn new(secret: &str) -> Self {
        Self {
            verifier: jwt::TokenVerifier::new(secret),
        }
    }

    /// Validate a bearer token and return its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.verifier.validate(token)
    }
}
