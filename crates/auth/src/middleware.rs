//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::AuthService;

/// Extract Bearer token from Authorization header
fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": message,
            "code": "AuthError",
            "timestamp": Utc::now().to_rfc3339(),
            "request_id": Uuid::new_v4().to_string(),
        })),
    )
        .into_response()
}

/// Authentication middleware
///
/// Validates the bearer token and adds [`crate::Claims`] to request
/// extensions. Protected routes use this middleware; handlers read the
/// user id from the claims.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let Some(auth_header) = auth_header else {
        return unauthorized("Authorization header required");
    };

    let Some(token) = extract_bearer_token(auth_header) else {
        return unauthorized("Bearer token required");
    };

    match auth.validate_token(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            warn!("Token validation failed: {}", e);
            unauthorized("Invalid or expired token")
        }
    }
}
