//! Bearer token presence check for the chat routes.
//!
//! Tokens are not verified here; the check only guarantees that a request
//! carries one when `server.require_auth` is on.

use super::types::ApiError;
use super::AppState;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

/// Non-empty token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Reject chat requests without a bearer token when auth is required.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.config.server.require_auth && bearer_token(request.headers()).is_none() {
        debug!(path = %request.uri().path(), "Missing bearer token");
        return ApiError::unauthorized().into_response();
    }
    next.run(request).await
}
