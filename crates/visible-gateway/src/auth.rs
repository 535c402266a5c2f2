// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication for the gateway.
//!
//! REST routes take `Authorization: Bearer <token>`. The WebSocket handshake
//! also accepts `?token=` since browsers cannot set headers on upgrades.
//! Every request without a resolvable token is rejected.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use visible_core::types::Identity;
use visible_core::VisibleError;

use crate::handlers::ErrorResponse;
use crate::server::GatewayState;

/// Token from the `Authorization` header, if it carries a bearer token.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller from a header token, falling back to a query token.
pub fn authenticate(
    state: &GatewayState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<Identity, VisibleError> {
    let token = bearer_token(headers)
        .or(query_token.filter(|t| !t.is_empty()))
        .ok_or_else(|| VisibleError::PermissionDenied("missing bearer token".into()))?;
    state.identity.resolve(token)
}

/// Reply for a failed authentication.
pub fn unauthorized(err: &VisibleError) -> Response {
    tracing::debug!(error = %err, "request rejected");
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            code: "unauthorized",
            error: "invalid or missing bearer token".to_string(),
        }),
    )
        .into_response()
}

/// Middleware resolving the bearer token and storing the [`Identity`] as a
/// request extension.
pub async fn auth_middleware(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, request.headers(), None) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => unauthorized(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn ignores_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
