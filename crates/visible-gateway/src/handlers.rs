// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use visible_core::types::{GeoPoint, Identity, WorkAssignment, WorkSession};
use visible_core::{SessionId, UserId, VisibleError};
use visible_session::AssignWork;

use crate::server::GatewayState;

/// Request body for POST /v1/assignments.
#[derive(Debug, Deserialize)]
pub struct AssignmentRequest {
    /// Provider to dispatch to.
    pub provider_id: UserId,
    /// Requested trade.
    pub service_type: String,
    /// Note for the provider.
    #[serde(default)]
    pub message: String,
    /// Work site latitude. Must come with `longitude`.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Work site longitude. Must come with `latitude`.
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl AssignmentRequest {
    fn into_work(self) -> Result<AssignWork, VisibleError> {
        let location = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)?),
            (None, None) => None,
            _ => {
                return Err(VisibleError::Validation(
                    "latitude and longitude must be sent together".into(),
                ));
            }
        };
        Ok(AssignWork {
            provider_id: self.provider_id,
            service_type: self.service_type,
            message: self.message,
            location,
        })
    }
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves requests.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Seconds since process start.
    pub uptime_secs: u64,
    /// Sessions with a running distance ticker.
    pub live_sessions: usize,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub error: String,
}

/// A [`VisibleError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub VisibleError);

impl From<VisibleError> for ApiError {
    fn from(err: VisibleError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            VisibleError::Validation(_) => StatusCode::BAD_REQUEST,
            VisibleError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            VisibleError::SessionNotFound { .. }
            | VisibleError::AssignmentNotFound { .. }
            | VisibleError::MessageNotFound { .. } => StatusCode::NOT_FOUND,
            VisibleError::SessionTerminal { .. } => StatusCode::CONFLICT,
            VisibleError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let error = if self.0.is_client_error() {
            self.0.to_string()
        } else {
            tracing::error!(error = %self.0, "request failed");
            "internal server error".to_string()
        };
        (
            status,
            Json(ErrorResponse {
                code: self.0.code(),
                error,
            }),
        )
            .into_response()
    }
}

/// POST /v1/assignments
///
/// Dispatches work from the authenticated seeker to a provider.
pub async fn post_assignment(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<AssignmentRequest>,
) -> Result<(StatusCode, Json<WorkAssignment>), ApiError> {
    let work = body.into_work()?;
    let assignment = state.engine.assign_work(&identity, work).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// GET /v1/sessions/{session_id}
///
/// The caller's view of one of their sessions.
pub async fn get_session(
    State(state): State<GatewayState>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<String>,
) -> Result<Json<WorkSession>, ApiError> {
    let session = state
        .engine
        .snapshot(&identity, &SessionId(session_id))
        .await?;
    Ok(Json(session))
}

/// GET /health (unauthenticated)
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        live_sessions: state.engine.running_tickers(),
    })
}

/// GET /metrics (unauthenticated)
///
/// 404 when the Prometheus exporter is disabled.
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(lat: Option<f64>, lon: Option<f64>) -> AssignmentRequest {
        AssignmentRequest {
            provider_id: 20,
            service_type: "plumbing".into(),
            message: String::new(),
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn location_is_optional_but_paired() {
        assert!(request(None, None).into_work().unwrap().location.is_none());
        let work = request(Some(12.97), Some(77.59)).into_work().unwrap();
        assert_eq!(work.location, Some(GeoPoint::new(12.97, 77.59).unwrap()));
        assert!(request(Some(12.97), None).into_work().is_err());
        assert!(request(Some(120.0), Some(0.0)).into_work().is_err());
    }

    #[test]
    fn errors_map_to_statuses() {
        let cases = [
            (VisibleError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                VisibleError::PermissionDenied("x".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                VisibleError::SessionNotFound {
                    session_id: "s".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                VisibleError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }
}
