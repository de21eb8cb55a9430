//! Notification intake endpoint

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::api::{ApiError, ApiResult, ApiState};

/// POST /api/v1/notifications
///
/// Runs a delivery envelope through the remediator and mirrors the handler
/// response status code.
#[instrument(skip_all)]
pub async fn receive_notification(
    State(state): State<ApiState>,
    envelope: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(envelope) = envelope.map_err(|e| {
        warn!("unreadable request body: {e}");
        ApiError::InvalidRequest(e.body_text())
    })?;

    let response = state.remediator.handle_envelope(&envelope).await?;

    let status = StatusCode::from_u16(response.status_code)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((status, Json(response.body)))
}
