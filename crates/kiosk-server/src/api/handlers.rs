//! Endpoint handlers.
//!
//! Every handler answers with JSON. Workflow errors map to 409/410/400,
//! device failures to 500, and a stage that ran but identified nothing is
//! a 200 with `success: false`.

use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kiosk_terminal::{ErrorKind, StageOutcome, TerminalError};
use serde_json::json;
use tracing::warn;

use super::AppState;
use super::response::{
    ConfirmRequest, ConfirmSuccess, Conflict, ErrorBody, IssueFailure, IssueSuccess, StatusBody,
};

/// Error reported when a stage ends without an identifier.
pub const NOT_IDENTIFIED: &str = "UID not received after retries";

/// `POST /issue-card`: stage a card and identify it.
pub async fn issue_card(State(state): State<AppState>) -> Response {
    let started = Instant::now();

    match state.terminal.stage().await {
        Ok(StageOutcome::Identified(card)) => {
            (StatusCode::OK, Json(IssueSuccess::from(&card))).into_response()
        }
        Ok(StageOutcome::NotIdentified { attempts, elapsed }) => {
            let body = IssueFailure::new(NOT_IDENTIFIED, elapsed, Some(attempts));
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(TerminalError::OperationPending { operation_id }) => {
            let body = Conflict {
                error: "Operation already pending".to_string(),
                operation_id: operation_id.map(|id| id.to_string()),
            };
            (StatusCode::CONFLICT, Json(body)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Stage failed");
            let body = IssueFailure::new(e.to_string(), started.elapsed(), None);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// `POST /confirm`: dispense or return the parked card.
///
/// The body is parsed here rather than through the `Json` extractor so a
/// malformed body gets the same `{error}` shape as every other rejection.
pub async fn confirm(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ConfirmRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let body = ErrorBody::new(format!("Invalid request body: {e}"));
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    match state
        .terminal
        .confirm(&request.operation_id, request.allow)
        .await
    {
        Ok(resolution) => {
            (StatusCode::OK, Json(ConfirmSuccess::from(&resolution))).into_response()
        }
        Err(e) => {
            let status = match e.kind() {
                ErrorKind::Gone => StatusCode::GONE,
                ErrorKind::Mismatch | ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Execution => {
                    warn!(error = %e, "Confirm failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            let body = json!({ "success": false, "error": e.to_string() });
            (status, Json(body)).into_response()
        }
    }
}

/// `GET|POST /card-status`: read the card-position sensor.
pub async fn card_status(State(state): State<AppState>) -> Response {
    match state.terminal.card_status().await {
        Ok(status) => {
            let body = StatusBody {
                status: i32::from(status.code()),
                error: None,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Status query failed");
            let body = StatusBody {
                status: -1,
                error: Some(e.to_string()),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// Unknown paths.
pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorBody::new("Not found"))).into_response()
}
