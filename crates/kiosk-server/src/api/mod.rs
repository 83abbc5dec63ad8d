//! Router, shared state and middleware.

pub mod handlers;
pub mod middleware;
pub mod response;

use axum::Router;
use axum::routing::post;
use kiosk_terminal::Terminal;

use self::handlers::{card_status, confirm, issue_card, not_found};
use self::middleware::{cors_middleware, logging_middleware};

/// State shared by every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub terminal: Terminal,
}

impl AppState {
    pub fn new(terminal: Terminal) -> Self {
        Self { terminal }
    }
}

/// Build the API router.
///
/// Each endpoint also answers on its trailing-slash variant. Logging is
/// the outermost layer so it sees the final status, CORS headers included.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/issue-card", post(issue_card))
        .route("/issue-card/", post(issue_card))
        .route("/confirm", post(confirm))
        .route("/confirm/", post(confirm))
        .route("/card-status", post(card_status).get(card_status))
        .route("/card-status/", post(card_status).get(card_status))
        .fallback(not_found)
        .layer(axum::middleware::from_fn(cors_middleware))
        .layer(axum::middleware::from_fn(logging_middleware))
        .with_state(state)
}
