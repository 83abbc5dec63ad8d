//! Request middleware.

use std::time::Instant;

use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, info, warn};

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";

/// Answer preflight requests and stamp CORS headers on every response.
pub async fn cors_middleware(req: Request<Body>, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    response
}

/// Log each request with its status and duration.
///
/// Server errors log at `error`, client errors at `warn`, workflow
/// endpoints at `info` and preflights at `debug`.
pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis();
    if response.status().is_server_error() {
        error!(%method, %path, status, duration_ms, "Request failed");
    } else if response.status().is_client_error() {
        warn!(%method, %path, status, duration_ms, "Request rejected");
    } else if method == Method::OPTIONS {
        debug!(%method, %path, status, duration_ms, "Preflight");
    } else {
        info!(%method, %path, status, duration_ms, "Request");
    }

    response
}
