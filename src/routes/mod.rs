//! HTTP route handlers
//!
//! Handlers take already-read request parts and return complete responses,
//! so they are testable without a socket.

pub mod boosts;
pub mod health;
pub mod rewards;
pub mod status;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::{error, warn};

use crate::types::BoostError;

pub use boosts::{get_boost, list_boosts};
pub use health::{health_check, readiness_check};
pub use rewards::{rewards_from_body, rewards_from_query};
pub use status::{status_from_body, status_from_query};

/// JSON response with CORS and no-store caching
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(json) => with_headers(status, Bytes::from(json)),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            with_headers(
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(br#"{"error":"INTERNAL_ERROR","message":"serialization failed","retryable":false}"#),
            )
        }
    }
}

/// Typed error response `{error, message, retryable}`
pub fn error_response(err: BoostError) -> Response<Full<Bytes>> {
    if err.status_code().is_server_error() {
        warn!("Request failed: {}", err);
    }
    let (status, body) = err.into_status_code_and_body();
    json_response(status, &body)
}

fn with_headers(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// CORS preflight response
pub fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS"));
    response
}

pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    error_response(BoostError::NotFound(format!("no route for {path}")))
}
