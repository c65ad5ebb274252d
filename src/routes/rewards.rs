//! Read-only rewards preview
//!
//! Same arguments as `status`, but never reserves, signs or advances the
//! claim ledger.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use super::status::StatusQuery;
use super::{error_response, json_response};
use crate::server::AppState;
use crate::types::BoostError;

/// GET /rewards?boostId=&recipient=&chainId=
pub async fn rewards_from_query(state: &Arc<AppState>, query: &str) -> Response<Full<Bytes>> {
    match serde_urlencoded::from_str::<StatusQuery>(query) {
        Ok(q) => rewards(state, q).await,
        Err(e) => error_response(BoostError::BadRequest(format!("Invalid rewards query: {e}"))),
    }
}

/// POST /rewards
pub async fn rewards_from_body(state: &Arc<AppState>, body: &[u8]) -> Response<Full<Bytes>> {
    match serde_json::from_slice::<StatusQuery>(body) {
        Ok(q) => rewards(state, q).await,
        Err(e) => error_response(BoostError::BadRequest(format!("Invalid rewards body: {e}"))),
    }
}

async fn rewards(state: &Arc<AppState>, query: StatusQuery) -> Response<Full<Bytes>> {
    let recipient = match query.recipient() {
        Ok(r) => r,
        Err(e) => return error_response(e),
    };

    match state.engine.rewards(query.boost_id, &recipient, query.chain_id).await {
        Ok(preview) => json_response(StatusCode::OK, &preview),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use crate::server::http::tests::{call, test_state};
    use hyper::{Method, StatusCode};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_preview_then_status_then_preview() {
        let state = test_state();
        let query = Some("boostId=1&recipient=0xabc&chainId=10");

        let (code, before) = call(&state, Method::GET, "/rewards", query, "").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(before["entitled"], json!("300"));
        assert_eq!(before["issued"], json!("0"));
        assert_eq!(before["issuable"], json!("300"));
        assert!(before.get("sig").is_none());

        // The preview did not consume the entitlement
        let (_, status) = call(&state, Method::GET, "/status", query, "").await;
        assert_eq!(status["amount"], json!("300"));

        let (code, after) = call(
            &state,
            Method::POST,
            "/rewards",
            None,
            r#"{"boostId":1,"recipient":"0xABC","chainId":10}"#,
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(after["issued"], json!("300"));
        assert_eq!(after["issuable"], json!("0"));
    }

    #[tokio::test]
    async fn test_unknown_boost_and_bad_query() {
        let state = test_state();
        let (code, body) = call(
            &state,
            Method::GET,
            "/rewards",
            Some("boostId=5&recipient=0xabc&chainId=10"),
            "",
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, Value::Null);

        let (code, body) = call(&state, Method::GET, "/rewards", Some("recipient=0xabc"), "").await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("BAD_REQUEST"));
    }
}
