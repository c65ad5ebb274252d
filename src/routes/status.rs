//! `Query.status`

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;

use super::{error_response, json_response};
use crate::server::AppState;
use crate::types::{Address, BoostError, Result};

/// Arguments of a status (or rewards) query, from the query string or a JSON
/// body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub boost_id: u64,
    pub recipient: String,
    pub chain_id: u64,
}

impl StatusQuery {
    pub(crate) fn recipient(&self) -> Result<Address> {
        if self.chain_id == 0 {
            return Err(BoostError::BadRequest("chainId must be positive".into()));
        }
        Address::parse(&self.recipient)
    }
}

/// GET /status?boostId=&recipient=&chainId=
pub async fn status_from_query(state: &Arc<AppState>, query: &str) -> Response<Full<Bytes>> {
    match serde_urlencoded::from_str::<StatusQuery>(query) {
        Ok(q) => status(state, q).await,
        Err(e) => error_response(BoostError::BadRequest(format!("Invalid status query: {e}"))),
    }
}

/// POST /status
pub async fn status_from_body(state: &Arc<AppState>, body: &[u8]) -> Response<Full<Bytes>> {
    match serde_json::from_slice::<StatusQuery>(body) {
        Ok(q) => status(state, q).await,
        Err(e) => error_response(BoostError::BadRequest(format!("Invalid status body: {e}"))),
    }
}

async fn status(state: &Arc<AppState>, query: StatusQuery) -> Response<Full<Bytes>> {
    let recipient = match query.recipient() {
        Ok(r) => r,
        Err(e) => return error_response(e),
    };

    match state.engine.status(query.boost_id, &recipient, query.chain_id).await {
        Ok(status) => json_response(StatusCode::OK, &status),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::http::tests::{call, test_state};
    use hyper::Method;
    use serde_json::json;

    #[test]
    fn test_query_string_parsing() {
        let q: StatusQuery = serde_urlencoded::from_str("boostId=3&recipient=0xAbC&chainId=10").unwrap();
        assert_eq!((q.boost_id, q.chain_id), (3, 10));
        assert_eq!(q.recipient().unwrap().as_str(), "0xabc");

        assert!(serde_urlencoded::from_str::<StatusQuery>("boostId=3&chainId=10").is_err());
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let state = test_state();
        let (code, body) = call(&state, Method::POST, "/status", None, "{not json").await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("BAD_REQUEST"));
    }

    #[tokio::test]
    async fn test_blank_recipient() {
        let state = test_state();
        let (code, _) = call(
            &state,
            Method::POST,
            "/status",
            None,
            r#"{"boostId":1,"recipient":"  ","chainId":10}"#,
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }
}
