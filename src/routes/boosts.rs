//! `Query.boost` and `Query.boosts`

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use super::{error_response, json_response};
use crate::server::AppState;
use crate::types::{BoostError, Result};

/// GET /boosts
pub async fn list_boosts(state: &Arc<AppState>) -> Response<Full<Bytes>> {
    match state.engine.boosts().await {
        Ok(boosts) => json_response(StatusCode::OK, &boosts),
        Err(e) => error_response(e),
    }
}

/// GET /boosts/{chainId}/{id} - `null` for an unknown boost
pub async fn get_boost(state: &Arc<AppState>, chain_id: &str, id: &str) -> Response<Full<Bytes>> {
    let parsed = parse_id("chainId", chain_id).and_then(|c| Ok((c, parse_id("id", id)?)));
    let (chain_id, id) = match parsed {
        Ok(ids) => ids,
        Err(e) => return error_response(e),
    };

    match state.engine.boost(id, chain_id).await {
        Ok(boost) => json_response(StatusCode::OK, &boost),
        Err(e) => error_response(e),
    }
}

fn parse_id(name: &str, raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| BoostError::BadRequest(format!("{name} `{raw}` is not an integer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::http::tests::{call, test_state};
    use hyper::Method;

    #[tokio::test]
    async fn test_non_numeric_ids_rejected() {
        let state = test_state();
        let (code, body) = call(&state, Method::GET, "/boosts/ten/1", None, "").await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("chainId"));
    }
}
