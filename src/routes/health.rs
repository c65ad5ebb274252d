//! Health check endpoints
//!
//! - /health, /healthz - Liveness probe (is the service running?)
//! - /ready, /readyz - Readiness probe (can boosts be resolved and claims
//!   recorded?)

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::json_response;
use crate::custody::memory::CustodyStatsSnapshot;
use crate::custody::KeyCustody;
use crate::registry::token::ResolverStatsSnapshot;
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub node_id: String,
    /// "development" or "production"
    pub mode: &'static str,
    pub registry: &'static str,
    /// "mongodb" or "memory"
    pub ledger: &'static str,
    /// Guards a signature can currently be produced for
    pub guards: usize,
    pub custody: CustodyStatsSnapshot,
    pub tokens: ResolverStatsSnapshot,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe - 200 whenever the process is serving
pub fn health_check(state: &Arc<AppState>) -> Response<Full<Bytes>> {
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        node_id: state.args.node_id.to_string(),
        mode: if state.args.dev_mode { "development" } else { "production" },
        registry: state.engine.registry().name(),
        ledger: if state.mongo.is_some() { "mongodb" } else { "memory" },
        guards: state.custody.guards().len(),
        custody: state.custody.stats(),
        tokens: state.tokens.stats(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    json_response(StatusCode::OK, &response)
}

/// Readiness probe - 503 until registry and ledger database answer
pub async fn readiness_check(state: &Arc<AppState>) -> Response<Full<Bytes>> {
    let mut problem = state
        .engine
        .registry()
        .ping()
        .await
        .err()
        .map(|e| format!("registry: {e}"));

    if problem.is_none() {
        if let Some(mongo) = &state.mongo {
            problem = mongo.ping().await.err().map(|e| format!("ledger: {e}"));
        }
    }

    let status = if problem.is_none() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(
        status,
        &ReadinessResponse {
            ready: problem.is_none(),
            error: problem,
        },
    )
}
