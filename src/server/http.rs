//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo, one task per connection.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::clock::SystemClock;
use crate::config::Args;
use crate::custody::{self, CustodyConfig, KeySource, KeystoreSource, MemoryKeyCustody, PlaintextKeys};
use crate::db::MongoClient;
use crate::engine::StatusEngine;
use crate::entitlement::EntitlementEvaluator;
use crate::ledger::{self, ClaimLedger, ClaimStore, MemoryClaimStore, MongoClaimStore};
use crate::registry::{BoostRegistry, CachedTokenResolver, StaticRegistry, SubgraphRegistry, TokenResolver};
use crate::routes;
use crate::signing::SignatureIssuer;
use crate::strategy::StrategyRegistry;
use crate::types::BoostError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 64 * 1024;

/// How often idle claim locks are dropped
const LOCK_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub engine: Arc<StatusEngine>,
    /// Guard keys held by this process
    pub custody: Arc<MemoryKeyCustody>,
    pub tokens: Arc<CachedTokenResolver>,
    /// Persistent ledger connection, absent in dev mode
    pub mongo: Option<MongoClient>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire registry, ledger, custody and engine from configuration
    pub async fn build(args: Args) -> Result<Self, BoostError> {
        let (registry, token_source): (Arc<dyn BoostRegistry>, Arc<dyn TokenResolver>) =
            if let Some(url) = &args.subgraph_url {
                let subgraph = Arc::new(SubgraphRegistry::new(url.clone(), args.request_timeout())?);
                (subgraph.clone(), subgraph)
            } else if let Some(path) = &args.boosts_file {
                let file = Arc::new(StaticRegistry::from_file(path)?);
                (file.clone(), file)
            } else {
                return Err(BoostError::Config("No boost registry configured".into()));
            };
        let tokens = Arc::new(CachedTokenResolver::new(token_source));

        let (store, mongo): (Arc<dyn ClaimStore>, Option<MongoClient>) = match &args.mongodb_uri {
            Some(uri) => {
                let client = MongoClient::new(uri, &args.mongodb_db).await?;
                (Arc::new(MongoClaimStore::new(&client).await?), Some(client))
            }
            None => {
                warn!("Claim ledger is in memory; issuances are forgotten on restart");
                (Arc::new(MemoryClaimStore::new()), None)
            }
        };

        let custody = Arc::new(load_custody(&args).await?);
        if custody.is_empty() {
            warn!("No guard keys loaded; every non-zero status will be SIGNING_UNAVAILABLE");
        }

        let engine = StatusEngine::new(
            registry,
            tokens.clone(),
            EntitlementEvaluator::new(Arc::new(StrategyRegistry::builtin()?)),
            ClaimLedger::new(store),
            SignatureIssuer::new(custody.clone()),
            Arc::new(SystemClock),
        );

        Ok(Self::from_parts(args, Arc::new(engine), custody, tokens, mongo))
    }

    pub fn from_parts(
        args: Args,
        engine: Arc<StatusEngine>,
        custody: Arc<MemoryKeyCustody>,
        tokens: Arc<CachedTokenResolver>,
        mongo: Option<MongoClient>,
    ) -> Self {
        Self {
            args,
            engine,
            custody,
            tokens,
            mongo,
            started_at: Instant::now(),
        }
    }
}

/// Load guard keys from GUARD_KEYS and the keystore. Both stay registered as
/// sources so keys evicted by the TTL are reloaded on demand.
async fn load_custody(args: &Args) -> Result<MemoryKeyCustody, BoostError> {
    let mut sources: Vec<Arc<dyn KeySource>> = Vec::new();

    let plaintext = PlaintextKeys::parse(&args.guard_keys)?;
    if !plaintext.is_empty() {
        sources.push(Arc::new(plaintext));
    }

    if let Some(path) = &args.guard_keystore {
        let passphrase = args.guard_keystore_passphrase.as_deref().ok_or_else(|| {
            BoostError::Config("GUARD_KEYSTORE requires GUARD_KEYSTORE_PASSPHRASE".into())
        })?;
        sources.push(Arc::new(KeystoreSource::new(path, passphrase)));
    }

    let custody = MemoryKeyCustody::with_sources(
        CustodyConfig {
            key_ttl: args.key_ttl(),
            ..Default::default()
        },
        sources,
    );
    let loaded = custody.load_all().await?;
    info!("Loaded {} guard key(s)", loaded);
    Ok(custody)
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), BoostError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Boost Guard listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - in-memory ledger and plaintext keys allowed");
    }

    ledger::spawn_prune_task(Arc::clone(state.engine.ledger().locks()), LOCK_PRUNE_INTERVAL);
    if state.custody.config().key_ttl.is_some() {
        custody::memory::spawn_cleanup_task(Arc::clone(&state.custody));
        info!("Guard keys expire after {}s", state.args.key_ttl_seconds);
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Read the request and hand it to the router
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    info!("[{}] {} {}", addr, method, path);

    let body = if method == Method::POST {
        match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return Ok(to_boxed(routes::error_response(BoostError::BadRequest(format!(
                    "Unreadable request body: {e}"
                )))))
            }
        }
    } else {
        Bytes::new()
    };

    Ok(to_boxed(dispatch(&state, &method, &path, query.as_deref(), &body).await))
}

/// Route a fully read request
pub async fn dispatch(
    state: &Arc<AppState>,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (method, segments.as_slice()) {
        (&Method::OPTIONS, _) => routes::preflight_response(),

        // Liveness probe
        (&Method::GET, ["health"]) | (&Method::GET, ["healthz"]) => routes::health_check(state),

        // Readiness probe - registry (and ledger database) reachable
        (&Method::GET, ["ready"]) | (&Method::GET, ["readyz"]) => {
            routes::readiness_check(state).await
        }

        (&Method::GET, ["boosts"]) => routes::list_boosts(state).await,
        (&Method::GET, ["boosts", chain_id, id]) => routes::get_boost(state, chain_id, id).await,

        (&Method::GET, ["status"]) => routes::status_from_query(state, query.unwrap_or("")).await,
        (&Method::POST, ["status"]) => routes::status_from_body(state, body).await,

        // Preview only: no reservation, no signature
        (&Method::GET, ["rewards"]) => routes::rewards_from_query(state, query.unwrap_or("")).await,
        (&Method::POST, ["rewards"]) => routes::rewards_from_body(state, body).await,

        _ => routes::not_found_response(path),
    }
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}
