//! Boost Guard - strategy evaluation and claim signing for funded boosts

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boost_guard::{config::Args, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("boost_guard={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Boost Guard");
    info!("  Strategy evaluation & claim signing");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    match (&args.subgraph_url, &args.boosts_file) {
        (Some(url), _) => info!("Registry: subgraph {}", url),
        (None, Some(path)) => info!("Registry: file {}", path.display()),
        (None, None) => {}
    }
    info!(
        "Ledger: {}",
        if args.mongodb_uri.is_some() {
            format!("MongoDB database '{}'", args.mongodb_db)
        } else {
            "in-memory".to_string()
        }
    );
    if let Some(path) = &args.guard_keystore {
        info!("Keystore: {}", path.display());
    }
    info!("======================================");

    let state = match AppState::build(args).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Strategies: {}",
        state.engine.evaluator().strategies().names().collect::<Vec<_>>().join(", ")
    );
    info!("Signing for {} guard(s)", state.custody.len());

    server::run(state).await?;
    Ok(())
}
