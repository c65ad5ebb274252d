//! Configuration for Boost Guard
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Boost Guard - strategy evaluation and claim signing for funded boosts
#[derive(Parser, Debug, Clone)]
#[command(name = "boost-guard")]
#[command(about = "Computes boost entitlements and signs claim authorizations")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory ledger, plaintext keys allowed)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// JSON file seeding the static boost registry and token list
    #[arg(long, env = "BOOSTS_FILE")]
    pub boosts_file: Option<PathBuf>,

    /// GraphQL endpoint serving boosts; takes precedence over BOOSTS_FILE
    #[arg(long, env = "SUBGRAPH_URL")]
    pub subgraph_url: Option<String>,

    /// Timeout for upstream registry requests in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "5000")]
    pub request_timeout_ms: u64,

    /// MongoDB connection URI for the claim ledger (in-memory when unset)
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "boost_guard")]
    pub mongodb_db: String,

    /// Comma separated hex ed25519 guard secret keys (dev only)
    #[arg(long, env = "GUARD_KEYS", value_delimiter = ',', hide_env_values = true)]
    pub guard_keys: Vec<String>,

    /// Encrypted guard keystore written by boost-guard-keygen
    #[arg(long, env = "GUARD_KEYSTORE")]
    pub guard_keystore: Option<PathBuf>,

    /// Passphrase for GUARD_KEYSTORE
    #[arg(long, env = "GUARD_KEYSTORE_PASSPHRASE", hide_env_values = true)]
    pub guard_keystore_passphrase: Option<String>,

    /// How long decrypted guard keys stay in memory before they are evicted
    /// and reloaded on demand, in seconds (0 = until shutdown)
    #[arg(long, env = "KEY_TTL_SECONDS", default_value = "0")]
    pub key_ttl_seconds: u64,
}

impl Args {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn key_ttl(&self) -> Option<Duration> {
        (self.key_ttl_seconds > 0).then(|| Duration::from_secs(self.key_ttl_seconds))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.boosts_file.is_none() && self.subgraph_url.is_none() {
            return Err("One of BOOSTS_FILE or SUBGRAPH_URL is required".to_string());
        }

        if !self.dev_mode {
            if self.mongodb_uri.is_none() {
                return Err("MONGODB_URI is required in production mode".to_string());
            }
            if !self.guard_keys.is_empty() {
                return Err(
                    "GUARD_KEYS is only allowed in dev mode; use GUARD_KEYSTORE".to_string(),
                );
            }
        }

        if self.guard_keystore.is_some() && self.guard_keystore_passphrase.is_none() {
            return Err("GUARD_KEYSTORE requires GUARD_KEYSTORE_PASSPHRASE".to_string());
        }

        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be positive".to_string());
        }

        Ok(())
    }
}
