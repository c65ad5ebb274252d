//! Boost Guard - strategy evaluation and claim signing for funded boosts
//!
//! Answers `status(boostId, recipient, chainId)`: how much a recipient may
//! claim from a boost right now, with the guard's signature authorizing an
//! on-chain contract to release it.
//!
//! ## Components
//!
//! - **Strategy Registry**: closed set of eligibility strategies by name
//! - **Entitlement Evaluator**: deterministic total entitlement per recipient
//! - **Claim Ledger**: issued-so-far per recipient and per boost pool
//! - **Signature Issuer**: guard signatures over a canonical claim message
//! - **Status Engine**: composes the above behind the HTTP surface

pub mod boost;
pub mod clock;
pub mod config;
pub mod custody;
pub mod db;
pub mod engine;
pub mod entitlement;
pub mod ledger;
pub mod registry;
pub mod routes;
pub mod server;
pub mod signing;
pub mod strategy;
pub mod types;

pub use config::Args;
pub use engine::StatusEngine;
pub use server::{run, AppState};
pub use types::{BoostError, Result};
