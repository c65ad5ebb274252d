//! Boost Registry and Token Resolver
//!
//! External collaborators that own boost records and token metadata. The
//! engine only reads through these traits.

pub mod static_registry;
pub mod subgraph;
pub mod token;

use crate::boost::{Boost, Token};
use crate::types::{Address, Result};

pub use static_registry::{BoostsDocument, StaticRegistry};
pub use subgraph::SubgraphRegistry;
pub use token::CachedTokenResolver;

/// Source of boost records
#[async_trait::async_trait]
pub trait BoostRegistry: Send + Sync {
    /// The boost with identity `(id, chain_id)`, or `NotFound`
    async fn get_boost(&self, id: u64, chain_id: u64) -> Result<Boost>;

    async fn list_boosts(&self) -> Result<Vec<Boost>>;

    /// Readiness probe
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

/// Source of token metadata
#[async_trait::async_trait]
pub trait TokenResolver: Send + Sync {
    async fn resolve(&self, address: &Address, chain_id: u64) -> Result<Token>;
}
