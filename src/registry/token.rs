//! Token metadata cache
//!
//! Tokens are immutable once resolved, so entries never expire. Failed
//! lookups are not cached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use super::TokenResolver;
use crate::boost::Token;
use crate::types::{Address, Result};

#[derive(Debug, Default)]
struct ResolverStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolverStatsSnapshot {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct CachedTokenResolver {
    inner: Arc<dyn TokenResolver>,
    cache: DashMap<(Address, u64), Token>,
    stats: ResolverStats,
}

impl CachedTokenResolver {
    pub fn new(inner: Arc<dyn TokenResolver>) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            stats: ResolverStats::default(),
        }
    }

    pub fn stats(&self) -> ResolverStatsSnapshot {
        ResolverStatsSnapshot {
            entries: self.cache.len(),
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
        }
    }
}

#[async_trait::async_trait]
impl TokenResolver for CachedTokenResolver {
    async fn resolve(&self, address: &Address, chain_id: u64) -> Result<Token> {
        let key = (address.clone(), chain_id);
        if let Some(token) = self.cache.get(&key) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(token.clone());
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.resolve(address, chain_id).await?;
        debug!("Resolved token {} on chain {}", address, chain_id);
        self.cache.insert(key, token.clone());
        Ok(token)
    }
}
