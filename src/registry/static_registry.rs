//! File-backed registry
//!
//! Boosts and tokens are read once from a JSON document:
//!
//! ```json
//! {
//!   "boosts": [{ "id": 1, "chainId": 10, "balance": "1000", ... }],
//!   "tokens": [{ "chainId": 10, "address": "0x...", "symbol": "OP", "decimals": 18 }]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::{BoostRegistry, TokenResolver};
use crate::boost::{Boost, Token};
use crate::types::{Address, BoostError, BoostKey, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoostsDocument {
    #[serde(default)]
    pub boosts: Vec<Boost>,

    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEntry {
    pub chain_id: u64,

    #[serde(flatten)]
    pub token: Token,
}

pub struct StaticRegistry {
    boosts: BTreeMap<BoostKey, Boost>,
    tokens: HashMap<(Address, u64), Token>,
}

impl StaticRegistry {
    pub fn from_document(doc: BoostsDocument) -> Result<Self> {
        let mut boosts = BTreeMap::new();
        for boost in doc.boosts {
            boost
                .validate()
                .map_err(|e| BoostError::Config(format!("Invalid boost in registry: {e}")))?;
            let key = boost.key();
            if boosts.insert(key, boost).is_some() {
                return Err(BoostError::Config(format!("Duplicate {key} in registry")));
            }
        }

        let mut tokens = HashMap::new();
        for entry in doc.tokens {
            let address = entry.token.address.clone();
            if tokens.insert((address.clone(), entry.chain_id), entry.token).is_some() {
                return Err(BoostError::Config(format!(
                    "Duplicate token {} on chain {} in registry",
                    address, entry.chain_id
                )));
            }
        }

        Ok(Self { boosts, tokens })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BoostError::Config(format!("Cannot read {}: {e}", path.display())))?;
        let doc: BoostsDocument = serde_json::from_str(&raw)
            .map_err(|e| BoostError::Config(format!("Invalid boosts file {}: {e}", path.display())))?;
        let registry = Self::from_document(doc)?;
        info!(
            "Loaded {} boosts and {} tokens from {}",
            registry.boosts.len(),
            registry.tokens.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.boosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boosts.is_empty()
    }
}

#[async_trait::async_trait]
impl BoostRegistry for StaticRegistry {
    async fn get_boost(&self, id: u64, chain_id: u64) -> Result<Boost> {
        let key = BoostKey::new(id, chain_id);
        self.boosts
            .get(&key)
            .cloned()
            .ok_or_else(|| BoostError::NotFound(key.to_string()))
    }

    async fn list_boosts(&self) -> Result<Vec<Boost>> {
        Ok(self.boosts.values().cloned().collect())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[async_trait::async_trait]
impl TokenResolver for StaticRegistry {
    async fn resolve(&self, address: &Address, chain_id: u64) -> Result<Token> {
        self.tokens
            .get(&(address.clone(), chain_id))
            .cloned()
            .ok_or_else(|| BoostError::NotFound(format!("token {address} on chain {chain_id}")))
    }
}
