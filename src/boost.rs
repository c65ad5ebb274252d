//! Boost data model
//!
//! Boosts and tokens are owned by the external registry; the engine only
//! reads them. Field names follow the public query schema (camelCase,
//! `strategyURI`).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::{Address, Amount, BoostError, BoostKey, Result};

/// A funded, time-bounded incentive pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Boost {
    pub id: u64,

    /// Descriptor/version of the strategy spec. Informational only; dispatch
    /// uses `strategy.strategy`.
    #[serde(rename = "strategyURI", default)]
    pub strategy_uri: String,

    /// Funded pool size in token base units
    pub balance: Amount,

    /// Address whose key authorizes claims
    pub guard: Address,

    /// Claim window, Unix seconds, inclusive on both ends
    pub start: u64,
    pub end: u64,

    pub owner: Address,

    pub chain_id: u64,

    pub token: Token,

    #[serde(default)]
    pub strategy: Option<StrategySpec>,
}

impl Boost {
    pub fn key(&self) -> BoostKey {
        BoostKey::new(self.id, self.chain_id)
    }

    /// Check the record-level invariants a registry must uphold
    pub fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(BoostError::Upstream(format!(
                "boost {} has chainId 0",
                self.id
            )));
        }
        if self.start > self.end {
            return Err(BoostError::Upstream(format!(
                "{} has start {} after end {}",
                self.key(),
                self.start,
                self.end
            )));
        }
        Ok(())
    }

    /// Whether `as_of` falls inside the claim window
    pub fn is_open_at(&self, as_of: u64) -> bool {
        as_of >= self.start && as_of <= self.end
    }

    /// Registry key of the eligibility strategy, if any
    pub fn strategy_name(&self) -> Option<&str> {
        self.strategy
            .as_ref()
            .and_then(|s| s.strategy.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// Token metadata; immutable once resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

impl Token {
    /// A token known only by its address
    pub fn bare(address: Address) -> Self {
        Self {
            address,
            name: None,
            symbol: None,
            decimals: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.decimals.is_some()
    }
}

/// Strategy selection on a boost
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StrategySpec {
    /// Strategy registry key; absent means no programmatic eligibility
    #[serde(default)]
    pub strategy: Option<String>,

    /// Opaque params, validated against the strategy when evaluated
    #[serde(default)]
    pub params: JsonValue,
}

/// Derived answer to a status query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub boost_id: u64,
    pub recipient: Address,
    pub amount: Option<Amount>,
    pub chain_id: u64,
    pub guard: Address,
    pub sig: Option<String>,
}

impl Status {
    /// Benign response when nothing is issuable
    pub fn unsigned(boost: &Boost, recipient: &Address) -> Self {
        Self {
            boost_id: boost.id,
            recipient: recipient.clone(),
            amount: Some(Amount::ZERO),
            chain_id: boost.chain_id,
            guard: boost.guard.clone(),
            sig: None,
        }
    }

    pub fn signed(boost: &Boost, recipient: &Address, amount: Amount, sig: String) -> Self {
        Self {
            boost_id: boost.id,
            recipient: recipient.clone(),
            amount: Some(amount),
            chain_id: boost.chain_id,
            guard: boost.guard.clone(),
            sig: Some(sig),
        }
    }
}

/// What a status query would issue right now, computed without reserving
/// or signing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardPreview {
    pub boost_id: u64,
    pub chain_id: u64,
    pub recipient: Address,
    /// Total entitlement under the boost strategy
    pub entitled: Amount,
    /// Already authorized by earlier status queries
    pub issued: Amount,
    pub issuable: Amount,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn boost(id: u64, balance: u128, strategy: Option<(&str, JsonValue)>) -> Boost {
        Boost {
            id,
            strategy_uri: "ipfs://strategy".into(),
            balance: Amount::new(balance),
            guard: Address::parse("0x1111").unwrap(),
            start: 0,
            end: 9_999_999_999,
            owner: Address::parse("0x2222").unwrap(),
            chain_id: 1,
            token: Token::bare(Address::parse("0x3333").unwrap()),
            strategy: strategy.map(|(name, params)| StrategySpec {
                strategy: Some(name.to_string()),
                params,
            }),
        }
    }
}
