//! Chain-native addresses and the composite keys built on them

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::error::{BoostError, Result};

/// A chain-native address string.
///
/// `0x`-prefixed hex addresses are lower-cased so `0xABC` and `0xabc` name
/// the same recipient; any other encoding (base58 and friends) is kept
/// verbatim because its case is significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BoostError::BadRequest("address is empty".into()));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(BoostError::BadRequest(format!(
                "address `{trimmed}` contains whitespace"
            )));
        }

        if let Some(hex_part) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            if hex_part.is_empty() || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(BoostError::BadRequest(format!(
                    "address `{trimmed}` is not valid hex"
                )));
            }
            return Ok(Self(format!("0x{}", hex_part.to_ascii_lowercase())));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// `0x`-prefixed lower-case hex of raw address bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = BoostError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Identity of a boost: `(id, chainId)` is unique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoostKey {
    pub id: u64,
    pub chain_id: u64,
}

impl BoostKey {
    pub fn new(id: u64, chain_id: u64) -> Self {
        Self { id, chain_id }
    }
}

impl fmt::Display for BoostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "boost {} on chain {}", self.id, self.chain_id)
    }
}

/// Claim ledger key: one record per `(boostId, chainId, recipient)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClaimKey {
    pub boost_id: u64,
    pub chain_id: u64,
    pub recipient: Address,
}

impl ClaimKey {
    pub fn new(boost_id: u64, chain_id: u64, recipient: Address) -> Self {
        Self {
            boost_id,
            chain_id,
            recipient,
        }
    }

    pub fn boost(&self) -> BoostKey {
        BoostKey::new(self.boost_id, self.chain_id)
    }
}

impl fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.boost_id, self.chain_id, self.recipient
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_addresses_normalise() {
        let a = Address::parse("0xABCdef").unwrap();
        let b = Address::parse("  0Xabcdef ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xabcdef");
    }

    #[test]
    fn test_non_hex_addresses_keep_case() {
        let a = Address::parse("So1anaPubKeyBase58").unwrap();
        assert_eq!(a.as_str(), "So1anaPubKeyBase58");
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("0x").is_err());
        assert!(Address::parse("0xzz").is_err());
        assert!(Address::parse("ab cd").is_err());
    }

    #[test]
    fn test_deserialize_normalises() {
        let a: Address = serde_json::from_str("\"0xAbC\"").unwrap();
        assert_eq!(a.as_str(), "0xabc");
        assert!(serde_json::from_str::<Address>("\"0xnothex\"").is_err());
    }
}
