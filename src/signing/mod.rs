//! Signature Issuer
//!
//! Produces the guard's authorization for a recipient to claim an amount.
//!
//! # Canonical message
//!
//! ```text
//! "boost-guard:claim:v1"
//! boost_id   u64  big-endian
//! chain_id   u64  big-endian
//! amount     u128 big-endian
//! recipient  u32 big-endian length || UTF-8
//! guard      u32 big-endian length || UTF-8
//! ```
//!
//! The SHA-256 digest of the message is signed with the guard's Ed25519
//! key and rendered as `0x` + 128 hex characters.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ed25519_dalek::{Signature, Verifier};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::custody::{verifying_key, KeyCustody};
use crate::types::{Address, Amount, BoostError, ClaimKey, Result};

pub const CLAIM_DOMAIN: &[u8] = b"boost-guard:claim:v1";

/// What a claim signature authorizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimAuthorization {
    pub boost_id: u64,
    pub chain_id: u64,
    pub recipient: Address,
    pub amount: Amount,
    pub guard: Address,
}

impl ClaimAuthorization {
    pub fn new(key: &ClaimKey, amount: Amount, guard: Address) -> Self {
        Self {
            boost_id: key.boost_id,
            chain_id: key.chain_id,
            recipient: key.recipient.clone(),
            amount,
            guard,
        }
    }

    pub fn canonical_message(&self) -> Vec<u8> {
        let recipient = self.recipient.as_str().as_bytes();
        let guard = self.guard.as_str().as_bytes();

        let mut message =
            Vec::with_capacity(CLAIM_DOMAIN.len() + 8 + 8 + 16 + 4 + recipient.len() + 4 + guard.len());
        message.extend_from_slice(CLAIM_DOMAIN);
        message.extend_from_slice(&self.boost_id.to_be_bytes());
        message.extend_from_slice(&self.chain_id.to_be_bytes());
        message.extend_from_slice(&self.amount.to_be_bytes());
        push_prefixed(&mut message, recipient);
        push_prefixed(&mut message, guard);
        message
    }

    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.canonical_message()).into()
    }
}

fn push_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    // Addresses are short; the conversion only fails past 4 GiB
    let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Ed25519 claim signature, `0x`-hex on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSignature(Signature);

impl ClaimSignature {
    pub fn inner(&self) -> &Signature {
        &self.0
    }
}

impl fmt::Display for ClaimSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0.to_bytes()))
    }
}

impl FromStr for ClaimSignature {
    type Err = BoostError;

    fn from_str(s: &str) -> Result<Self> {
        let hex_part = s.strip_prefix("0x").unwrap_or(s);
        let bytes: [u8; 64] = hex::decode(hex_part)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| BoostError::BadRequest(format!("`{s}` is not a 64-byte hex signature")))?;
        Ok(Self(Signature::from_bytes(&bytes)))
    }
}

/// Check `signature` against the guard named in `auth`
pub fn verify_claim(auth: &ClaimAuthorization, signature: &ClaimSignature) -> Result<bool> {
    let key = verifying_key(&auth.guard)?;
    Ok(key.verify(&auth.digest(), &signature.0).is_ok())
}

pub struct SignatureIssuer {
    custody: Arc<dyn KeyCustody>,
}

impl SignatureIssuer {
    pub fn new(custody: Arc<dyn KeyCustody>) -> Self {
        Self { custody }
    }

    pub fn custody(&self) -> &Arc<dyn KeyCustody> {
        &self.custody
    }

    /// Sign `auth`, or return `None` when there is nothing to authorize.
    ///
    /// Fails with `SigningUnavailable` when custody holds no key for the
    /// guard, or the key it holds does not belong to that guard address.
    pub async fn sign(&self, auth: &ClaimAuthorization) -> Result<Option<ClaimSignature>> {
        if auth.amount.is_zero() {
            return Ok(None);
        }

        let signer = self.custody.get_signer(&auth.guard).await?;
        if signer.guard() != &auth.guard {
            return Err(BoostError::SigningUnavailable(format!(
                "custody returned key for {} when asked for {}",
                signer.guard(),
                auth.guard
            )));
        }

        let signature = ClaimSignature(signer.sign(&auth.digest()));
        debug!(
            "Signed {} for {} on boost {} chain {}",
            auth.amount, auth.recipient, auth.boost_id, auth.chain_id
        );
        Ok(Some(signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::{crypto::generate_keypair, CustodyConfig, MemoryKeyCustody};

    fn issuer_with_guard() -> (SignatureIssuer, Address) {
        let (key, _) = generate_keypair();
        let custody = MemoryKeyCustody::new(CustodyConfig::default());
        let guard = custody.insert(key);
        (SignatureIssuer::new(Arc::new(custody)), guard)
    }

    fn auth(guard: &Address, amount: u128) -> ClaimAuthorization {
        let key = ClaimKey::new(5, 10, Address::parse("0xabc").unwrap());
        ClaimAuthorization::new(&key, Amount::new(amount), guard.clone())
    }

    #[test]
    fn test_canonical_message_layout() {
        let guard = Address::parse("0x01").unwrap();
        let message = auth(&guard, 300).canonical_message();

        let mut expected = CLAIM_DOMAIN.to_vec();
        expected.extend_from_slice(&5u64.to_be_bytes());
        expected.extend_from_slice(&10u64.to_be_bytes());
        expected.extend_from_slice(&300u128.to_be_bytes());
        expected.extend_from_slice(&5u32.to_be_bytes());
        expected.extend_from_slice(b"0xabc");
        expected.extend_from_slice(&4u32.to_be_bytes());
        expected.extend_from_slice(b"0x01");
        assert_eq!(message, expected);
    }

    #[tokio::test]
    async fn test_sign_and_verify() {
        let (issuer, guard) = issuer_with_guard();
        let claim = auth(&guard, 300);
        let sig = issuer.sign(&claim).await.unwrap().unwrap();

        let wire = sig.to_string();
        assert!(wire.starts_with("0x"));
        assert_eq!(wire.len(), 2 + 128);

        let parsed: ClaimSignature = wire.parse().unwrap();
        assert!(verify_claim(&claim, &parsed).unwrap());
        assert!(!verify_claim(&auth(&guard, 301), &parsed).unwrap());
    }

    #[tokio::test]
    async fn test_zero_amount_is_not_signed() {
        let (issuer, guard) = issuer_with_guard();
        assert!(issuer.sign(&auth(&guard, 0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_key_is_signing_unavailable() {
        let (issuer, _) = issuer_with_guard();
        let (_, other) = generate_keypair();
        let err = issuer
            .sign(&auth(&crate::custody::guard_address(&other), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, BoostError::SigningUnavailable(_)));
    }

    #[test]
    fn test_malformed_signature_rejected() {
        assert!("0x1234".parse::<ClaimSignature>().is_err());
        assert!("zz".parse::<ClaimSignature>().is_err());
    }
}
