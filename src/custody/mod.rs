//! Guard Key Custody
//!
//! Holds the guard signing keys in process memory and hands out a signer per
//! guard address. The signing engine never persists key material.
//!
//! # Guard addresses
//!
//! Guards are Ed25519 keys. A guard address is `0x` followed by the hex of
//! the 32-byte verifying key, so the address itself is enough to verify a
//! claim signature.

pub mod crypto;
pub mod keystore;
pub mod memory;
pub mod source;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::types::{Address, BoostError, Result};

pub use keystore::Keystore;
pub use memory::{CustodyConfig, MemoryKeyCustody};
pub use source::{KeySource, KeystoreSource, PlaintextKeys};

/// Address of the guard holding `key`
pub fn guard_address(key: &VerifyingKey) -> Address {
    Address::from_bytes(key.as_bytes())
}

/// Recover the verifying key from a guard address
pub fn verifying_key(guard: &Address) -> Result<VerifyingKey> {
    let hex_part = guard
        .as_str()
        .strip_prefix("0x")
        .ok_or_else(|| BoostError::BadRequest(format!("guard {guard} is not an ed25519 address")))?;
    let bytes: [u8; 32] = hex::decode(hex_part)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| BoostError::BadRequest(format!("guard {guard} is not an ed25519 address")))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| BoostError::BadRequest(format!("guard {guard} is not a valid key: {e}")))
}

/// Signing capability for one guard. Key bytes are zeroized on drop.
pub struct GuardSigner {
    guard: Address,
    key: SigningKey,
}

impl GuardSigner {
    pub fn new(key: SigningKey) -> Self {
        Self {
            guard: guard_address(&key.verifying_key()),
            key,
        }
    }

    pub fn guard(&self) -> &Address {
        &self.guard
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.key.sign(message)
    }
}

impl std::fmt::Debug for GuardSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardSigner").field("guard", &self.guard).finish_non_exhaustive()
    }
}

/// Source of guard signers
#[async_trait::async_trait]
pub trait KeyCustody: Send + Sync {
    /// Signer for `guard`, or `SigningUnavailable` when no key is held
    async fn get_signer(&self, guard: &Address) -> Result<GuardSigner>;

    /// Guards a signer can currently be obtained for
    fn guards(&self) -> Vec<Address>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Verifier;

    #[test]
    fn test_guard_address_round_trip() {
        let (key, public) = crypto::generate_keypair();
        let guard = guard_address(&public);
        assert!(guard.as_str().starts_with("0x"));
        assert_eq!(guard.as_str().len(), 66);
        assert_eq!(verifying_key(&guard).unwrap(), public);

        let signer = GuardSigner::new(key);
        assert_eq!(signer.guard(), &guard);
        let sig = signer.sign(b"claim");
        assert!(public.verify(b"claim", &sig).is_ok());
    }

    #[test]
    fn test_non_ed25519_guard_rejected() {
        let guard = Address::parse("0x1111").unwrap();
        assert!(verifying_key(&guard).is_err());
        let guard = Address::parse("So1anaGuard").unwrap();
        assert!(verifying_key(&guard).is_err());
    }
}
