//! Where guard keys come from
//!
//! Custody loads every source at startup and goes back to the source that
//! lists a guard when that guard's key has expired, so a key TTL bounds how
//! long secrets sit decrypted without making a guard permanently unusable.

use std::path::{Path, PathBuf};

use ed25519_dalek::SigningKey;
use zeroize::Zeroizing;

use super::crypto::parse_secret_key;
use super::{guard_address, Keystore};
use crate::types::{Address, Result};

/// Reloadable supply of guard signing keys
pub trait KeySource: Send + Sync {
    /// Short description for logs, never key material
    fn describe(&self) -> String;

    /// Guards this source can supply, ideally without decrypting anything
    fn guards(&self) -> Result<Vec<Address>>;

    /// Produce the signing keys. May be slow (key derivation).
    fn load(&self) -> Result<Vec<SigningKey>>;
}

/// Encrypted keystore file, re-opened on every load
pub struct KeystoreSource {
    path: PathBuf,
    passphrase: Zeroizing<String>,
}

impl KeystoreSource {
    pub fn new(path: impl Into<PathBuf>, passphrase: &str) -> Self {
        Self {
            path: path.into(),
            passphrase: Zeroizing::new(passphrase.to_string()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeySource for KeystoreSource {
    fn describe(&self) -> String {
        format!("keystore {}", self.path.display())
    }

    fn guards(&self) -> Result<Vec<Address>> {
        Ok(Keystore::load(&self.path)?.guards)
    }

    fn load(&self) -> Result<Vec<SigningKey>> {
        Keystore::load(&self.path)?.open(&self.passphrase)
    }
}

/// Hex secret keys from `GUARD_KEYS` (dev mode only)
pub struct PlaintextKeys {
    secrets: Vec<Zeroizing<String>>,
    guards: Vec<Address>,
}

impl PlaintextKeys {
    /// Parse every non-blank entry up front so bad input fails at startup
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Self> {
        let secrets: Vec<Zeroizing<String>> = raw
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .map(|s| Zeroizing::new(s.to_string()))
            .collect();
        let guards = secrets
            .iter()
            .map(|s| parse_secret_key(s).map(|k| guard_address(&k.verifying_key())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { secrets, guards })
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl KeySource for PlaintextKeys {
    fn describe(&self) -> String {
        "GUARD_KEYS".to_string()
    }

    fn guards(&self) -> Result<Vec<Address>> {
        Ok(self.guards.clone())
    }

    fn load(&self) -> Result<Vec<SigningKey>> {
        self.secrets.iter().map(|s| parse_secret_key(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::crypto::{generate_keypair, tests::light_kdf};

    #[test]
    fn test_plaintext_keys() {
        let (key, public) = generate_keypair();
        let raw = vec![format!("0x{}", hex::encode(key.to_bytes())), "  ".to_string()];

        let source = PlaintextKeys::parse(&raw).unwrap();
        assert_eq!(source.guards().unwrap(), vec![guard_address(&public)]);
        assert_eq!(source.load().unwrap()[0].to_bytes(), key.to_bytes());

        assert!(PlaintextKeys::parse(&["0xnothex"]).is_err());
        assert!(PlaintextKeys::parse::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_keystore_source_lists_guards_without_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guards.json");
        let (key, public) = generate_keypair();
        Keystore::seal_with(&[key], "pw", light_kdf()).unwrap().save(&path).unwrap();

        let wrong = KeystoreSource::new(&path, "nope");
        assert_eq!(wrong.guards().unwrap(), vec![guard_address(&public)]);
        assert!(wrong.load().is_err());

        let right = KeystoreSource::new(&path, "pw");
        assert_eq!(right.load().unwrap().len(), 1);
        assert_eq!(right.path(), path.as_path());
    }
}
