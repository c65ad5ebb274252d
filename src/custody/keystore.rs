//! Encrypted guard keystore
//!
//! A JSON file holding every guard secret key of a deployment, encrypted as
//! one bundle under a passphrase. Written by `boost-guard-keygen`, opened
//! once at startup.

use std::io::Write;
use std::path::Path;

use base64ct::{Base64, Encoding};
use chrono::Utc;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::crypto::{
    decrypt, derive_key_encryption_key, encrypt, generate_random_bytes, parse_secret_key,
    KdfParams, NONCE_LEN, SALT_LEN,
};
use super::guard_address;
use crate::types::{Address, BoostError, Result};

const KEYSTORE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keystore {
    /// Format version (for forward compatibility)
    pub version: u32,

    /// Guard addresses in the bundle, readable without the passphrase
    pub guards: Vec<Address>,

    pub kdf: KdfParams,

    /// Key derivation salt (base64)
    pub salt: String,

    /// Encryption nonce (base64)
    pub nonce: String,

    /// Encrypted JSON array of hex secret keys (base64)
    pub ciphertext: String,

    pub created_at: String,
}

impl Keystore {
    pub fn seal(keys: &[SigningKey], passphrase: &str) -> Result<Self> {
        Self::seal_with(keys, passphrase, KdfParams::default())
    }

    pub fn seal_with(keys: &[SigningKey], passphrase: &str, kdf: KdfParams) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(BoostError::Config("Keystore passphrase is empty".into()));
        }

        let secrets: Vec<Zeroizing<String>> = keys
            .iter()
            .map(|k| Zeroizing::new(hex::encode(k.to_bytes())))
            .collect();
        let plaintext = Zeroizing::new(serde_json::to_vec(
            &secrets.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        )?);

        let salt: [u8; SALT_LEN] = generate_random_bytes();
        let nonce: [u8; NONCE_LEN] = generate_random_bytes();
        let kek = derive_key_encryption_key(passphrase.as_bytes(), &salt, &kdf)?;
        let ciphertext = encrypt(&plaintext, &kek, &nonce)?;

        Ok(Self {
            version: KEYSTORE_VERSION,
            guards: keys.iter().map(|k| guard_address(&k.verifying_key())).collect(),
            kdf,
            salt: Base64::encode_string(&salt),
            nonce: Base64::encode_string(&nonce),
            ciphertext: Base64::encode_string(&ciphertext),
            created_at: Utc::now().to_rfc3339(),
        })
    }

    /// Decrypt the bundle. Fails on a wrong passphrase or a tampered file.
    pub fn open(&self, passphrase: &str) -> Result<Vec<SigningKey>> {
        if self.version != KEYSTORE_VERSION {
            return Err(BoostError::Config(format!(
                "Unsupported keystore version {}",
                self.version
            )));
        }

        let salt = decode_field("salt", &self.salt)?;
        let nonce: [u8; NONCE_LEN] = decode_field("nonce", &self.nonce)?
            .as_slice()
            .try_into()
            .map_err(|_| BoostError::Config("Keystore nonce has wrong length".into()))?;
        let ciphertext = decode_field("ciphertext", &self.ciphertext)?;

        let kek = derive_key_encryption_key(passphrase.as_bytes(), &salt, &self.kdf)?;
        let plaintext = decrypt(&ciphertext, &kek, &nonce)?;
        let secrets: Vec<Zeroizing<String>> = serde_json::from_slice::<Vec<String>>(&plaintext)
            .map_err(|e| BoostError::Config(format!("Corrupt keystore payload: {e}")))?
            .into_iter()
            .map(Zeroizing::new)
            .collect();

        let keys = secrets
            .iter()
            .map(|s| parse_secret_key(s))
            .collect::<Result<Vec<_>>>()?;

        let addresses: Vec<Address> = keys.iter().map(|k| guard_address(&k.verifying_key())).collect();
        if addresses != self.guards {
            return Err(BoostError::Config(
                "Keystore guard list does not match its encrypted keys".into(),
            ));
        }
        Ok(keys)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BoostError::Config(format!("Cannot read keystore {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| BoostError::Config(format!("Invalid keystore {}: {e}", path.display())))
    }

    /// Write to a new file; fails if `path` already exists
    pub fn create(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    Base64::decode_vec(value).map_err(|e| BoostError::Config(format!("Keystore {name} is not base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::crypto::{generate_keypair, tests::light_kdf};

    #[test]
    fn test_seal_and_open() {
        let (a, _) = generate_keypair();
        let (b, _) = generate_keypair();
        let store = Keystore::seal_with(&[a.clone(), b.clone()], "hunter2", light_kdf()).unwrap();
        assert_eq!(store.guards.len(), 2);

        let keys = store.open("hunter2").unwrap();
        assert_eq!(keys[0].to_bytes(), a.to_bytes());
        assert_eq!(keys[1].to_bytes(), b.to_bytes());
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let (a, _) = generate_keypair();
        let store = Keystore::seal_with(&[a], "right", light_kdf()).unwrap();
        let err = store.open("wrong").unwrap_err();
        assert!(matches!(err, BoostError::Config(_)));
    }

    #[test]
    fn test_tampered_guard_list_rejected() {
        let (a, _) = generate_keypair();
        let (other, _) = generate_keypair();
        let mut store = Keystore::seal_with(&[a], "pw", light_kdf()).unwrap();
        store.guards = vec![guard_address(&other.verifying_key())];
        assert!(store.open("pw").is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guards.json");
        let (a, _) = generate_keypair();

        Keystore::seal_with(&[a.clone()], "pw", light_kdf()).unwrap().save(&path).unwrap();
        let keys = Keystore::load(&path).unwrap().open("pw").unwrap();
        assert_eq!(keys[0].to_bytes(), a.to_bytes());
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guards.json");
        let (a, _) = generate_keypair();
        let (b, _) = generate_keypair();

        Keystore::seal_with(&[a.clone()], "pw", light_kdf()).unwrap().create(&path).unwrap();
        let second = Keystore::seal_with(&[b], "pw", light_kdf()).unwrap();
        assert!(second.create(&path).is_err());

        let keys = Keystore::load(&path).unwrap().open("pw").unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].to_bytes(), a.to_bytes());
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        let (a, _) = generate_keypair();
        assert!(Keystore::seal_with(&[a], "", light_kdf()).is_err());
    }
}
