//! Cryptographic primitives for guard key custody.
//!
//! # Algorithms
//!
//! - **Guard keys**: Ed25519
//! - **Key Derivation**: Argon2id over the keystore passphrase
//! - **Encryption**: ChaCha20-Poly1305 (authenticated encryption)

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::types::{BoostError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Salt length for key derivation (16 bytes)
pub const SALT_LEN: usize = 16;

/// Nonce length for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_LEN: usize = 12;

/// Ed25519 secret key length (32 bytes)
pub const SECRET_KEY_LEN: usize = 32;

/// ChaCha20-Poly1305 auth tag length (16 bytes)
pub const AUTH_TAG_LEN: usize = 16;

// =============================================================================
// Key Generation
// =============================================================================

/// Generate a new Ed25519 guard keypair from the OS RNG.
pub fn generate_keypair() -> (SigningKey, VerifyingKey) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key)
}

pub fn generate_random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Parse a hex-encoded 32-byte secret key, with or without `0x`.
pub fn parse_secret_key(raw: &str) -> Result<SigningKey> {
    let trimmed = raw.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = Zeroizing::new(
        hex::decode(hex_part).map_err(|e| BoostError::Config(format!("Invalid guard key hex: {e}")))?,
    );
    let secret: &[u8; SECRET_KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
        BoostError::Config(format!(
            "Invalid guard key length: expected {} bytes, got {}",
            SECRET_KEY_LEN,
            bytes.len()
        ))
    })?;
    Ok(SigningKey::from_bytes(secret))
}

// =============================================================================
// Key Derivation
// =============================================================================

/// Argon2id cost parameters, stored alongside each keystore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kb: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kb: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// Derive a 256-bit key encryption key from a passphrase using Argon2id.
pub fn derive_key_encryption_key(
    passphrase: &[u8],
    salt: &[u8],
    kdf: &KdfParams,
) -> Result<Zeroizing<[u8; 32]>> {
    let params = Params::new(kdf.memory_kb, kdf.iterations, kdf.parallelism, Some(32))
        .map_err(|e| BoostError::Config(format!("Invalid Argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase, salt, &mut key[..])
        .map_err(|e| BoostError::Internal(format!("Key derivation failed: {e}")))?;

    Ok(key)
}

// =============================================================================
// Encryption / Decryption
// =============================================================================

pub fn encrypt(plaintext: &[u8], encryption_key: &[u8; 32], nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(encryption_key));
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| BoostError::Internal(format!("Encryption failed: {e}")))
}

/// Fails if the ciphertext was tampered with or the key is wrong.
pub fn decrypt(
    ciphertext: &[u8],
    encryption_key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(encryption_key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| BoostError::Config("Failed to decrypt keystore (wrong passphrase?)".into()))
}

// =============================================================================
// Tests
// =============================================================================
