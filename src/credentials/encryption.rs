//! AES-256-GCM sealing of serialized credential records.
//!
//! A sealed value is a single text column:
//! `enc:v1:<base64 nonce>:<base64 ciphertext>`. Values without the prefix
//! are plaintext JSON, so a store can start encrypting without a migration.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

const SEALED_PREFIX: &str = "enc:v1:";

/// Decodes a base64 master key and checks it is exactly 32 bytes.
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64.trim())
        .context("Failed to decode base64 encryption key")?;

    if key_bytes.len() != KEY_SIZE {
        bail!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        );
    }

    Ok(key_bytes)
}

/// Returns true if `data` was produced by [`encrypt`].
pub fn is_sealed(data: &str) -> bool {
    data.starts_with(SEALED_PREFIX)
}

/// Seals `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<String> {
    let cipher = cipher(key)?;

    // never reuse a nonce under the same key
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    Ok(format!(
        "{}{}:{}",
        SEALED_PREFIX,
        BASE64.encode(nonce),
        BASE64.encode(ciphertext)
    ))
}

/// Opens a value produced by [`encrypt`].
///
/// Fails on a wrong key, a malformed envelope or tampered ciphertext.
pub fn decrypt(sealed: &str, key: &[u8]) -> Result<String> {
    let body = sealed
        .strip_prefix(SEALED_PREFIX)
        .ok_or_else(|| anyhow!("Value is not a sealed credential"))?;
    let (nonce_b64, ciphertext_b64) = body
        .split_once(':')
        .ok_or_else(|| anyhow!("Sealed credential is missing its nonce"))?;

    let nonce_bytes = BASE64.decode(nonce_b64).context("Failed to decode nonce")?;
    if nonce_bytes.len() != NONCE_SIZE {
        bail!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        );
    }
    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .context("Failed to decode ciphertext")?;

    let plaintext = cipher(key)?
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

    String::from_utf8(plaintext).context("Decrypted data is not valid UTF-8")
}

fn cipher(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_SIZE {
        bail!("Encryption key must be {} bytes", KEY_SIZE);
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Failed to create cipher: {}", e))
}
