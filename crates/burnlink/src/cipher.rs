//! Authenticated symmetric encryption for share payloads.
//!
//! - **Cipher**: ChaCha20-Poly1305
//! - **Key**: 256 bits from the OS RNG, one per share
//! - **Nonce**: 96 bits, fresh per call, stored in front of the ciphertext
//!
//! ```text
//! [ nonce (12 bytes) ][ ciphertext ][ Poly1305 tag (16 bytes) ]
//! ```
//!
//! Keys never leave the client; the server only ever sees the output of
//! [`encrypt`].

use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// The AEAD refused the input (only possible for absurdly large payloads).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("encryption failed")]
pub struct EncryptionError;

/// Wrong key, truncated input or tampered bytes. Never says which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unable to decrypt")]
pub struct DecryptionError;

/// A key string from a link was not 64 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("key must be {} hex characters", KEY_LEN * 2)]
pub struct KeyError;

/// 32-byte share key. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Lowercase hex, the form carried in a link fragment.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let mut bytes = [0u8; KEY_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| KeyError)?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Generate a fresh random key.
pub fn generate_key() -> SecretKey {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    SecretKey(key)
}

/// Encrypt `plaintext` under `key`, returning `nonce || ciphertext || tag`.
pub fn encrypt(plaintext: &[u8], key: &SecretKey) -> Result<Vec<u8>, EncryptionError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from(nonce_bytes);

    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| EncryptionError)?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt output of [`encrypt`]. Fails closed on any mismatch.
pub fn decrypt(ciphertext: &[u8], key: &SecretKey) -> Result<Vec<u8>, DecryptionError> {
    if ciphertext.len() < NONCE_LEN + TAG_LEN {
        return Err(DecryptionError);
    }
    let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), sealed)
        .map_err(|_| DecryptionError)
}
