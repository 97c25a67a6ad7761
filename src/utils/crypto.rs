//! XChaCha20-Poly1305 AEAD primitive used by the secure channel.
//!
//! The 24-byte extended nonce is large enough to draw at random for every
//! message without a realistic collision risk under one key.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use zeroize::Zeroize;

use crate::error::{constants, ProtocolError, Result};

pub const KEY_LENGTH: usize = 32;
pub const NONCE_LENGTH: usize = 24;

pub struct Crypto {
    cipher: XChaCha20Poly1305,
}

impl Crypto {
    pub fn new(key: &[u8; KEY_LENGTH]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Fresh random key from the operating system RNG
    pub fn generate_key() -> Result<[u8; KEY_LENGTH]> {
        let mut key = [0u8; KEY_LENGTH];
        getrandom::fill(&mut key)
            .map_err(|_| ProtocolError::Custom(constants::ERR_RANDOM_SOURCE.to_string()))?;
        Ok(key)
    }

    /// Fresh random nonce from the operating system RNG
    pub fn generate_nonce() -> Result<[u8; NONCE_LENGTH]> {
        let mut nonce = [0u8; NONCE_LENGTH];
        getrandom::fill(&mut nonce)
            .map_err(|_| ProtocolError::Custom(constants::ERR_RANDOM_SOURCE.to_string()))?;
        Ok(nonce)
    }

    pub fn encrypt(&self, plaintext: &[u8], nonce: &[u8; NONCE_LENGTH]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(XNonce::from_slice(nonce), plaintext)
            .map_err(|_| ProtocolError::EncryptionFailure)
    }

    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8; NONCE_LENGTH]) -> Result<Vec<u8>> {
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| ProtocolError::TransportIntegrity(constants::ERR_TAG_MISMATCH))
    }
}

/// Owned key bytes wiped from memory on drop
pub(crate) struct KeyMaterial(pub(crate) [u8; KEY_LENGTH]);

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}
