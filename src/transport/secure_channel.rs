//! # Secure Channel
//!
//! Turns a byte stream that may not be binary-transparent into a
//! confidential, tamper-evident message channel.
//!
//! ## Wire Payload
//! ```text
//! base64( [Nonce(24)] [Ciphertext(N)] [Tag(16)] )
//! ```
//!
//! A fresh random nonce is drawn inside [`SecureChannel::encode`] for every
//! message; no API accepts a caller-supplied nonce, so nonce reuse under the
//! channel key cannot be expressed. Decoding verifies the Poly1305 tag, so a
//! tampered payload fails with `TransportIntegrity` instead of yielding garbage.
//!
//! The channel also keeps per-client certificate trust records. Verification
//! is an exact byte comparison against the stored record: there is no chain
//! validation and no expiry check.

use std::collections::HashMap;
use std::sync::RwLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, instrument, warn};

use crate::error::{constants, ProtocolError, Result};
use crate::utils::crypto::{Crypto, KeyMaterial, KEY_LENGTH, NONCE_LENGTH};

pub struct SecureChannel {
    crypto: Crypto,
    key: KeyMaterial,
    certificates: RwLock<HashMap<String, Vec<u8>>>,
}

impl SecureChannel {
    /// Create a channel with a fresh random 256-bit key
    pub fn generate() -> Result<Self> {
        Ok(Self::from_key(Crypto::generate_key()?))
    }

    /// Create a channel from existing key material (e.g. the peer's key)
    pub fn from_key(key: [u8; KEY_LENGTH]) -> Self {
        Self {
            crypto: Crypto::new(&key),
            key: KeyMaterial(key),
            certificates: RwLock::new(HashMap::new()),
        }
    }

    /// Create a channel from a base64-encoded 32-byte key
    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| ProtocolError::ConfigError(constants::ERR_INVALID_BASE64.to_string()))?;
        let key: [u8; KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ProtocolError::ConfigError(constants::ERR_INVALID_KEY.to_string()))?;
        Ok(Self::from_key(key))
    }

    /// Base64 form of the channel key, for provisioning the peer
    pub fn export_key(&self) -> String {
        STANDARD.encode(self.key.0)
    }

    /// A second channel sharing this key but with its own trust records
    pub fn peer(&self) -> Self {
        Self::from_key(self.key.0)
    }

    /// Encrypt `plaintext` under a fresh nonce and wrap it as base64 text
    #[instrument(skip(self, plaintext), fields(len = plaintext.len()), level = "trace")]
    pub fn encode(&self, plaintext: &[u8]) -> Result<String> {
        let nonce = Crypto::generate_nonce()?;
        let ciphertext = self.crypto.encrypt(plaintext, &nonce)?;

        let mut payload = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(payload))
    }

    /// Reverse [`encode`](Self::encode).
    ///
    /// Malformed base64, a payload shorter than the nonce, or a failed tag
    /// check all surface as `TransportIntegrity`.
    #[instrument(skip(self, wire), fields(len = wire.len()), level = "trace")]
    pub fn decode(&self, wire: &str) -> Result<Vec<u8>> {
        let payload = STANDARD
            .decode(wire.trim())
            .map_err(|_| ProtocolError::TransportIntegrity(constants::ERR_INVALID_BASE64))?;

        if payload.len() < NONCE_LENGTH {
            return Err(ProtocolError::TransportIntegrity(constants::ERR_SHORT_PAYLOAD));
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LENGTH);
        let mut nonce = [0u8; NONCE_LENGTH];
        nonce.copy_from_slice(nonce_bytes);

        self.crypto.decrypt(ciphertext, &nonce).inspect_err(|_| {
            warn!("Channel payload failed authentication");
        })
    }

    /// Store (or replace) the trust record for a client
    pub fn add_certificate(&self, client_id: &str, certificate: &[u8]) -> Result<()> {
        let mut certificates = self
            .certificates
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_CERTIFICATE_LOCK))?;
        certificates.insert(client_id.to_string(), certificate.to_vec());
        debug!(client_id, bytes = certificate.len(), "Certificate registered");
        Ok(())
    }

    /// True iff a record exists for the client and equals `certificate` byte for byte
    pub fn verify_certificate(&self, client_id: &str, certificate: &[u8]) -> bool {
        let Ok(certificates) = self.certificates.read() else {
            warn!(client_id, "Certificate store unavailable");
            return false;
        };
        certificates
            .get(client_id)
            .is_some_and(|stored| stored.as_slice() == certificate)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_round_trip() {
        let channel = SecureChannel::generate().unwrap();
        let wire = channel.encode(b"WRITE N1 30.5").unwrap();
        assert_eq!(channel.decode(&wire).unwrap(), b"WRITE N1 30.5");
    }

    #[test]
    fn test_same_plaintext_gives_distinct_payloads() {
        let channel = SecureChannel::generate().unwrap();
        let first = channel.encode(b"READ N1").unwrap();
        let second = channel.encode(b"READ N1").unwrap();
        assert_ne!(first, second);
        assert_eq!(channel.decode(&first).unwrap(), b"READ N1");
        assert_eq!(channel.decode(&second).unwrap(), b"READ N1");
    }

    #[test]
    fn test_peer_shares_key() {
        let server = SecureChannel::generate().unwrap();
        let client = SecureChannel::from_base64_key(&server.export_key()).unwrap();
        let wire = client.encode(b"hello").unwrap();
        assert_eq!(server.decode(&wire).unwrap(), b"hello");
        assert_eq!(server.peer().decode(&wire).unwrap(), b"hello");
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let channel = SecureChannel::generate().unwrap();
        let wire = channel.encode(b"SUCCESS").unwrap();
        let mut raw = STANDARD.decode(&wire).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = STANDARD.encode(raw);

        assert!(matches!(
            channel.decode(&tampered),
            Err(ProtocolError::TransportIntegrity(constants::ERR_TAG_MISMATCH))
        ));
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        let channel = SecureChannel::generate().unwrap();
        assert!(matches!(
            channel.decode("not base64 !!"),
            Err(ProtocolError::TransportIntegrity(constants::ERR_INVALID_BASE64))
        ));
        assert!(matches!(
            channel.decode(&STANDARD.encode([0u8; 8])),
            Err(ProtocolError::TransportIntegrity(constants::ERR_SHORT_PAYLOAD))
        ));
    }

    #[test]
    fn test_other_key_rejected() {
        let a = SecureChannel::generate().unwrap();
        let b = SecureChannel::generate().unwrap();
        let wire = a.encode(b"secret").unwrap();
        assert!(b.decode(&wire).is_err());
    }

    #[test]
    fn test_invalid_base64_key() {
        assert!(SecureChannel::from_base64_key("%%%").is_err());
        assert!(SecureChannel::from_base64_key(&STANDARD.encode([1u8; 16])).is_err());
    }

    #[test]
    fn test_certificate_exact_match() {
        let channel = SecureChannel::generate().unwrap();
        assert!(!channel.verify_certificate("plc-1", b"cert"));

        channel.add_certificate("plc-1", b"cert").unwrap();
        assert!(channel.verify_certificate("plc-1", b"cert"));
        assert!(!channel.verify_certificate("plc-1", b"cert "));
        assert!(!channel.verify_certificate("plc-2", b"cert"));

        channel.add_certificate("plc-1", b"rotated").unwrap();
        assert!(!channel.verify_certificate("plc-1", b"cert"));
        assert!(channel.verify_certificate("plc-1", b"rotated"));
    }
}
