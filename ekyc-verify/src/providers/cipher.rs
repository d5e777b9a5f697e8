//! Field cipher implementations
//!
//! `AesGcmCipher` provides authenticated at-rest encryption: AES-256-GCM
//! with a SHA-256-derived key and a random 12-byte nonce prepended to the
//! ciphertext, base64-encoded as one opaque string. `PlainCipher` is the
//! passthrough used by tests.

use super::FieldCipher;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// AES-256-GCM field cipher keyed from the service secret
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Derive a 32-byte key from the configured secret
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }
}

impl FieldCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> anyhow::Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("encryption failed: {}", e))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    fn decrypt(&self, ciphertext: &str) -> Option<String> {
        if ciphertext.is_empty() {
            return Some(String::new());
        }

        let combined = BASE64.decode(ciphertext).ok()?;
        if combined.len() <= NONCE_LEN {
            return None;
        }

        let (nonce_bytes, payload) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self.cipher.decrypt(nonce, payload).ok()?;
        String::from_utf8(plaintext).ok()
    }
}

/// Passthrough cipher for tests and plaintext deployments
pub struct PlainCipher;

impl FieldCipher for PlainCipher {
    fn encrypt(&self, plaintext: &str) -> anyhow::Result<String> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, ciphertext: &str) -> Option<String> {
        Some(ciphertext.to_string())
    }
}
