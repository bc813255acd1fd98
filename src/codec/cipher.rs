//! Payload encryption
//!
//! AES-256-GCM with a key derived per aggregate from one master key via
//! HKDF-SHA256. Sealed layout: `nonce (12 bytes) || ciphertext || tag`.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::CodecError;

pub(crate) const NONCE_LEN: usize = 12;

const KEY_DERIVATION_SALT: &[u8] = b"ledger-es/payload-key/v1";

/// Master secret from which per-aggregate payload keys are derived
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64 character hex string
    pub fn from_hex(value: &str) -> Result<Self, CodecError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value.trim(), &mut bytes)
            .map_err(|e| CodecError::InvalidKey(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Derive the payload key for one aggregate stream
    fn derive(&self, aggregate_id: Uuid) -> Result<[u8; 32], CodecError> {
        let hk = Hkdf::<Sha256>::new(Some(KEY_DERIVATION_SALT), &self.0);
        let mut okm = [0u8; 32];
        hk.expand(aggregate_id.as_bytes(), &mut okm)
            .map_err(|e| CodecError::InvalidKey(e.to_string()))?;
        Ok(okm)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Seals and opens payloads for a given aggregate
#[derive(Debug, Clone)]
pub(crate) struct PayloadCipher {
    master: MasterKey,
}

impl PayloadCipher {
    pub(crate) fn new(master: MasterKey) -> Self {
        Self { master }
    }

    fn cipher_for(&self, aggregate_id: Uuid) -> Result<Aes256Gcm, CodecError> {
        let mut key_bytes = self.master.derive(aggregate_id)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        key_bytes.zeroize();
        Ok(cipher)
    }

    pub(crate) fn seal(&self, aggregate_id: Uuid, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        let cipher = self.cipher_for(aggregate_id)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| CodecError::Encode(format!("encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Authenticate and decrypt; any failure is reported as tampering
    pub(crate) fn open(&self, aggregate_id: Uuid, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CodecError> {
        if sealed.len() < NONCE_LEN {
            return Err(CodecError::TamperedOrCorrupt);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = self.cipher_for(aggregate_id)?;

        cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CodecError::TamperedOrCorrupt)
    }
}
