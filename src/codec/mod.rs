//! Codec module
//!
//! Binary encoding of event and snapshot payloads.
//!
//! Wire format: `[format byte][body]`.
//! - `0x01` plain: body is CBOR
//! - `0x02` sealed: body is `nonce || AES-256-GCM(CBOR)`
//!
//! CBOR structs are encoded as maps keyed by field name, so unknown fields
//! are skipped on decode and new optional fields can be added with
//! `#[serde(default)]`.

mod cipher;

pub use cipher::MasterKey;

use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use cipher::PayloadCipher;

const FORMAT_PLAIN: u8 = 0x01;
const FORMAT_SEALED: u8 = 0x02;

/// Payload kind used for snapshots in the associated data
pub const SNAPSHOT_KIND: &str = "snapshot";

/// Errors that can occur while encoding or decoding payloads
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Authentication failed or the envelope is not what was written
    #[error("Payload tampered or corrupt")]
    TamperedOrCorrupt,

    /// Payload authenticated (or was plain) but its body does not decode
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Sealed payload read by a codec without a key
    #[error("Payload is encrypted but no encryption key is configured")]
    MissingKey,

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),
}

/// Where a payload lives; bound into the ciphertext as associated data
#[derive(Debug, Clone, Copy)]
pub struct PayloadScope<'a> {
    pub aggregate_id: Uuid,
    pub sequence_number: i64,
    /// Event type, or [`SNAPSHOT_KIND`]
    pub kind: &'a str,
}

impl<'a> PayloadScope<'a> {
    pub fn event(aggregate_id: Uuid, sequence_number: i64, event_type: &'a str) -> Self {
        Self {
            aggregate_id,
            sequence_number,
            kind: event_type,
        }
    }

    pub fn snapshot(aggregate_id: Uuid, version: i64) -> Self {
        Self {
            aggregate_id,
            sequence_number: version,
            kind: SNAPSHOT_KIND,
        }
    }

    fn associated_data(&self) -> Vec<u8> {
        let mut aad = Vec::with_capacity(16 + 8 + self.kind.len());
        aad.extend_from_slice(self.aggregate_id.as_bytes());
        aad.extend_from_slice(&self.sequence_number.to_be_bytes());
        aad.extend_from_slice(self.kind.as_bytes());
        aad
    }
}

/// Encodes and decodes payloads, optionally sealing them
#[derive(Debug, Clone)]
pub struct EventCodec {
    cipher: Option<PayloadCipher>,
}

impl EventCodec {
    /// Codec that writes plain CBOR
    pub fn plain() -> Self {
        Self { cipher: None }
    }

    /// Codec that seals every payload with a per-aggregate key
    pub fn encrypted(master_key: MasterKey) -> Self {
        Self {
            cipher: Some(PayloadCipher::new(master_key)),
        }
    }

    pub fn from_key(master_key: Option<MasterKey>) -> Self {
        master_key.map_or_else(Self::plain, Self::encrypted)
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn encode<T: Serialize>(&self, scope: &PayloadScope<'_>, value: &T) -> Result<Vec<u8>, CodecError> {
        let body = serde_cbor::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))?;

        match &self.cipher {
            None => {
                let mut out = Vec::with_capacity(1 + body.len());
                out.push(FORMAT_PLAIN);
                out.extend_from_slice(&body);
                Ok(out)
            }
            Some(cipher) => {
                let sealed = cipher.seal(scope.aggregate_id, &scope.associated_data(), &body)?;
                let mut out = Vec::with_capacity(1 + sealed.len());
                out.push(FORMAT_SEALED);
                out.extend_from_slice(&sealed);
                Ok(out)
            }
        }
    }

    /// Decode a payload. With encryption enabled this fails closed: anything
    /// that is not a sealed envelope that authenticates is `TamperedOrCorrupt`.
    pub fn decode<T: DeserializeOwned>(&self, scope: &PayloadScope<'_>, bytes: &[u8]) -> Result<T, CodecError> {
        let (format, body) = bytes.split_first().ok_or(CodecError::TamperedOrCorrupt)?;

        let plaintext = match (&self.cipher, *format) {
            (Some(cipher), FORMAT_SEALED) => cipher.open(scope.aggregate_id, &scope.associated_data(), body)?,
            (Some(_), _) => return Err(CodecError::TamperedOrCorrupt),
            (None, FORMAT_PLAIN) => body.to_vec(),
            (None, FORMAT_SEALED) => return Err(CodecError::MissingKey),
            (None, other) => {
                return Err(CodecError::Malformed(format!("unknown payload format 0x{other:02x}")))
            }
        };

        serde_cbor::from_slice(&plaintext).map_err(|e| CodecError::Malformed(e.to_string()))
    }
}
