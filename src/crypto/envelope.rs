// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

//! Authenticated encryption of daily summary payloads.
//!
//! The engine wraps a payload in a [`SummaryDocument`] (payload plus
//! timestamp/version/type), encrypts the serialized document with
//! AES-256-GCM under the provider's current key, and records a SHA-256
//! digest of the plaintext alongside the ciphertext. The digest is redundant
//! with the GCM tag; it exists as a portable integrity marker that can be
//! checked without key material.
//!
//! Nonces are 96-bit and freshly random for every call. Nonce reuse under
//! one key breaks GCM, so nonces are never derived from inputs.

use std::sync::Arc;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::kms::{KeyError, KeyProvider};
use super::{ALGORITHM, ENVELOPE_VERSION, NONCE_LEN};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("authentication failed: ciphertext tag did not verify")]
    AuthenticationFailed,

    #[error("integrity mismatch: expected digest {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("envelope malformed: {0}")]
    InvalidEnvelope(String),
}

/// Envelope metadata, stored next to the ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct EncryptionMetadata {
    pub encrypted_at: DateTime<Utc>,
    pub version: String,
    pub data_type: String,
}

/// The persisted envelope. Field names are a wire contract: existing stored
/// proofs must keep parsing, so they are never renamed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EncryptedEnvelope {
    /// Base64 ciphertext (includes the GCM tag).
    pub encrypted_data: String,
    /// Base64 96-bit nonce.
    pub nonce: String,
    /// Cipher identifier, always `AES-256-GCM`.
    pub algorithm: String,
    /// Hex SHA-256 of the plaintext document.
    pub data_hash: String,
    pub encryption_metadata: EncryptionMetadata,
}

/// The plaintext document that actually gets encrypted: the caller payload
/// plus envelope bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryDocument {
    pub summary: Value,
    pub encrypted_at: DateTime<Utc>,
    pub version: String,
    pub data_type: String,
}

/// Stateless AEAD engine. Every call re-resolves the key through the
/// provider, so a rotation is picked up by the next call while in-flight
/// calls finish under the key they captured.
pub struct EnvelopeCrypto {
    keys: Arc<KeyProvider>,
}

impl EnvelopeCrypto {
    pub fn new(keys: Arc<KeyProvider>) -> Self {
        Self { keys }
    }

    pub fn key_provider(&self) -> &Arc<KeyProvider> {
        &self.keys
    }

    /// Encrypt a payload into an envelope.
    pub async fn encrypt(
        &self,
        summary: &Value,
        data_type: &str,
    ) -> Result<EncryptedEnvelope, CryptoError> {
        let document = SummaryDocument {
            summary: summary.clone(),
            encrypted_at: Utc::now(),
            version: ENVELOPE_VERSION.to_string(),
            data_type: data_type.to_string(),
        };
        let plaintext = serde_json::to_vec(&document)
            .map_err(|e| CryptoError::EncryptionFailed(format!("serialize document: {e}")))?;

        let key = self.keys.get_encryption_key().await?;
        let cipher = Aes256Gcm::new_from_slice(key.material())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        super::fill_random(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| CryptoError::EncryptionFailed("AEAD seal failed".to_string()))?;

        Ok(EncryptedEnvelope {
            encrypted_data: Base64::encode_string(&ciphertext),
            nonce: Base64::encode_string(&nonce),
            algorithm: ALGORITHM.to_string(),
            data_hash: hex::encode(Sha256::digest(&plaintext)),
            encryption_metadata: EncryptionMetadata {
                encrypted_at: document.encrypted_at,
                version: document.version.clone(),
                data_type: document.data_type.clone(),
            },
        })
    }

    /// Decrypt an envelope and verify its integrity.
    ///
    /// A failed GCM tag means tampering or a wrong/rotated key and surfaces
    /// as [`CryptoError::AuthenticationFailed`]. When `expected_hash` is
    /// given the plaintext digest is recomputed and compared as a second,
    /// key-independent check.
    pub async fn decrypt(
        &self,
        envelope: &EncryptedEnvelope,
        expected_hash: Option<&str>,
    ) -> Result<SummaryDocument, CryptoError> {
        let ciphertext = Base64::decode_vec(&envelope.encrypted_data)
            .map_err(|_| CryptoError::InvalidEnvelope("ciphertext is not valid base64".into()))?;
        let nonce = Base64::decode_vec(&envelope.nonce)
            .map_err(|_| CryptoError::InvalidEnvelope("nonce is not valid base64".into()))?;
        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidEnvelope(format!(
                "nonce is {} bytes, expected {NONCE_LEN}",
                nonce.len()
            )));
        }

        let key = self.keys.get_encryption_key().await?;
        let cipher = Aes256Gcm::new_from_slice(key.material())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        if let Some(expected) = expected_hash {
            let actual = hex::encode(Sha256::digest(&plaintext));
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(CryptoError::IntegrityMismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        serde_json::from_slice(&plaintext).map_err(|e| {
            CryptoError::InvalidEnvelope(format!("decrypted payload is not valid JSON: {e}"))
        })
    }
}
