// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

//! Key resolution and data-key management.
//!
//! The provider resolves the symmetric encryption key through three tiers,
//! in order:
//!
//! 1. a remote key-management service, when `KMS_ENABLED` is set;
//! 2. a statically configured base64 key (`AES_ENCRYPTION_KEY`);
//! 3. a freshly generated ephemeral key.
//!
//! Falling through a tier is never fatal, but each fallback weakens the
//! operational guarantees, so every fallback is logged at `warn` and the
//! winning tier is reported in key info and on every proof record. An
//! ephemeral key in particular means encrypted data is unrecoverable after a
//! restart.

use std::sync::{Arc, Mutex};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use utoipa::ToSchema;
use zeroize::Zeroizing;

use super::{AES_KEY_LEN, NONCE_LEN};
use crate::config::KeySettings;

/// Where a resolved key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    Kms,
    Local,
    Ephemeral,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Kms => write!(f, "kms"),
            KeySource::Local => write!(f, "local"),
            KeySource::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

/// Requested data-key size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    Aes256,
    Aes128,
}

impl KeySpec {
    pub fn byte_len(self) -> usize {
        match self {
            KeySpec::Aes256 => 32,
            KeySpec::Aes128 => 16,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            KeySpec::Aes256 => "AES_256",
            KeySpec::Aes128 => "AES_128",
        }
    }
}

/// A resolved symmetric encryption key. Key material is zeroized on drop and
/// never serialized.
pub struct EncryptionKey {
    bytes: Zeroizing<[u8; AES_KEY_LEN]>,
    pub source: KeySource,
}

impl EncryptionKey {
    pub fn material(&self) -> &[u8] {
        &self.bytes[..]
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// A generated data key: plaintext material plus the wrapped form to persist.
pub struct DataKey {
    pub plaintext: Zeroizing<Vec<u8>>,
    pub wrapped: Vec<u8>,
    pub key_id: String,
    pub source: KeySource,
}

/// Result of a key rotation, safe to serialize: key material is base64 so an
/// operator can reapply it offline.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RotationInfo {
    pub key_id: String,
    pub source: KeySource,
    pub plaintext_key_b64: String,
    pub wrapped_key_b64: String,
    pub rotated_at: DateTime<Utc>,
}

/// Non-secret key-management introspection for health checks.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KeyInfo {
    pub kms_enabled: bool,
    pub source: KeySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("encryption key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("remote KMS request failed: {0}")]
    Kms(String),

    #[error("key material malformed: {0}")]
    InvalidKeyMaterial(String),
}

#[derive(Serialize)]
struct GenerateDataKeyRequest<'a> {
    key_spec: &'a str,
}

#[derive(Deserialize)]
struct GenerateDataKeyResponse {
    plaintext_key: String,
    wrapped_key: String,
}

#[derive(Serialize)]
struct UnwrapDataKeyRequest<'a> {
    wrapped_key: &'a str,
}

#[derive(Deserialize)]
struct UnwrapDataKeyResponse {
    plaintext_key: String,
}

/// Resolves and caches the process-wide encryption key and generates,
/// wraps and unwraps data keys.
pub struct KeyProvider {
    settings: KeySettings,
    http: reqwest::Client,
    /// Currently resolved key. Rotation swaps this; in-flight operations keep
    /// the `Arc` they captured at start.
    current: RwLock<Option<Arc<EncryptionKey>>>,
    /// Cached local master key. An ephemeral master is held for process
    /// lifetime so locally wrapped keys can still be unwrapped.
    master: Mutex<Option<Zeroizing<[u8; AES_KEY_LEN]>>>,
}

impl KeyProvider {
    pub fn new(settings: KeySettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_default();
        Self {
            settings,
            http,
            current: RwLock::new(None),
            master: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub fn for_tests(static_key_b64: Option<String>) -> Self {
        Self::new(KeySettings {
            kms_enabled: false,
            kms_endpoint: None,
            kms_key_id: None,
            kms_api_token: None,
            kms_region: "us-east-1".to_string(),
            static_key_b64,
            local_master_key_b64: None,
            timeout: std::time::Duration::from_secs(5),
        })
    }

    /// Resolve the current encryption key, caching the result.
    pub async fn get_encryption_key(&self) -> Result<Arc<EncryptionKey>, KeyError> {
        if let Some(key) = self.current.read().await.clone() {
            return Ok(key);
        }

        let key = Arc::new(self.resolve_key().await?);
        let mut slot = self.current.write().await;
        // Another caller may have resolved concurrently; first writer wins so
        // all callers converge on one key.
        if let Some(existing) = slot.clone() {
            return Ok(existing);
        }
        *slot = Some(key.clone());
        Ok(key)
    }

    async fn resolve_key(&self) -> Result<EncryptionKey, KeyError> {
        if self.settings.kms_enabled {
            match self.remote_generate_data_key(None, KeySpec::Aes256).await {
                Ok(data_key) => {
                    info!(key_id = %data_key.key_id, "resolved encryption key via remote KMS");
                    return encryption_key_from_bytes(&data_key.plaintext, KeySource::Kms);
                }
                Err(e) => {
                    warn!(error = %e, "remote KMS unreachable, falling back to local key resolution");
                }
            }
        }

        if let Some(b64) = &self.settings.static_key_b64 {
            match decode_fixed_key(b64) {
                Ok(bytes) => {
                    return Ok(EncryptionKey {
                        bytes,
                        source: KeySource::Local,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "configured AES_ENCRYPTION_KEY is unusable, falling back");
                }
            }
        }

        warn!("using freshly generated ephemeral encryption key; NOT SUITABLE FOR PRODUCTION");
        let mut bytes = Zeroizing::new([0u8; AES_KEY_LEN]);
        super::fill_random(&mut bytes[..]);
        Ok(EncryptionKey {
            bytes,
            source: KeySource::Ephemeral,
        })
    }

    /// Generate a data key: remote KMS when enabled, otherwise a locally
    /// generated key wrapped under the local master key.
    pub async fn generate_data_key(
        &self,
        key_id: Option<&str>,
        key_spec: KeySpec,
    ) -> Result<DataKey, KeyError> {
        if self.settings.kms_enabled {
            match self.remote_generate_data_key(key_id, key_spec).await {
                Ok(data_key) => return Ok(data_key),
                Err(e) => {
                    warn!(error = %e, "remote KMS data-key generation failed, generating locally");
                }
            }
        }
        self.local_generate_data_key(key_spec)
    }

    /// Unwrap a previously wrapped data key.
    pub async fn unwrap_data_key(
        &self,
        wrapped: &[u8],
        key_id: Option<&str>,
    ) -> Result<Zeroizing<Vec<u8>>, KeyError> {
        if self.settings.kms_enabled {
            match self.remote_unwrap_data_key(wrapped, key_id).await {
                Ok(plaintext) => return Ok(plaintext),
                Err(e) => {
                    warn!(error = %e, "remote KMS unwrap failed, trying local master key");
                }
            }
        }
        self.local_unwrap_data_key(wrapped)
    }

    /// Generate a new data key and make it current for future encryptions.
    ///
    /// Existing envelopes are NOT re-encrypted; they keep decrypting under
    /// whatever key produced them until an operator re-encrypts them.
    pub async fn rotate_key(&self) -> Result<RotationInfo, KeyError> {
        info!("starting key rotation");
        let data_key = self.generate_data_key(None, KeySpec::Aes256).await?;
        let key = encryption_key_from_bytes(&data_key.plaintext, data_key.source)?;
        *self.current.write().await = Some(Arc::new(key));

        let rotation = RotationInfo {
            key_id: data_key.key_id.clone(),
            source: data_key.source,
            plaintext_key_b64: Base64::encode_string(&data_key.plaintext),
            wrapped_key_b64: Base64::encode_string(&data_key.wrapped),
            rotated_at: Utc::now(),
        };
        info!(key_id = %rotation.key_id, source = %rotation.source, "key rotation completed");
        Ok(rotation)
    }

    /// Non-secret introspection: which tier currently backs encryption.
    pub async fn key_info(&self) -> KeyInfo {
        let source = match self.current.read().await.as_ref() {
            Some(key) => key.source,
            // Not resolved yet: report the tier that would win.
            None if self.settings.kms_enabled => KeySource::Kms,
            None if self.settings.static_key_b64.is_some() => KeySource::Local,
            None => KeySource::Ephemeral,
        };
        KeyInfo {
            kms_enabled: self.settings.kms_enabled,
            source,
            region: self
                .settings
                .kms_enabled
                .then(|| self.settings.kms_region.clone()),
        }
    }

    // ========== Remote KMS tier ==========

    fn kms_url(&self, key_id: Option<&str>, action: &str) -> Result<String, KeyError> {
        let endpoint = self
            .settings
            .kms_endpoint
            .as_deref()
            .ok_or_else(|| KeyError::Kms("KMS_ENDPOINT not configured".to_string()))?;
        let key_id = key_id
            .or(self.settings.kms_key_id.as_deref())
            .ok_or_else(|| KeyError::Kms("KMS_KEY_ID not configured".to_string()))?;
        Ok(format!(
            "{}/v1/keys/{key_id}/{action}",
            endpoint.trim_end_matches('/')
        ))
    }

    async fn remote_generate_data_key(
        &self,
        key_id: Option<&str>,
        key_spec: KeySpec,
    ) -> Result<DataKey, KeyError> {
        let url = self.kms_url(key_id, "datakey")?;
        let mut request = self.http.post(&url).json(&GenerateDataKeyRequest {
            key_spec: key_spec.as_str(),
        });
        if let Some(token) = &self.settings.kms_api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| KeyError::Kms(format!("POST {url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(KeyError::Kms(format!(
                "POST {url} returned {}",
                response.status()
            )));
        }

        let body: GenerateDataKeyResponse = response
            .json()
            .await
            .map_err(|e| KeyError::Kms(format!("invalid KMS response: {e}")))?;

        let plaintext = Zeroizing::new(
            Base64::decode_vec(&body.plaintext_key)
                .map_err(|_| KeyError::InvalidKeyMaterial("KMS plaintext key".to_string()))?,
        );
        let wrapped = Base64::decode_vec(&body.wrapped_key)
            .map_err(|_| KeyError::InvalidKeyMaterial("KMS wrapped key".to_string()))?;
        if plaintext.len() != key_spec.byte_len() {
            return Err(KeyError::InvalidKeyMaterial(format!(
                "KMS returned a {}-byte key, expected {}",
                plaintext.len(),
                key_spec.byte_len()
            )));
        }

        Ok(DataKey {
            plaintext,
            wrapped,
            key_id: key_id
                .or(self.settings.kms_key_id.as_deref())
                .unwrap_or_default()
                .to_string(),
            source: KeySource::Kms,
        })
    }

    async fn remote_unwrap_data_key(
        &self,
        wrapped: &[u8],
        key_id: Option<&str>,
    ) -> Result<Zeroizing<Vec<u8>>, KeyError> {
        let url = self.kms_url(key_id, "unwrap")?;
        let wrapped_b64 = Base64::encode_string(wrapped);
        let mut request = self.http.post(&url).json(&UnwrapDataKeyRequest {
            wrapped_key: &wrapped_b64,
        });
        if let Some(token) = &self.settings.kms_api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| KeyError::Kms(format!("POST {url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(KeyError::Kms(format!(
                "POST {url} returned {}",
                response.status()
            )));
        }

        let body: UnwrapDataKeyResponse = response
            .json()
            .await
            .map_err(|e| KeyError::Kms(format!("invalid KMS response: {e}")))?;
        Base64::decode_vec(&body.plaintext_key)
            .map(Zeroizing::new)
            .map_err(|_| KeyError::InvalidKeyMaterial("KMS unwrapped key".to_string()))
    }

    // ========== Local tier ==========

    fn local_generate_data_key(&self, key_spec: KeySpec) -> Result<DataKey, KeyError> {
        let mut plaintext = Zeroizing::new(vec![0u8; key_spec.byte_len()]);
        super::fill_random(&mut plaintext);

        let master = self.local_master_key()?;
        let cipher = Aes256Gcm::new_from_slice(&master[..])
            .map_err(|e| KeyError::InvalidKeyMaterial(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        super::fill_random(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| KeyError::KeyUnavailable("data-key wrapping failed".to_string()))?;

        // Wrapped blob layout: [nonce:12][ciphertext+tag]
        let mut wrapped = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        wrapped.extend_from_slice(&nonce);
        wrapped.extend_from_slice(&ciphertext);

        Ok(DataKey {
            plaintext,
            wrapped,
            key_id: "local-master-key".to_string(),
            source: KeySource::Local,
        })
    }

    fn local_unwrap_data_key(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeyError> {
        if wrapped.len() <= NONCE_LEN {
            return Err(KeyError::KeyUnavailable(
                "wrapped key blob too short".to_string(),
            ));
        }
        let (nonce, ciphertext) = wrapped.split_at(NONCE_LEN);

        let master = self.local_master_key()?;
        let cipher = Aes256Gcm::new_from_slice(&master[..])
            .map_err(|e| KeyError::InvalidKeyMaterial(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| {
                KeyError::KeyUnavailable(
                    "wrapped key did not unwrap under the local master key".to_string(),
                )
            })
    }

    /// Resolve the local master key, caching it for process lifetime.
    fn local_master_key(&self) -> Result<Zeroizing<[u8; AES_KEY_LEN]>, KeyError> {
        let mut cached = self
            .master
            .lock()
            .map_err(|_| KeyError::KeyUnavailable("master key lock poisoned".to_string()))?;
        if let Some(master) = cached.as_ref() {
            return Ok(master.clone());
        }

        let master = match &self.settings.local_master_key_b64 {
            Some(b64) => match decode_fixed_key(b64) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "configured LOCAL_MASTER_KEY is unusable, generating ephemeral master key");
                    ephemeral_master_key()
                }
            },
            None => {
                warn!("using ephemeral master key for data-key wrapping; NOT SUITABLE FOR PRODUCTION");
                ephemeral_master_key()
            }
        };

        *cached = Some(master.clone());
        Ok(master)
    }
}

fn ephemeral_master_key() -> Zeroizing<[u8; AES_KEY_LEN]> {
    let mut bytes = Zeroizing::new([0u8; AES_KEY_LEN]);
    super::fill_random(&mut bytes[..]);
    bytes
}

fn decode_fixed_key(b64: &str) -> Result<Zeroizing<[u8; AES_KEY_LEN]>, KeyError> {
    let raw = Base64::decode_vec(b64.trim())
        .map_err(|_| KeyError::InvalidKeyMaterial("key is not valid base64".to_string()))?;
    if raw.len() != AES_KEY_LEN {
        return Err(KeyError::InvalidKeyMaterial(format!(
            "key is {} bytes, expected {AES_KEY_LEN}",
            raw.len()
        )));
    }
    let mut bytes = Zeroizing::new([0u8; AES_KEY_LEN]);
    bytes.copy_from_slice(&raw);
    Ok(bytes)
}

fn encryption_key_from_bytes(raw: &[u8], source: KeySource) -> Result<EncryptionKey, KeyError> {
    if raw.len() != AES_KEY_LEN {
        return Err(KeyError::InvalidKeyMaterial(format!(
            "key is {} bytes, expected {AES_KEY_LEN}",
            raw.len()
        )));
    }
    let mut bytes = Zeroizing::new([0u8; AES_KEY_LEN]);
    bytes.copy_from_slice(raw);
    Ok(EncryptionKey { bytes, source })
}
