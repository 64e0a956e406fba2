// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

//! Daily-proof orchestration.
//!
//! Composes the key provider, envelope engine and pinning client into the
//! create/verify pipeline:
//!
//! ```text
//! create: payload -> [encrypt] -> upload -> record appended
//! verify: cid -> fetch -> [decrypt + digest check] -> payload
//! ```
//!
//! A record is appended only after the upload succeeded; any earlier failure
//! aborts the pipeline and leaves the index untouched. Each stage failure
//! maps to its own error variant so the API layer can tell a bad request
//! from an unavailable upstream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::crypto::{
    CryptoError, EncryptedEnvelope, EnvelopeCrypto, AES_KEY_LEN, ALGORITHM, NONCE_LEN,
};
use crate::models::{
    DateMismatch, DecryptionGuide, DecryptionInfo, EncryptionInfo, ProofMetadata, ProofRecord,
    VerificationResult,
};
use crate::providers::pinata::{PinMetadata, PinataClient, PinningError};
use crate::store::ProofStore;

/// Payload type written into every envelope and pin.
const DATA_TYPE: &str = "daily_summary";

#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("encryption stage failed: {0}")]
    Encrypt(#[source] CryptoError),

    #[error("decryption stage failed: {0}")]
    Decrypt(#[source] CryptoError),

    #[error("upload stage failed: {0}")]
    Upload(#[source] PinningError),

    #[error("retrieval stage failed: {0}")]
    Retrieval(#[source] PinningError),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

/// What a stored document turned out to be once parsed.
#[derive(Debug)]
enum StoredDocument {
    Encrypted(EncryptedEnvelope),
    Plain(Value),
}

pub struct ProofService {
    pinata: Arc<PinataClient>,
    crypto: Arc<EnvelopeCrypto>,
    store: Arc<dyn ProofStore>,
    /// Tie-breaker appended to timestamp-derived record ids so concurrent
    /// creations within one millisecond stay unique.
    seq: AtomicU64,
}

impl ProofService {
    pub fn new(
        pinata: Arc<PinataClient>,
        crypto: Arc<EnvelopeCrypto>,
        store: Arc<dyn ProofStore>,
    ) -> Self {
        Self {
            pinata,
            crypto,
            store,
            seq: AtomicU64::new(0),
        }
    }

    /// Create a daily proof: optionally encrypt the payload, pin it, and
    /// append a record. The record exists iff the upload succeeded.
    pub async fn create_daily_proof(
        &self,
        daily_data: Value,
        encrypt: bool,
    ) -> Result<ProofRecord, ProofError> {
        let object = daily_data
            .as_object()
            .ok_or_else(|| ProofError::InvalidInput("daily_data must be a JSON object".into()))?;
        if object.is_empty() {
            return Err(ProofError::InvalidInput("daily_data cannot be empty".into()));
        }

        let now = Utc::now();
        let date = now.date_naive();
        let metadata = ProofMetadata {
            name: format!("Daily Summary - {date}"),
            description: format!(
                "{} daily data summary for {date}",
                if encrypt { "Encrypted" } else { "Plaintext" }
            ),
            date,
            data_type: DATA_TYPE.to_string(),
            encrypted: encrypt,
            created_at: now,
        };
        let pin_metadata = PinMetadata {
            name: metadata.name.clone(),
            keyvalues: Some(serde_json::json!({
                "date": date,
                "data_type": DATA_TYPE,
                "encrypted": encrypt,
            })),
        };

        let (document, envelope, key_source) = if encrypt {
            let envelope = self
                .crypto
                .encrypt(&daily_data, DATA_TYPE)
                .await
                .map_err(ProofError::Encrypt)?;
            let key = self
                .crypto
                .key_provider()
                .get_encryption_key()
                .await
                .map_err(|e| ProofError::Encrypt(e.into()))?;

            let mut document = serde_json::to_value(&envelope)
                .map_err(|e| ProofError::Unexpected(format!("serialize envelope: {e}")))?;
            document["kind"] = Value::String("encrypted".into());
            document["proof_metadata"] = serde_json::to_value(&metadata)
                .map_err(|e| ProofError::Unexpected(format!("serialize metadata: {e}")))?;
            (document, Some(envelope), Some(key.source))
        } else {
            let document = serde_json::json!({
                "kind": "plain",
                "daily_data": daily_data,
                "proof_metadata": metadata,
            });
            (document, None, None)
        };

        let pinned = self
            .pinata
            .upload_json(&document, &pin_metadata)
            .await
            .map_err(ProofError::Upload)?;

        let record = ProofRecord {
            id: self.next_record_id(),
            date,
            cid: pinned.cid,
            url: pinned.url,
            encrypted: encrypt,
            nonce: envelope.as_ref().map(|e| e.nonce.clone()),
            data_hash: envelope.as_ref().map(|e| e.data_hash.clone()),
            algorithm: envelope.as_ref().map(|e| e.algorithm.clone()),
            size_bytes: pinned.size_bytes,
            created_at: now,
            key_source,
        };
        self.store.append(record.clone());

        info!(
            proof_id = %record.id,
            cid = %record.cid,
            encrypted = record.encrypted,
            "daily proof created"
        );
        Ok(record)
    }

    /// Verify a proof by content identifier: fetch, classify, and for
    /// encrypted documents decrypt and digest-check. A date mismatch against
    /// `expected_date` is annotated on the result, never fatal.
    pub async fn verify_daily_proof(
        &self,
        cid: &str,
        expected_date: Option<NaiveDate>,
    ) -> Result<VerificationResult, ProofError> {
        let bytes = self
            .pinata
            .fetch_by_cid(cid)
            .await
            .map_err(ProofError::Retrieval)?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
            ProofError::InvalidInput(format!("stored object is not valid JSON: {e}"))
        })?;

        match classify_document(value)? {
            StoredDocument::Encrypted(envelope) => {
                let document = self
                    .crypto
                    .decrypt(&envelope, Some(&envelope.data_hash))
                    .await
                    .map_err(ProofError::Decrypt)?;

                let actual_date = document
                    .summary
                    .get("date")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let date_mismatch = check_date(expected_date, actual_date);

                let decrypted = serde_json::to_value(&document)
                    .map_err(|e| ProofError::Unexpected(format!("serialize document: {e}")))?;
                Ok(VerificationResult {
                    cid: cid.to_string(),
                    encrypted: true,
                    data_verified: true,
                    decrypted_data: Some(decrypted),
                    data: None,
                    encryption_info: Some(EncryptionInfo {
                        algorithm: envelope.algorithm.clone(),
                        data_hash: envelope.data_hash.clone(),
                        encrypted_at: envelope.encryption_metadata.encrypted_at,
                    }),
                    date_mismatch,
                })
            }
            StoredDocument::Plain(value) => {
                let actual_date = embedded_date(&value);
                let date_mismatch = check_date(expected_date, actual_date);
                Ok(VerificationResult {
                    cid: cid.to_string(),
                    encrypted: false,
                    data_verified: true,
                    decrypted_data: None,
                    data: Some(value),
                    encryption_info: None,
                    date_mismatch,
                })
            }
        }
    }

    /// Records in insertion order, optionally filtered by exact date.
    pub fn list_records(&self, date_filter: Option<NaiveDate>) -> Vec<ProofRecord> {
        match date_filter {
            Some(date) => self.store.list_by_date(date),
            None => self.store.list_all(),
        }
    }

    /// Machine-readable decryption procedure for controlled-environment
    /// reproduction.
    pub async fn decryption_guide(&self) -> DecryptionGuide {
        let key_info = self.crypto.key_provider().key_info().await;
        DecryptionGuide {
            service: "Proof Gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            encryption: DecryptionInfo {
                algorithm: ALGORITHM.to_string(),
                key_length_bits: AES_KEY_LEN * 8,
                nonce_length_bits: NONCE_LEN * 8,
                kms_enabled: key_info.kms_enabled,
                key_source: key_info.source,
                decryption_steps: vec![
                    "Obtain the encryption key from the KMS or secure storage".to_string(),
                    "Base64-decode the encrypted_data and nonce fields".to_string(),
                    "Initialize AES-256-GCM with the key".to_string(),
                    "Decrypt using the nonce and ciphertext".to_string(),
                    "Verify the plaintext against the hex SHA-256 data_hash".to_string(),
                    "Parse the JSON document to retrieve the original summary".to_string(),
                ],
            },
            storage: self.pinata.service_info(),
        }
    }

    fn next_record_id(&self) -> String {
        format!(
            "proof_{}_{}",
            Utc::now().timestamp_millis(),
            self.seq.fetch_add(1, Ordering::Relaxed)
        )
    }
}

/// Decide whether a stored document is an envelope or a plaintext proof.
///
/// New documents carry an explicit `kind` tag written at upload time. Legacy
/// documents are classified by the presence of `encrypted_data` + `nonce`;
/// that heuristic stays read-side only, so a tagged plaintext payload that
/// happens to contain those field names is never misread.
fn classify_document(value: Value) -> Result<StoredDocument, ProofError> {
    let kind = value.get("kind").and_then(Value::as_str).map(str::to_string);
    match kind.as_deref() {
        Some("encrypted") => {
            let envelope: EncryptedEnvelope = serde_json::from_value(value).map_err(|e| {
                ProofError::InvalidInput(format!("malformed encrypted document: {e}"))
            })?;
            Ok(StoredDocument::Encrypted(envelope))
        }
        Some("plain") => Ok(StoredDocument::Plain(value)),
        Some(other) => Err(ProofError::InvalidInput(format!(
            "unknown document kind `{other}`"
        ))),
        None => {
            if value.get("encrypted_data").is_some() && value.get("nonce").is_some() {
                warn!("stored document has no kind tag, classified as encrypted by field presence");
                let envelope: EncryptedEnvelope = serde_json::from_value(value).map_err(|e| {
                    ProofError::InvalidInput(format!("malformed encrypted document: {e}"))
                })?;
                Ok(StoredDocument::Encrypted(envelope))
            } else {
                Ok(StoredDocument::Plain(value))
            }
        }
    }
}

/// Find the date a plaintext document claims to cover.
fn embedded_date(value: &Value) -> Option<String> {
    value
        .pointer("/daily_data/date")
        .or_else(|| value.get("date"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn check_date(expected: Option<NaiveDate>, actual: Option<String>) -> Option<DateMismatch> {
    let expected = expected?;
    let matches = actual.as_deref() == Some(expected.to_string().as_str());
    if matches {
        None
    } else {
        Some(DateMismatch {
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use base64ct::{Base64, Encoding};
    use serde_json::json;
    use sha2::{Digest, Sha256};

    use crate::config::PinataSettings;
    use crate::crypto::KeyProvider;
    use crate::store::InMemoryProofStore;

    /// In-memory stand-in for the pinning service: content-addressed by
    /// SHA-256 so identical content yields the identical identifier.
    #[derive(Default, Clone)]
    struct FakePinningBackend {
        blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl FakePinningBackend {
        fn cid_for(bytes: &[u8]) -> String {
            format!("bafkrei{}", &hex::encode(Sha256::digest(bytes))[..51])
        }

        fn insert_raw(&self, bytes: Vec<u8>) -> String {
            let cid = Self::cid_for(&bytes);
            self.blobs.lock().unwrap().insert(cid.clone(), bytes);
            cid
        }

        fn router(self) -> Router {
            Router::new()
                .route(
                    "/pinning/pinJSONToIPFS",
                    post(
                        |State(backend): State<FakePinningBackend>,
                         Json(body): Json<Value>| async move {
                            let content =
                                serde_json::to_vec(body.get("pinataContent").unwrap()).unwrap();
                            let size = content.len();
                            let cid = backend.insert_raw(content);
                            Json(json!({"IpfsHash": cid, "PinSize": size}))
                        },
                    ),
                )
                .route(
                    "/ipfs/{cid}",
                    get(
                        |State(backend): State<FakePinningBackend>,
                         Path(cid): Path<String>| async move {
                            match backend.blobs.lock().unwrap().get(&cid) {
                                Some(bytes) => Ok(bytes.clone()),
                                None => Err(StatusCode::NOT_FOUND),
                            }
                        },
                    ),
                )
                .with_state(self)
        }
    }

    async fn service_with_backend(backend: FakePinningBackend) -> (ProofService, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, backend.router()).await.unwrap();
        });
        let base = format!("http://{addr}");

        let pinata = Arc::new(
            PinataClient::from_settings(PinataSettings {
                jwt: Some("test-jwt".to_string()),
                api_key: None,
                secret_key: None,
                api_base_url: base.clone(),
                gateway_url: base.clone(),
                max_retries: 1,
                retry_delay: Duration::from_millis(1),
                timeout: Duration::from_secs(2),
            })
            .unwrap(),
        );

        let mut key = [0u8; 32];
        crate::crypto::fill_random(&mut key);
        let keys = Arc::new(KeyProvider::for_tests(Some(Base64::encode_string(&key))));
        let crypto = Arc::new(EnvelopeCrypto::new(keys));
        let store = Arc::new(InMemoryProofStore::new());

        (ProofService::new(pinata, crypto, store), base)
    }

    async fn service() -> ProofService {
        service_with_backend(FakePinningBackend::default()).await.0
    }

    #[tokio::test]
    async fn unencrypted_proof_round_trips_through_the_store() {
        let backend = FakePinningBackend::default();
        let (service, _) = service_with_backend(backend.clone()).await;
        let payload = json!({"steps": 5000, "date": "2024-01-01"});

        let record = service
            .create_daily_proof(payload.clone(), false)
            .await
            .unwrap();
        assert!(!record.encrypted);
        assert!(record.nonce.is_none());
        assert!(record.key_source.is_none());

        let stored = backend.blobs.lock().unwrap().get(&record.cid).cloned().unwrap();
        let stored: Value = serde_json::from_slice(&stored).unwrap();
        assert_eq!(stored["kind"], "plain");
        assert_eq!(stored["daily_data"], payload);
    }

    #[tokio::test]
    async fn encrypted_proof_verifies_and_decrypts() {
        let service = service().await;
        let payload = json!({"steps": 5000, "date": "2024-01-01"});

        let record = service
            .create_daily_proof(payload.clone(), true)
            .await
            .unwrap();
        assert!(record.encrypted);
        assert!(record.nonce.is_some());
        assert_eq!(record.algorithm.as_deref(), Some(ALGORITHM));

        let result = service.verify_daily_proof(&record.cid, None).await.unwrap();
        assert!(result.encrypted);
        assert!(result.data_verified);
        assert!(result.date_mismatch.is_none());
        let decrypted = result.decrypted_data.unwrap();
        assert_eq!(decrypted["summary"], payload);
        assert_eq!(
            result.encryption_info.unwrap().data_hash,
            record.data_hash.unwrap()
        );
    }

    #[tokio::test]
    async fn expected_date_mismatch_is_annotated_not_fatal() {
        let service = service().await;
        let payload = json!({"steps": 5000, "date": "2024-01-01"});
        let record = service.create_daily_proof(payload, true).await.unwrap();

        let expected: NaiveDate = "2024-01-02".parse().unwrap();
        let result = service
            .verify_daily_proof(&record.cid, Some(expected))
            .await
            .unwrap();

        assert!(result.data_verified);
        let mismatch = result.date_mismatch.unwrap();
        assert_eq!(mismatch.expected, expected);
        assert_eq!(mismatch.actual.as_deref(), Some("2024-01-01"));
    }

    #[tokio::test]
    async fn matching_expected_date_is_not_annotated() {
        let service = service().await;
        let payload = json!({"steps": 5000, "date": "2024-01-01"});
        let record = service.create_daily_proof(payload, true).await.unwrap();

        let result = service
            .verify_daily_proof(&record.cid, Some("2024-01-01".parse().unwrap()))
            .await
            .unwrap();
        assert!(result.date_mismatch.is_none());
    }

    #[tokio::test]
    async fn empty_payload_is_invalid_input() {
        let service = service().await;
        let err = service
            .create_daily_proof(json!({}), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::InvalidInput(_)));

        let err = service
            .create_daily_proof(json!("not an object"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn failed_upload_appends_no_record() {
        // No backend listening: every upload attempt fails at the transport.
        let pinata = Arc::new(
            PinataClient::from_settings(PinataSettings {
                jwt: Some("test-jwt".to_string()),
                api_key: None,
                secret_key: None,
                api_base_url: "http://127.0.0.1:1".to_string(),
                gateway_url: "http://127.0.0.1:1".to_string(),
                max_retries: 1,
                retry_delay: Duration::from_millis(1),
                timeout: Duration::from_millis(200),
            })
            .unwrap(),
        );
        let keys = Arc::new(KeyProvider::for_tests(None));
        let service = ProofService::new(
            pinata,
            Arc::new(EnvelopeCrypto::new(keys)),
            Arc::new(InMemoryProofStore::new()),
        );

        let err = service
            .create_daily_proof(json!({"steps": 1}), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::Upload(_)));
        assert!(service.list_records(None).is_empty());
    }

    #[tokio::test]
    async fn legacy_untagged_envelope_still_verifies() {
        let backend = FakePinningBackend::default();
        let (service, _) = service_with_backend(backend.clone()).await;

        // Produce a valid envelope, then strip the kind tag the way an old
        // writer would have stored it.
        let record = service
            .create_daily_proof(json!({"steps": 7, "date": "2024-03-01"}), true)
            .await
            .unwrap();
        let bytes = backend.blobs.lock().unwrap().get(&record.cid).cloned().unwrap();
        let mut document: Value = serde_json::from_slice(&bytes).unwrap();
        document.as_object_mut().unwrap().remove("kind");
        let legacy_cid = backend.insert_raw(serde_json::to_vec(&document).unwrap());

        let result = service.verify_daily_proof(&legacy_cid, None).await.unwrap();
        assert!(result.encrypted);
        assert_eq!(result.decrypted_data.unwrap()["summary"]["steps"], 7);
    }

    #[tokio::test]
    async fn tagged_plain_document_with_envelope_like_fields_stays_plain() {
        let backend = FakePinningBackend::default();
        let (service, _) = service_with_backend(backend.clone()).await;

        // A plaintext payload that happens to carry the envelope field names
        // must not be misread as an envelope.
        let record = service
            .create_daily_proof(
                json!({"encrypted_data": "decoy", "nonce": "decoy", "date": "2024-01-01"}),
                false,
            )
            .await
            .unwrap();

        let result = service.verify_daily_proof(&record.cid, None).await.unwrap();
        assert!(!result.encrypted);
        assert_eq!(result.data.unwrap()["daily_data"]["nonce"], "decoy");
    }

    #[tokio::test]
    async fn tampered_stored_ciphertext_fails_decryption() {
        let backend = FakePinningBackend::default();
        let (service, _) = service_with_backend(backend.clone()).await;
        let record = service
            .create_daily_proof(json!({"steps": 1}), true)
            .await
            .unwrap();

        let bytes = backend.blobs.lock().unwrap().get(&record.cid).cloned().unwrap();
        let mut document: Value = serde_json::from_slice(&bytes).unwrap();
        let mut ciphertext =
            Base64::decode_vec(document["encrypted_data"].as_str().unwrap()).unwrap();
        ciphertext[0] ^= 0x01;
        document["encrypted_data"] = Value::String(Base64::encode_string(&ciphertext));
        let tampered_cid = backend.insert_raw(serde_json::to_vec(&document).unwrap());

        let err = service
            .verify_daily_proof(&tampered_cid, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProofError::Decrypt(CryptoError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn missing_cid_is_a_retrieval_failure() {
        let service = service().await;
        let err = service
            .verify_daily_proof(
                "bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy",
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProofError::Retrieval(PinningError::ContentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn record_ids_are_unique_and_listing_is_ordered() {
        let service = service().await;
        let mut ids = Vec::new();
        for i in 0..5 {
            let record = service
                .create_daily_proof(json!({"steps": i, "value": i}), false)
                .await
                .unwrap();
            ids.push(record.id);
        }

        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), 5);

        let listed: Vec<_> = service
            .list_records(None)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn list_records_filters_by_date() {
        let service = service().await;
        service
            .create_daily_proof(json!({"steps": 1}), false)
            .await
            .unwrap();

        let today = Utc::now().date_naive();
        assert_eq!(service.list_records(Some(today)).len(), 1);
        let other: NaiveDate = "1999-01-01".parse().unwrap();
        assert!(service.list_records(Some(other)).is_empty());
    }

    #[tokio::test]
    async fn decryption_guide_describes_the_cipher() {
        let service = service().await;
        let guide = service.decryption_guide().await;
        assert_eq!(guide.encryption.algorithm, ALGORITHM);
        assert_eq!(guide.encryption.key_length_bits, 256);
        assert_eq!(guide.encryption.nonce_length_bits, 96);
        assert!(!guide.encryption.decryption_steps.is_empty());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = classify_document(json!({"kind": "mystery"})).unwrap_err();
        assert!(matches!(err, ProofError::InvalidInput(_)));
    }
}
