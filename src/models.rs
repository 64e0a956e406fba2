// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

//! # API Data Models
//!
//! Request and response structures for the REST API, plus the proof-record
//! and verification types shared with the orchestrator. All types derive
//! `Serialize`/`Deserialize` and `ToSchema` for JSON handling and OpenAPI
//! documentation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::crypto::KeySource;
use crate::providers::explorer::TxVerification;
use crate::providers::pinata::PinningServiceInfo;

// =============================================================================
// Proof Records
// =============================================================================

/// A record of one pinned daily proof.
///
/// Created only after the upload succeeded, appended to the record index and
/// never mutated afterwards. The envelope bytes themselves live in the remote
/// store, referenced by `cid`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ProofRecord {
    /// Process-unique identifier, derived from the creation timestamp.
    pub id: String,
    /// Calendar date the proof covers.
    pub date: NaiveDate,
    /// Content identifier of the pinned document.
    pub cid: String,
    /// Gateway URL for retrieval.
    pub url: String,
    /// Whether the payload was encrypted before upload.
    pub encrypted: bool,
    /// Base64 nonce (encrypted proofs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Hex SHA-256 of the plaintext (encrypted proofs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_hash: Option<String>,
    /// Cipher identifier (encrypted proofs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// Pinned size in bytes as reported by the store.
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Which key-resolution tier produced the encryption key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_source: Option<KeySource>,
}

/// Metadata describing a proof, embedded in the uploaded document and
/// attached to the pin.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProofMetadata {
    pub name: String,
    pub description: String,
    pub date: NaiveDate,
    pub data_type: String,
    pub encrypted: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Verification
// =============================================================================

/// Envelope parameters echoed back by verification.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EncryptionInfo {
    pub algorithm: String,
    pub data_hash: String,
    pub encrypted_at: DateTime<Utc>,
}

/// Non-fatal annotation: the proof verified but covers a different date
/// than the caller expected.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DateMismatch {
    pub expected: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

/// Outcome of verifying a proof by content identifier.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerificationResult {
    pub cid: String,
    pub encrypted: bool,
    /// The AEAD tag (and digest, for encrypted proofs) checked out.
    pub data_verified: bool,
    /// Decrypted document (encrypted proofs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub decrypted_data: Option<Value>,
    /// Stored document (plaintext proofs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_info: Option<EncryptionInfo>,
    /// Date verification is independent of authenticity: a mismatch is
    /// reported, not failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_mismatch: Option<DateMismatch>,
}

// =============================================================================
// Decryption Guide
// =============================================================================

/// Encryption parameters needed to reproduce a decryption offline.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DecryptionInfo {
    pub algorithm: String,
    pub key_length_bits: usize,
    pub nonce_length_bits: usize,
    pub kms_enabled: bool,
    pub key_source: KeySource,
    pub decryption_steps: Vec<String>,
}

/// Everything a controlled environment needs to re-run the decrypt flow.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DecryptionGuide {
    pub service: String,
    pub version: String,
    pub encryption: DecryptionInfo,
    pub storage: PinningServiceInfo,
}

// =============================================================================
// Requests / Responses
// =============================================================================

fn default_encrypt() -> bool {
    true
}

/// Request to create a daily proof.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateProofRequest {
    /// The daily summary payload to prove.
    #[schema(value_type = Object)]
    pub daily_data: Value,
    /// Encrypt before upload (default true).
    #[serde(default = "default_encrypt")]
    pub encrypt: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListProofsQuery {
    /// Exact-match date filter (YYYY-MM-DD).
    pub date_filter: Option<NaiveDate>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Pagination {
    pub total_count: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProofListResponse {
    pub records: Vec<ProofRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct VerifyProofQuery {
    /// Expected proof date (YYYY-MM-DD); mismatches are annotated, not fatal.
    pub expected_date: Option<NaiveDate>,
}

/// Privileged decrypt response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DecryptResponse {
    pub cid: String,
    pub encrypted: bool,
    #[schema(value_type = Object)]
    pub decrypted_data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_info: Option<EncryptionInfo>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VerifyTransactionRequest {
    pub tx_hash: String,
    pub expected_cid: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerifyTransactionResponse {
    pub verification: TxVerification,
    pub explorer_url: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionInfoResponse {
    #[schema(value_type = Object)]
    pub transaction: Value,
    #[schema(value_type = Object)]
    pub receipt: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub block: Option<Value>,
    pub explorer_url: String,
    /// `success` or `failed`, from the receipt status.
    pub status: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GasPriceResponse {
    pub gas_price_wei: u64,
    pub gas_price_gwei: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LatestBlockResponse {
    pub block_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub block: Option<Value>,
    pub explorer_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_proof_request_defaults_to_encrypted() {
        let request: CreateProofRequest =
            serde_json::from_str(r#"{"daily_data": {"steps": 1}}"#).unwrap();
        assert!(request.encrypt);

        let request: CreateProofRequest =
            serde_json::from_str(r#"{"daily_data": {}, "encrypt": false}"#).unwrap();
        assert!(!request.encrypt);
    }

    #[test]
    fn plaintext_record_omits_envelope_fields() {
        let record = ProofRecord {
            id: "proof_1".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            cid: "bafy".into(),
            url: "https://gateway/ipfs/bafy".into(),
            encrypted: false,
            nonce: None,
            data_hash: None,
            algorithm: None,
            size_bytes: 10,
            created_at: Utc::now(),
            key_source: None,
        };
        let wire = serde_json::to_value(&record).unwrap();
        assert!(wire.get("nonce").is_none());
        assert!(wire.get("data_hash").is_none());
        assert!(wire.get("key_source").is_none());
    }
}
