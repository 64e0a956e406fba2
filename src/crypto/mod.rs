// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

//! Envelope encryption for daily summary payloads.
//!
//! Two pieces: [`kms::KeyProvider`] resolves the symmetric key (remote KMS,
//! static configuration, or an ephemeral development key), and
//! [`envelope::EnvelopeCrypto`] performs the AES-256-GCM encrypt/decrypt with
//! an independent SHA-256 digest over the plaintext.

pub mod envelope;
pub mod kms;

pub use envelope::{
    CryptoError, EncryptedEnvelope, EncryptionMetadata, EnvelopeCrypto, SummaryDocument,
};
pub use kms::{
    DataKey, EncryptionKey, KeyError, KeyInfo, KeyProvider, KeySource, KeySpec, RotationInfo,
};

/// AES-256 key length in bytes.
pub const AES_KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Algorithm tag written into every envelope.
pub const ALGORITHM: &str = "AES-256-GCM";

/// Envelope format version.
pub const ENVELOPE_VERSION: &str = "1.0";

/// Fill a buffer with OS randomness.
pub(crate) fn fill_random(buf: &mut [u8]) {
    getrandom::getrandom(buf).expect("getrandom failed");
}
