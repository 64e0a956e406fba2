// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

//! Transport-level error type and the mapping from domain errors.
//!
//! Lower layers raise specific error kinds; this module is the single place
//! where they become HTTP status codes. Unexpected failures are logged with
//! full context and surfaced as a generic message plus a correlation id, so
//! internals never leak to callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::crypto::{CryptoError, KeyError};
use crate::proof::ProofError;
use crate::providers::explorer::ExplorerError;
use crate::providers::pinata::PinningError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub correlation_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            correlation_id: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    /// Log the real failure and hand the caller a correlation id instead.
    pub fn internal(context: impl std::fmt::Display) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        error!(correlation_id = %correlation_id, "unexpected error: {context}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal server error".to_string(),
            correlation_id: Some(correlation_id),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            correlation_id: self.correlation_id,
        });
        (self.status, body).into_response()
    }
}

impl From<PinningError> for ApiError {
    fn from(err: PinningError) -> Self {
        match &err {
            PinningError::InvalidCid(_) => Self::bad_request(err.to_string()),
            PinningError::ContentNotFound(_) => Self::not_found(err.to_string()),
            PinningError::NotConfigured
            | PinningError::Unavailable { .. }
            | PinningError::RequestFailed(_)
            | PinningError::InvalidResponse(_) => Self::bad_gateway(err.to_string()),
        }
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        Self::bad_gateway(err.to_string())
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        match &err {
            CryptoError::AuthenticationFailed
            | CryptoError::IntegrityMismatch { .. }
            | CryptoError::InvalidEnvelope(_) => Self::bad_request(err.to_string()),
            CryptoError::Key(_) => Self::bad_gateway(err.to_string()),
            CryptoError::EncryptionFailed(_) => Self::internal(&err),
        }
    }
}

impl From<ProofError> for ApiError {
    fn from(err: ProofError) -> Self {
        match err {
            ProofError::InvalidInput(message) => Self::bad_request(message),
            ProofError::Encrypt(inner) | ProofError::Decrypt(inner) => inner.into(),
            ProofError::Upload(inner) | ProofError::Retrieval(inner) => inner.into(),
            ProofError::Unexpected(context) => Self::internal(context),
        }
    }
}

impl From<ExplorerError> for ApiError {
    fn from(err: ExplorerError) -> Self {
        match &err {
            ExplorerError::InvalidTxHash(_) => Self::bad_request(err.to_string()),
            ExplorerError::TxNotFound(_) => Self::not_found(err.to_string()),
            ExplorerError::Api(_)
            | ExplorerError::Unavailable { .. }
            | ExplorerError::InvalidResponse(_) => Self::bad_gateway(err.to_string()),
        }
    }
}
