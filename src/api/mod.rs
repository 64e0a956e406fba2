// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

use axum::{
    http::{header::AUTHORIZATION, HeaderMap},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    crypto::{KeyInfo, KeySource, RotationInfo},
    error::ApiError,
    models::{
        CreateProofRequest, DateMismatch, DecryptResponse, DecryptionGuide, DecryptionInfo,
        EncryptionInfo, GasPriceResponse, LatestBlockResponse, Pagination, ProofListResponse,
        ProofMetadata, ProofRecord, TransactionInfoResponse, VerificationResult,
        VerifyTransactionRequest, VerifyTransactionResponse,
    },
    state::AppState,
};

pub mod chain;
pub mod health;
pub mod keys;
pub mod proofs;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/proofs",
            post(proofs::create_proof).get(proofs::list_proofs),
        )
        .route("/proofs/decryption-guide", get(proofs::decryption_guide))
        .route("/proofs/{cid}", get(proofs::verify_proof))
        .route("/proofs/{cid}/decrypt", post(proofs::decrypt_proof))
        .route("/keys", get(keys::key_info))
        .route("/keys/rotate", post(keys::rotate_key))
        .route("/chain/transactions/{tx_hash}", get(chain::transaction_info))
        .route("/chain/verify-transaction", post(chain::verify_transaction))
        .route("/chain/gas-price", get(chain::gas_price))
        .route("/chain/latest-block", get(chain::latest_block))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CorsLayer::permissive()),
        )
}

/// Gate for privileged routes: a static bearer credential configured via
/// `ADMIN_API_TOKEN`. When unset, privileged routes refuse every request.
pub(crate) fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.settings.admin_api_token.as_deref() else {
        return Err(ApiError::forbidden("privileged operations are disabled"));
    };
    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if provided == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::forbidden("administrator credentials required"))
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        proofs::create_proof,
        proofs::list_proofs,
        proofs::verify_proof,
        proofs::decrypt_proof,
        proofs::decryption_guide,
        keys::key_info,
        keys::rotate_key,
        chain::transaction_info,
        chain::verify_transaction,
        chain::gas_price,
        chain::latest_block,
        health::health
    ),
    components(
        schemas(
            CreateProofRequest,
            ProofRecord,
            ProofMetadata,
            ProofListResponse,
            Pagination,
            VerificationResult,
            EncryptionInfo,
            DateMismatch,
            DecryptResponse,
            DecryptionGuide,
            DecryptionInfo,
            KeyInfo,
            KeySource,
            RotationInfo,
            VerifyTransactionRequest,
            VerifyTransactionResponse,
            TransactionInfoResponse,
            GasPriceResponse,
            LatestBlockResponse
        )
    ),
    tags(
        (name = "Proofs", description = "Daily proof creation and verification"),
        (name = "Keys", description = "Encryption key management"),
        (name = "Chain", description = "Blockchain explorer reads"),
        (name = "Health", description = "Service health")
    )
)]
struct ApiDoc;
