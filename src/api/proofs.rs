// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::Value;
use tracing::warn;

use crate::{
    error::ApiError,
    models::{
        CreateProofRequest, DecryptResponse, DecryptionGuide, ListProofsQuery, Pagination,
        ProofListResponse, ProofRecord, VerificationResult, VerifyProofQuery,
    },
    state::AppState,
};

use super::require_admin;

const DEFAULT_PAGE_LIMIT: usize = 50;

#[utoipa::path(
    post,
    path = "/v1/proofs",
    request_body = CreateProofRequest,
    tag = "Proofs",
    responses(
        (status = 201, body = ProofRecord),
        (status = 400, description = "Invalid payload"),
        (status = 502, description = "Pinning service or KMS unavailable")
    )
)]
pub async fn create_proof(
    State(state): State<AppState>,
    Json(request): Json<CreateProofRequest>,
) -> Result<(StatusCode, Json<ProofRecord>), ApiError> {
    let record = state
        .proofs
        .create_daily_proof(request.daily_data, request.encrypt)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    get,
    path = "/v1/proofs",
    params(ListProofsQuery),
    tag = "Proofs",
    responses((status = 200, body = ProofListResponse))
)]
pub async fn list_proofs(
    State(state): State<AppState>,
    Query(params): Query<ListProofsQuery>,
) -> Result<Json<ProofListResponse>, ApiError> {
    let records = state.proofs.list_records(params.date_filter);
    let total_count = records.len();
    let offset = params.offset.unwrap_or(0);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);

    let page: Vec<ProofRecord> = records.into_iter().skip(offset).take(limit).collect();
    Ok(Json(ProofListResponse {
        records: page,
        pagination: Pagination {
            total_count,
            limit,
            offset,
            has_more: offset + limit < total_count,
        },
    }))
}

#[utoipa::path(
    get,
    path = "/v1/proofs/{cid}",
    params(
        ("cid" = String, Path, description = "Content identifier of the stored proof"),
        VerifyProofQuery
    ),
    tag = "Proofs",
    responses(
        (status = 200, body = VerificationResult),
        (status = 400, description = "Verification failed"),
        (status = 404, description = "Content not found")
    )
)]
pub async fn verify_proof(
    Path(cid): Path<String>,
    Query(params): Query<VerifyProofQuery>,
    State(state): State<AppState>,
) -> Result<Json<VerificationResult>, ApiError> {
    let result = state
        .proofs
        .verify_daily_proof(&cid, params.expected_date)
        .await?;
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/v1/proofs/{cid}/decrypt",
    params(("cid" = String, Path, description = "Content identifier of the stored proof")),
    tag = "Proofs",
    responses(
        (status = 200, body = DecryptResponse),
        (status = 400, description = "Decryption failed"),
        (status = 403, description = "Administrator credentials required")
    )
)]
pub async fn decrypt_proof(
    Path(cid): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DecryptResponse>, ApiError> {
    require_admin(&state, &headers)?;

    let result = state.proofs.verify_daily_proof(&cid, None).await?;
    if result.encrypted {
        // Privileged decryptions are audit-relevant.
        warn!(cid = %cid, "privileged decryption performed");
        Ok(Json(DecryptResponse {
            cid,
            encrypted: true,
            decrypted_data: result.decrypted_data.unwrap_or(Value::Null),
            encryption_info: result.encryption_info,
        }))
    } else {
        Ok(Json(DecryptResponse {
            cid,
            encrypted: false,
            decrypted_data: result.data.unwrap_or(Value::Null),
            encryption_info: None,
        }))
    }
}

#[utoipa::path(
    get,
    path = "/v1/proofs/decryption-guide",
    tag = "Proofs",
    responses((status = 200, body = DecryptionGuide))
)]
pub async fn decryption_guide(State(state): State<AppState>) -> Json<DecryptionGuide> {
    Json(state.proofs.decryption_guide().await)
}
