// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde_json::Value;

use crate::{
    error::ApiError,
    models::{
        GasPriceResponse, LatestBlockResponse, TransactionInfoResponse, VerifyTransactionRequest,
        VerifyTransactionResponse,
    },
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/v1/chain/transactions/{tx_hash}",
    params(("tx_hash" = String, Path, description = "Transaction hash (0x-prefixed)")),
    tag = "Chain",
    responses(
        (status = 200, body = TransactionInfoResponse),
        (status = 400, description = "Malformed transaction hash"),
        (status = 404, description = "Transaction not found")
    )
)]
pub async fn transaction_info(
    Path(tx_hash): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TransactionInfoResponse>, ApiError> {
    let transaction = state.explorer.transaction(&tx_hash).await?;
    let receipt = state.explorer.transaction_receipt(&tx_hash).await?;

    let block = match transaction
        .get("blockNumber")
        .and_then(Value::as_str)
        .and_then(|raw| u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok())
    {
        Some(number) => state.explorer.block_by_number(number).await.ok(),
        None => None,
    };

    let status = if receipt.get("status").and_then(Value::as_str) == Some("0x1") {
        "success"
    } else {
        "failed"
    };

    Ok(Json(TransactionInfoResponse {
        explorer_url: state.explorer.tx_url(&tx_hash),
        transaction,
        receipt,
        block,
        status: status.to_string(),
    }))
}

/// Check whether a transaction anchors a proof's content identifier.
#[utoipa::path(
    post,
    path = "/v1/chain/verify-transaction",
    request_body = VerifyTransactionRequest,
    tag = "Chain",
    responses(
        (status = 200, body = VerifyTransactionResponse),
        (status = 400, description = "Malformed transaction hash")
    )
)]
pub async fn verify_transaction(
    State(state): State<AppState>,
    Json(request): Json<VerifyTransactionRequest>,
) -> Result<Json<VerifyTransactionResponse>, ApiError> {
    let verification = state
        .explorer
        .verify_transaction(&request.tx_hash, request.expected_cid.as_deref())
        .await?;

    Ok(Json(VerifyTransactionResponse {
        explorer_url: state.explorer.tx_url(&request.tx_hash),
        verification,
        timestamp: Utc::now(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/chain/gas-price",
    tag = "Chain",
    responses((status = 200, body = GasPriceResponse))
)]
pub async fn gas_price(State(state): State<AppState>) -> Result<Json<GasPriceResponse>, ApiError> {
    let wei = state.explorer.gas_price().await?;
    Ok(Json(GasPriceResponse {
        gas_price_wei: wei,
        gas_price_gwei: wei as f64 / 1e9,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/chain/latest-block",
    tag = "Chain",
    responses((status = 200, body = LatestBlockResponse))
)]
pub async fn latest_block(
    State(state): State<AppState>,
) -> Result<Json<LatestBlockResponse>, ApiError> {
    let number = state.explorer.latest_block_number().await?;
    let block = state.explorer.block_by_number(number).await.ok();
    Ok(Json(LatestBlockResponse {
        block_number: number,
        block,
        explorer_url: state.explorer.block_url(number),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testutil::test_state;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn gas_price_converts_units() {
        let state = test_state().await;
        // Fake upstream reports 0x10 wei for every proxy read.
        let Json(response) = gas_price(State(state)).await.unwrap();
        assert_eq!(response.gas_price_wei, 16);
        assert!((response.gas_price_gwei - 16e-9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn malformed_tx_hash_is_rejected() {
        let state = test_state().await;
        let err = transaction_info(Path("nope".to_string()), State(state))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
