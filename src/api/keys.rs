// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

use axum::{extract::State, http::HeaderMap, Json};
use tracing::warn;

use crate::{
    crypto::{KeyInfo, RotationInfo},
    error::ApiError,
    state::AppState,
};

use super::require_admin;

#[utoipa::path(
    get,
    path = "/v1/keys",
    tag = "Keys",
    responses((status = 200, body = KeyInfo))
)]
pub async fn key_info(State(state): State<AppState>) -> Json<KeyInfo> {
    Json(state.keys.key_info().await)
}

/// Rotate the encryption key. Affects future encryptions only: existing
/// envelopes stay encrypted under their original key until an operator
/// re-encrypts them.
#[utoipa::path(
    post,
    path = "/v1/keys/rotate",
    tag = "Keys",
    responses(
        (status = 200, body = RotationInfo),
        (status = 403, description = "Administrator credentials required"),
        (status = 502, description = "No key tier could produce a new key")
    )
)]
pub async fn rotate_key(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RotationInfo>, ApiError> {
    require_admin(&state, &headers)?;
    let rotation = state.keys.rotate_key().await?;
    warn!(key_id = %rotation.key_id, "encryption key rotated; existing envelopes keep their old key");
    Ok(Json(rotation))
}
