// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Pinning-service credential probe result.
    pub store: String,
    /// Which tier currently backs encryption (kms, local, ephemeral).
    pub key_provider: String,
}

/// Health check endpoint handler.
///
/// Always returns 200; degradation is expressed in the body so load
/// balancers keep routing while operators see the failing component.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Component status report", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = if state.pinata.test_authentication().await {
        "ok"
    } else {
        "unavailable"
    };
    let key_info = state.keys.key_info().await;

    Json(HealthResponse {
        status: if store == "ok" { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            store: store.to_string(),
            key_provider: key_info.source.to_string(),
        },
    })
}
