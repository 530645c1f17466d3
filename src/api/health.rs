// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// User store availability.
    pub user_store: String,
    /// JWKS (signing keys) status.
    /// Only present when AUTH_JWKS_URL is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<String>,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

async fn check_user_store(state: &AppState) -> String {
    let store = Arc::clone(&state.users);
    match tokio::task::spawn_blocking(move || store.count()).await {
        Ok(Ok(_)) => "ok".to_string(),
        Ok(Err(e)) => {
            warn!(error = %e, "User store health check failed");
            "unavailable".to_string()
        }
        Err(e) => {
            warn!(error = %e, "User store health check task failed");
            "unavailable".to_string()
        }
    }
}

/// Check if signing keys can be obtained (JWKS key source only).
async fn check_jwks(state: &AppState) -> Option<String> {
    let jwks_manager = state.jwks()?;
    if jwks_manager.is_cached().await {
        return Some("ok".to_string());
    }
    match jwks_manager.refresh().await {
        Ok(_) => Some("ok".to_string()),
        Err(e) => {
            warn!(error = %e, "JWKS health check failed");
            Some("unavailable".to_string())
        }
    }
}

/// Health check endpoint handler.
///
/// Returns 200 if all checks pass, 503 if any check fails.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Service is unhealthy", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let user_store = check_user_store(&state).await;
    let jwks = check_jwks(&state).await;

    let store_ok = user_store == "ok";
    let jwks_ok = jwks.as_deref().map(|s| s == "ok").unwrap_or(true);
    let all_ok = store_ok && jwks_ok;

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            user_store,
            jwks,
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
/// Does not check dependencies - use readiness for that.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 200 only if all dependencies are available.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}
