// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::{LocalUser, LocalUserId};
use crate::state::AppState;

/// Response for GET /v1/users/me
#[derive(Debug, Serialize, ToSchema)]
pub struct UserMeResponse {
    /// Local user id bound by the gateway
    pub user_id: LocalUserId,
    /// Email from the most recent token that carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LocalUser> for UserMeResponse {
    fn from(user: LocalUser) -> Self {
        Self {
            user_id: user.id,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Get the current authenticated user's local record.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = UserMeResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 500, description = "User store unavailable"),
        (status = 503, description = "Identity provider keys unavailable"),
    )
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<UserMeResponse>, ApiError> {
    let store = Arc::clone(&state.users);
    let user = tokio::task::spawn_blocking(move || store.get(&user_id))
        .await
        .map_err(|e| ApiError::internal(format!("user lookup task failed: {e}")))?
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "Failed to load user");
            ApiError::internal("failed to load user")
        })?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    Ok(Json(user.into()))
}
