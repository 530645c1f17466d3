// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every rejection the gateway can produce maps to exactly one HTTP status
//! and one machine-readable `error_code`:
//!
//! | Rejection | Status | `error_code` |
//! |-----------|--------|--------------|
//! | missing / malformed `Authorization` header | 401 | `unauthorized` |
//! | malformed token, bad signature, expired, wrong issuer | 401 | `invalid_or_expired_token` |
//! | signing keys unavailable | 503 | `identity_provider_unavailable` |
//! | user store unavailable | 500 | `failed_to_sync_user` |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Transport-shape failures of the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("Authorization header is required")]
    Missing,
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    Malformed,
}

/// Token Verifier failures.
///
/// All but `KeysUnavailable` are caused by the presented credential and are
/// never worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("Token is malformed: {0}")]
    MalformedCredential(&'static str),
    #[error("Token signature is invalid")]
    SignatureInvalid,
    #[error("Token has expired")]
    Expired,
    #[error("Token issuer is invalid")]
    IssuerMismatch,
    #[error("Signing keys unavailable: {0}")]
    KeysUnavailable(String),
}

impl VerifyError {
    /// Stable name of the failure kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::MalformedCredential(_) => "malformed_credential",
            VerifyError::SignatureInvalid => "signature_invalid",
            VerifyError::Expired => "expired",
            VerifyError::IssuerMismatch => "issuer_mismatch",
            VerifyError::KeysUnavailable(_) => "keys_unavailable",
        }
    }
}

/// Identity Reconciler failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("User store unavailable: {0}")]
    PersistenceUnavailable(String),
}

/// Reason a request was rejected by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(transparent)]
    Token(#[from] VerifyError),
    #[error(transparent)]
    Sync(#[from] ReconcileError),
    /// A handler asked for the current user on a request the gateway never
    /// bound.
    #[error("Request has not been authenticated")]
    NotAuthenticated,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Header(_) | AuthError::NotAuthenticated => "unauthorized",
            AuthError::Token(VerifyError::KeysUnavailable(_)) => "identity_provider_unavailable",
            AuthError::Token(_) => "invalid_or_expired_token",
            AuthError::Sync(_) => "failed_to_sync_user",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Header(_) | AuthError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AuthError::Token(VerifyError::KeysUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Token(_) => StatusCode::UNAUTHORIZED,
            AuthError::Sync(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable name of the rejection reason, used in logs.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Header(_) => "missing_or_malformed_header",
            AuthError::Token(e) => e.kind(),
            AuthError::Sync(ReconcileError::PersistenceUnavailable(_)) => {
                "persistence_unavailable"
            }
            AuthError::NotAuthenticated => "not_authenticated",
        }
    }

    /// Whether the caller caused the rejection (as opposed to infrastructure).
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    fn summary(&self) -> String {
        match self {
            AuthError::Header(e) => e.to_string(),
            AuthError::Token(VerifyError::KeysUnavailable(_)) => {
                "Identity provider signing keys are unavailable".to_string()
            }
            AuthError::Token(_) => "Invalid or expired token".to_string(),
            AuthError::Sync(_) => "Failed to sync user".to_string(),
            AuthError::NotAuthenticated => self.to_string(),
        }
    }

    /// Diagnostic detail for internal consumers. Never carries credential material.
    pub fn details(&self) -> Option<String> {
        match self {
            AuthError::Token(e) => Some(e.to_string()),
            AuthError::Sync(e) => Some(e.to_string()),
            AuthError::Header(_) | AuthError::NotAuthenticated => None,
        }
    }

    /// Render the JSON error response, optionally with `details`.
    pub fn to_response(&self, include_details: bool) -> Response {
        let body = Json(AuthErrorBody {
            error: self.summary(),
            error_code: self.error_code(),
            details: if include_details { self.details() } else { None },
        });
        (self.status_code(), body).into_response()
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.to_response(true)
    }
}
