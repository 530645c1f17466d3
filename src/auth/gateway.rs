// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gateway orchestration.
//!
//! Each request walks an explicit state machine:
//!
//! ```text
//! Unauthenticated ─► CredentialExtracted ─► Verified ─► Reconciled ─► Bound
//!        │                    │                 │
//!        └────────────────────┴─────────────────┴──────► Rejected(reason)
//! ```
//!
//! [`Gateway::step`] performs exactly one transition, so each terminal state
//! can be reached and inspected on its own. [`require_auth`] is the Axum
//! middleware that drives the machine for protected routes.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, error, warn};

use super::claims::ClaimSet;
use super::context;
use super::credential::Credential;
use super::error::AuthError;
use super::reconciler::IdentityReconciler;
use super::verifier::TokenVerifier;
use crate::models::{LocalUser, LocalUserId};

/// Gateway evaluation state for one request.
#[derive(Debug)]
pub enum GatewayState {
    Unauthenticated,
    CredentialExtracted(Credential),
    Verified(ClaimSet),
    Reconciled(LocalUser),
    /// Terminal success
    Bound(LocalUserId),
    /// Terminal failure
    Rejected(AuthError),
}

impl GatewayState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GatewayState::Bound(_) | GatewayState::Rejected(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            GatewayState::Unauthenticated => "unauthenticated",
            GatewayState::CredentialExtracted(_) => "credential_extracted",
            GatewayState::Verified(_) => "verified",
            GatewayState::Reconciled(_) => "reconciled",
            GatewayState::Bound(_) => "bound",
            GatewayState::Rejected(_) => "rejected",
        }
    }
}

/// Token Verifier + Identity Reconciler + Context Binder, run in order.
pub struct Gateway {
    verifier: TokenVerifier,
    reconciler: IdentityReconciler,
    expose_details: bool,
}

impl Gateway {
    pub fn new(verifier: TokenVerifier, reconciler: IdentityReconciler) -> Self {
        Self {
            verifier,
            reconciler,
            expose_details: true,
        }
    }

    /// Whether rejection bodies carry the `details` field.
    pub fn with_error_details(mut self, expose: bool) -> Self {
        self.expose_details = expose;
        self
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn reconciler(&self) -> &IdentityReconciler {
        &self.reconciler
    }

    pub fn expose_details(&self) -> bool {
        self.expose_details
    }

    /// Perform one transition. Terminal states are returned unchanged.
    pub async fn step(&self, state: GatewayState, parts: &mut Parts, now: i64) -> GatewayState {
        match state {
            GatewayState::Unauthenticated => match Credential::from_headers(&parts.headers) {
                Ok(credential) => GatewayState::CredentialExtracted(credential),
                Err(e) => GatewayState::Rejected(e.into()),
            },
            GatewayState::CredentialExtracted(credential) => {
                match self.verifier.verify(&credential, now).await {
                    Ok(claims) => GatewayState::Verified(claims),
                    Err(e) => GatewayState::Rejected(e.into()),
                }
            }
            GatewayState::Verified(claims) => match self.reconciler.reconcile(&claims).await {
                Ok(user) => GatewayState::Reconciled(user),
                Err(e) => GatewayState::Rejected(e.into()),
            },
            GatewayState::Reconciled(user) => {
                context::bind(&mut parts.extensions, user.id);
                GatewayState::Bound(user.id)
            }
            terminal @ (GatewayState::Bound(_) | GatewayState::Rejected(_)) => terminal,
        }
    }

    /// Run the machine from `Unauthenticated` to a terminal state.
    ///
    /// On success the local user id is bound into `parts.extensions`.
    pub async fn run(&self, parts: &mut Parts, now: i64) -> Result<LocalUserId, AuthError> {
        let mut state = GatewayState::Unauthenticated;
        let mut credential_hint: Option<String> = None;

        loop {
            if let GatewayState::CredentialExtracted(credential) = &state {
                credential_hint = Some(credential.hint());
            }

            state = match state {
                GatewayState::Bound(user_id) => {
                    debug!(user_id = %user_id, "Request authenticated");
                    return Ok(user_id);
                }
                GatewayState::Rejected(err) => {
                    log_rejection(&err, credential_hint.as_deref());
                    return Err(err);
                }
                state => self.step(state, parts, now).await,
            };
        }
    }

    /// [`Gateway::run`] against the current wall-clock time.
    pub async fn authenticate(&self, parts: &mut Parts) -> Result<LocalUserId, AuthError> {
        self.run(parts, Utc::now().timestamp()).await
    }
}

fn log_rejection(err: &AuthError, credential: Option<&str>) {
    let credential = credential.unwrap_or("-");
    if err.is_client_error() {
        warn!(
            error_code = err.error_code(),
            reason = err.reason(),
            error = %err,
            credential,
            "Rejected request"
        );
    } else {
        error!(
            error_code = err.error_code(),
            reason = err.reason(),
            error = %err,
            credential,
            "Rejected request"
        );
    }
}

/// Authentication middleware function.
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/protected", get(protected_handler))
///     .route_layer(axum::middleware::from_fn_with_state(gateway, require_auth));
/// ```
pub async fn require_auth(
    State(gateway): State<Arc<Gateway>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    match gateway.authenticate(&mut parts).await {
        Ok(_) => next.run(Request::from_parts(parts, body)).await,
        Err(err) => err.to_response(gateway.expose_details()),
    }
}
