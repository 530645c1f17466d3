// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request Context Binder.
//!
//! The gateway binds the local user id into the request's typed extension
//! map. Handlers read it back with [`current_user`] or the [`CurrentUser`]
//! extractor:
//!
//! ```rust,ignore
//! async fn my_handler(CurrentUser(user_id): CurrentUser) -> impl IntoResponse {
//!     // user_id is the LocalUserId bound by the gateway
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts, http::Extensions};

use super::error::AuthError;
use crate::models::LocalUserId;

/// Per-request association of the authenticated local user.
///
/// Only [`bind`] creates one, so its presence means the gateway ran to
/// completion for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedContext {
    user_id: LocalUserId,
}

impl AuthenticatedContext {
    pub fn user_id(&self) -> LocalUserId {
        self.user_id
    }
}

/// Attach `user_id` to the request context.
pub fn bind(extensions: &mut Extensions, user_id: LocalUserId) {
    extensions.insert(AuthenticatedContext { user_id });
}

/// The bound local user id, or `None` if the gateway has not bound one.
pub fn current_user(extensions: &Extensions) -> Option<LocalUserId> {
    extensions
        .get::<AuthenticatedContext>()
        .map(AuthenticatedContext::user_id)
}

/// Extractor for the authenticated local user id.
///
/// Rejects with `401 unauthorized` when the route is not behind the gateway.
pub struct CurrentUser(pub LocalUserId);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_user(&parts.extensions)
            .map(CurrentUser)
            .ok_or(AuthError::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn empty_parts() -> Parts {
        Request::builder()
            .uri("/test")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn current_user_is_absent_before_binding() {
        assert_eq!(current_user(&Extensions::new()), None);
    }

    #[test]
    fn bind_then_read_back() {
        let mut extensions = Extensions::new();
        let id = LocalUserId::generate();
        bind(&mut extensions, id);
        assert_eq!(current_user(&extensions), Some(id));
    }

    #[tokio::test]
    async fn extractor_rejects_unbound_request() {
        let mut parts = empty_parts();
        let result = CurrentUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn extractor_returns_bound_user() {
        let mut parts = empty_parts();
        let id = LocalUserId::generate();
        bind(&mut parts.extensions, id);

        let CurrentUser(found) = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(found, id);
    }
}
