// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer-token authentication gateway for protected routes.
//!
//! ## Auth Flow
//!
//! 1. Client authenticates with the identity provider
//! 2. Client sends `Authorization: Bearer <JWT>`
//! 3. Gateway:
//!    - Extracts the credential from the header
//!    - Verifies signature, issuer, audience and expiry against the
//!      configured trust material (static keys or a JWKS endpoint)
//!    - Creates or refreshes the local user for the token's `sub`
//!    - Binds the local user id into the request extensions
//! 4. Handlers read it with the [`CurrentUser`] extractor
//!
//! ## Security
//!
//! - Protected routes never run unless the gateway reached `Bound`
//! - Signatures are always verified; there is no unverified decode path
//! - JWKS is fetched over HTTPS and cached with a TTL
//! - Clock skew tolerance defaults to 60 seconds
//! - Raw tokens never reach the logs, only an 8-character hint

pub mod claims;
pub mod context;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod jwks;
pub mod reconciler;
pub mod trust;
pub mod verifier;

pub use claims::ClaimSet;
pub use context::{AuthenticatedContext, CurrentUser};
pub use credential::Credential;
pub use error::{AuthError, HeaderError, ReconcileError, VerifyError};
pub use gateway::{require_auth, Gateway, GatewayState};
pub use jwks::JwksManager;
pub use reconciler::IdentityReconciler;
pub use trust::{KeySource, StaticKey, TrustConfig};
pub use verifier::TokenVerifier;
