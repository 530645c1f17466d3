// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer credential extraction and redaction.

use std::fmt;

use axum::http::{header::AUTHORIZATION, HeaderMap};

use super::error::HeaderError;

/// Maximum number of credential characters that may appear in diagnostics.
pub const CREDENTIAL_HINT_LEN: usize = 8;

/// Opaque bearer token taken from the `Authorization` header.
///
/// `Debug` only shows [`Credential::hint`], so a credential can sit in a
/// logged struct without leaking.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Extract the token from `Authorization: Bearer <token>`.
    ///
    /// The scheme is matched case-insensitively and must be followed by
    /// exactly one space. The token must be a single non-empty word.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, HeaderError> {
        let value = headers
            .get(AUTHORIZATION)
            .ok_or(HeaderError::Missing)?
            .to_str()
            .map_err(|_| HeaderError::Malformed)?;

        let (scheme, token) = value.split_once(' ').ok_or(HeaderError::Malformed)?;
        if !scheme.eq_ignore_ascii_case("Bearer") {
            return Err(HeaderError::Malformed);
        }

        if token.is_empty() || token.contains(char::is_whitespace) {
            return Err(HeaderError::Malformed);
        }

        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bounded prefix of the credential, safe for logs.
    ///
    /// At most [`CREDENTIAL_HINT_LEN`] characters and never more than half
    /// the token.
    pub fn hint(&self) -> String {
        let len = self.0.chars().count();
        let shown = CREDENTIAL_HINT_LEN.min(len / 2);
        let prefix: String = self.0.chars().take(shown).collect();
        format!("{prefix}…")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.hint()).finish()
    }
}
