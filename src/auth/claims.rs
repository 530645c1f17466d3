// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and the verified claim set.

use serde::Deserialize;

use super::error::VerifyError;

/// Raw claims decoded from a provider token.
///
/// `exp`, `sub` and `iss` presence is enforced by `jsonwebtoken` before this
/// struct is deserialized.
#[derive(Debug, Deserialize)]
pub(crate) struct JwtClaims {
    /// Subject (provider user ID)
    sub: String,
    /// Email (not every provider includes it)
    #[serde(default)]
    email: Option<String>,
    /// Issued at timestamp
    #[serde(default)]
    iat: Option<i64>,
    /// Expiration timestamp
    exp: i64,
    /// Not before timestamp
    #[serde(default)]
    nbf: Option<i64>,
    /// Issuer
    iss: String,
    /// Provider session ID
    #[serde(default)]
    sid: Option<String>,
}

/// Decoded and verified token payload.
///
/// Only produced by the token verifier; lives for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSet {
    /// Provider subject identifier (never empty)
    pub subject: String,
    /// Email, if the provider included a non-empty one
    pub email: Option<String>,
    /// Issued at (Unix seconds)
    pub issued_at: Option<i64>,
    /// Expiration (Unix seconds)
    pub expires_at: i64,
    /// Not before (Unix seconds)
    pub not_before: Option<i64>,
    /// Issuer
    pub issuer: String,
    /// Provider session ID
    pub session_id: Option<String>,
}

impl ClaimSet {
    pub(crate) fn from_jwt(claims: JwtClaims) -> Result<Self, VerifyError> {
        let subject = claims.sub.trim();
        if subject.is_empty() {
            return Err(VerifyError::MalformedCredential("empty subject"));
        }

        let email = claims
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        Ok(Self {
            subject: subject.to_string(),
            email,
            issued_at: claims.iat,
            expires_at: claims.exp,
            not_before: claims.nbf,
            issuer: claims.iss,
            session_id: claims.sid,
        })
    }

    /// Check the time-bound claims against `now`, allowing `leeway` seconds
    /// of clock skew.
    pub fn check_validity_window(&self, now: i64, leeway: u64) -> Result<(), VerifyError> {
        let leeway = i64::try_from(leeway).unwrap_or(i64::MAX);

        if self.expires_at.saturating_add(leeway) <= now {
            return Err(VerifyError::Expired);
        }
        if let Some(nbf) = self.not_before {
            if nbf.saturating_sub(leeway) > now {
                return Err(VerifyError::MalformedCredential("token not yet valid"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(sub: &str, email: Option<&str>) -> JwtClaims {
        JwtClaims {
            sub: sub.to_string(),
            email: email.map(str::to_string),
            iat: Some(1_700_000_000),
            exp: 1_700_003_600,
            nbf: None,
            iss: "https://issuer.example.com".to_string(),
            sid: Some("sess_abc".to_string()),
        }
    }

    #[test]
    fn from_jwt_extracts_fields() {
        let claims = ClaimSet::from_jwt(raw("user_123", Some("a@example.com"))).unwrap();
        assert_eq!(claims.subject, "user_123");
        assert_eq!(claims.email.as_deref(), Some("a@example.com"));
        assert_eq!(claims.expires_at, 1_700_003_600);
        assert_eq!(claims.session_id.as_deref(), Some("sess_abc"));
    }

    #[test]
    fn empty_subject_is_malformed() {
        assert_eq!(
            ClaimSet::from_jwt(raw("  ", None)),
            Err(VerifyError::MalformedCredential("empty subject"))
        );
    }

    #[test]
    fn blank_email_becomes_none() {
        let claims = ClaimSet::from_jwt(raw("user_123", Some(""))).unwrap();
        assert_eq!(claims.email, None);
    }

    #[test]
    fn validity_window_respects_leeway() {
        let claims = ClaimSet::from_jwt(raw("user_123", None)).unwrap();
        let exp = claims.expires_at;

        assert!(claims.check_validity_window(exp - 1, 0).is_ok());
        assert_eq!(claims.check_validity_window(exp, 0), Err(VerifyError::Expired));
        assert!(claims.check_validity_window(exp + 30, 60).is_ok());
        assert_eq!(
            claims.check_validity_window(exp + 61, 60),
            Err(VerifyError::Expired)
        );
    }

    #[test]
    fn future_nbf_is_rejected() {
        let mut claims = ClaimSet::from_jwt(raw("user_123", None)).unwrap();
        claims.not_before = Some(1_700_001_000);
        assert!(claims.check_validity_window(1_700_000_000, 0).is_err());
        assert!(claims.check_validity_window(1_700_000_000, 1_000).is_ok());
    }
}
