// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Trust material for token verification.
//!
//! A [`TrustConfig`] is built once at startup and handed to the verifier.
//! Nothing in here reads process state at request time.

use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey};

use super::error::VerifyError;
use super::jwks::{JwksError, JwksManager};

/// Clock skew tolerance (60 seconds).
pub const DEFAULT_LEEWAY_SECS: u64 = 60;

/// A locally configured signing key.
#[derive(Clone)]
pub struct StaticKey {
    kid: Option<String>,
    key: DecodingKey,
    algorithm: Algorithm,
}

impl StaticKey {
    /// HMAC-SHA256 shared secret.
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            kid: None,
            key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
        }
    }

    /// RSA public key in PEM form, verified with RS256.
    pub fn rsa_pem(pem: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Self {
            kid: None,
            key: DecodingKey::from_rsa_pem(pem)?,
            algorithm: Algorithm::RS256,
        })
    }

    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }
}

impl fmt::Debug for StaticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Where signing keys come from.
#[derive(Clone)]
pub enum KeySource {
    Static(Vec<StaticKey>),
    Jwks(Arc<JwksManager>),
}

impl KeySource {
    /// Select the decoding key for a token header's `kid`.
    ///
    /// An unknown `kid` is a signature failure: the token was not signed by
    /// any key we trust.
    pub async fn resolve(&self, kid: Option<&str>) -> Result<(DecodingKey, Algorithm), VerifyError> {
        match self {
            KeySource::Static(keys) => {
                let found = match kid {
                    Some(kid) => keys
                        .iter()
                        .find(|k| k.kid.as_deref() == Some(kid))
                        .or_else(|| keys.iter().find(|k| k.kid.is_none())),
                    None => keys.first(),
                };
                found
                    .map(|k| (k.key.clone(), k.algorithm))
                    .ok_or(VerifyError::SignatureInvalid)
            }
            KeySource::Jwks(jwks) => {
                let resolved = match kid {
                    Some(kid) => jwks.get_decoding_key(kid).await,
                    None => jwks.get_any_decoding_key().await,
                };
                resolved.map_err(|e| match e {
                    JwksError::NoMatchingKey => VerifyError::SignatureInvalid,
                    other => VerifyError::KeysUnavailable(other.to_string()),
                })
            }
        }
    }

    /// The JWKS manager, when keys are fetched remotely.
    pub fn jwks(&self) -> Option<&Arc<JwksManager>> {
        match self {
            KeySource::Jwks(jwks) => Some(jwks),
            KeySource::Static(_) => None,
        }
    }
}

/// Immutable verification settings: trusted issuer, optional audience,
/// clock-skew leeway and signing keys.
#[derive(Clone)]
pub struct TrustConfig {
    issuer: String,
    audience: Option<String>,
    leeway: u64,
    keys: KeySource,
}

impl TrustConfig {
    pub fn new(issuer: impl Into<String>, keys: KeySource) -> Self {
        Self {
            issuer: issuer.into(),
            audience: None,
            leeway: DEFAULT_LEEWAY_SECS,
            keys,
        }
    }

    /// Set the expected audience.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway = leeway_secs;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    pub fn leeway(&self) -> u64 {
        self.leeway
    }

    pub fn keys(&self) -> &KeySource {
        &self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_config_defaults() {
        let config = TrustConfig::new(
            "https://issuer.example.com",
            KeySource::Static(vec![StaticKey::hs256(b"secret")]),
        );
        assert_eq!(config.issuer(), "https://issuer.example.com");
        assert!(config.audience().is_none());
        assert_eq!(config.leeway(), DEFAULT_LEEWAY_SECS);
        assert!(config.keys().jwks().is_none());
    }

    #[test]
    fn trust_config_with_audience() {
        let config = TrustConfig::new("iss", KeySource::Static(vec![]))
            .with_audience("my-app")
            .with_leeway(5);
        assert_eq!(config.audience(), Some("my-app"));
        assert_eq!(config.leeway(), 5);
    }

    #[tokio::test]
    async fn static_keys_resolve_by_kid_then_default() {
        let source = KeySource::Static(vec![
            StaticKey::hs256(b"primary").with_kid("k1"),
            StaticKey::hs256(b"fallback"),
        ]);

        assert!(source.resolve(Some("k1")).await.is_ok());
        assert!(source.resolve(Some("unknown")).await.is_ok());
        assert!(source.resolve(None).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_kid_without_default_is_signature_failure() {
        let source = KeySource::Static(vec![StaticKey::hs256(b"primary").with_kid("k1")]);
        assert!(matches!(
            source.resolve(Some("k2")).await,
            Err(VerifyError::SignatureInvalid)
        ));
        assert!(matches!(
            KeySource::Static(vec![]).resolve(None).await,
            Err(VerifyError::SignatureInvalid)
        ));
    }

    #[test]
    fn invalid_pem_is_rejected() {
        assert!(StaticKey::rsa_pem(b"not a pem").is_err());
    }
}
