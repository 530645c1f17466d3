// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token Verifier.
//!
//! Checks, in order: token structure, signature, issuer, audience (when
//! configured), required claims, then the validity window against the
//! caller-supplied `now`. Time is an argument rather than read from the
//! system clock so every outcome is reproducible.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};

use super::claims::{ClaimSet, JwtClaims};
use super::credential::Credential;
use super::error::VerifyError;
use super::trust::TrustConfig;

pub struct TokenVerifier {
    trust: TrustConfig,
}

impl TokenVerifier {
    pub fn new(trust: TrustConfig) -> Self {
        Self { trust }
    }

    pub fn trust(&self) -> &TrustConfig {
        &self.trust
    }

    /// Verify `credential` and return its claim set.
    pub async fn verify(&self, credential: &Credential, now: i64) -> Result<ClaimSet, VerifyError> {
        let token = credential.as_str();
        if token.split('.').count() != 3 {
            return Err(VerifyError::MalformedCredential("expected three segments"));
        }

        let header = decode_header(token)
            .map_err(|_| VerifyError::MalformedCredential("undecodable header"))?;

        let (decoding_key, algorithm) = self.trust.keys().resolve(header.kid.as_deref()).await?;

        let token_data = decode::<JwtClaims>(token, &decoding_key, &self.validation(algorithm))
            .map_err(|e| classify(e.kind()))?;

        let claims = ClaimSet::from_jwt(token_data.claims)?;
        claims.check_validity_window(now, self.trust.leeway())?;
        Ok(claims)
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.trust.leeway();

        // Time-bound claims are checked against the caller's `now`.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        validation.set_issuer(&[self.trust.issuer()]);
        match self.trust.audience() {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

fn classify(kind: &ErrorKind) -> VerifyError {
    match kind {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidRsaKey(_) => VerifyError::SignatureInvalid,
        ErrorKind::InvalidIssuer => VerifyError::IssuerMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => VerifyError::IssuerMismatch,
        ErrorKind::ExpiredSignature => VerifyError::Expired,
        ErrorKind::MissingRequiredClaim(_) => {
            VerifyError::MalformedCredential("missing required claim")
        }
        ErrorKind::InvalidAudience => VerifyError::MalformedCredential("audience mismatch"),
        ErrorKind::ImmatureSignature => VerifyError::MalformedCredential("token not yet valid"),
        _ => VerifyError::MalformedCredential("undecodable token"),
    }
}
