// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Security
//!
//! - JWKS is fetched via HTTPS only (checked when the config is loaded)
//! - Keys are cached with a configurable TTL
//! - A stale cache is served when a refresh fails, so a provider outage does
//!   not reject tokens signed with keys we already trust
//! - After a failed fetch the endpoint is left alone for a backoff period
//! - An unknown `kid` triggers a rate-limited refetch to pick up rotated keys

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};

/// Default JWKS cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default timeout for a single JWKS fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to fetch JWKS: {0}")]
    Fetch(String),
    #[error("no matching key in JWKS")]
    NoMatchingKey,
    #[error("unusable key in JWKS: {0}")]
    UnusableKey(String),
}

/// Pause before contacting the endpoint again after a failed fetch.
pub const DEFAULT_REFRESH_BACKOFF: Duration = Duration::from_secs(30);

/// Minimum spacing of refetches triggered by an unknown `kid`.
pub const DEFAULT_FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// JWKS cache entry.
struct CacheEntry {
    jwks: JwkSet,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    /// Set after a failed fetch; until then cached keys are served as-is.
    retry_after: Option<Instant>,
    last_forced_refresh: Option<Instant>,
}

impl CacheState {
    fn backing_off(&self, now: Instant) -> bool {
        self.retry_after.is_some_and(|at| now < at)
    }
}

/// JWKS manager with caching.
///
/// Fetches and caches the identity provider's signing keys. At most one
/// fetch is in flight at a time; concurrent callers wait for it and reuse
/// its result.
#[derive(Clone)]
pub struct JwksManager {
    /// JWKS URL (provider endpoint)
    jwks_url: String,
    /// Cache TTL
    cache_ttl: Duration,
    fetch_timeout: Duration,
    refresh_backoff: Duration,
    forced_refresh_interval: Duration,
    /// Cached JWKS and refresh bookkeeping
    state: Arc<RwLock<CacheState>>,
    /// Held for the duration of a fetch
    refresh_lock: Arc<Mutex<()>>,
    /// HTTP client
    client: reqwest::Client,
}

impl JwksManager {
    /// Create a new JWKS manager.
    ///
    /// # Arguments
    /// - `jwks_url`: The JWKS endpoint URL (e.g., `https://idp.example.com/.well-known/jwks.json`)
    pub fn new(jwks_url: impl Into<String>) -> Result<Self, JwksError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(JwksError::Client)?;

        Ok(Self {
            jwks_url: jwks_url.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: FETCH_TIMEOUT,
            refresh_backoff: DEFAULT_REFRESH_BACKOFF,
            forced_refresh_interval: DEFAULT_FORCED_REFRESH_INTERVAL,
            state: Arc::new(RwLock::new(CacheState::default())),
            refresh_lock: Arc::new(Mutex::new(())),
            client,
        })
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_refresh_backoff(mut self, backoff: Duration) -> Self {
        self.refresh_backoff = backoff;
        self
    }

    pub fn with_forced_refresh_interval(mut self, interval: Duration) -> Self {
        self.forced_refresh_interval = interval;
        self
    }

    /// Get the JWKS URL.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Fetch JWKS (with caching).
    ///
    /// After a failed fetch the stale set (or the error, when nothing is
    /// cached) is returned without contacting the endpoint until the
    /// backoff elapses.
    async fn get_jwks(&self) -> Result<JwkSet, JwksError> {
        if let Some(jwks) = self.servable().await? {
            return Ok(jwks);
        }

        let _fetching = self.refresh_lock.lock().await;
        // Another caller may have fetched while we waited.
        if let Some(jwks) = self.servable().await? {
            return Ok(jwks);
        }

        match self.fetch_jwks().await {
            Ok(jwks) => {
                self.store(jwks.clone()).await;
                Ok(jwks)
            }
            Err(e) => {
                let mut state = self.state.write().await;
                state.retry_after = Some(Instant::now() + self.refresh_backoff);
                match &state.entry {
                    Some(entry) => {
                        tracing::warn!(
                            jwks_url = %self.jwks_url,
                            error = %e,
                            stale_secs = entry.fetched_at.elapsed().as_secs(),
                            retry_in_secs = self.refresh_backoff.as_secs(),
                            "JWKS refresh failed, serving stale keys"
                        );
                        Ok(entry.jwks.clone())
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Keys that can be returned without a fetch, `None` when a fetch is due.
    async fn servable(&self) -> Result<Option<JwkSet>, JwksError> {
        let state = self.state.read().await;
        let backing_off = state.backing_off(Instant::now());
        match &state.entry {
            Some(entry) if backing_off || entry.fetched_at.elapsed() < self.cache_ttl => {
                Ok(Some(entry.jwks.clone()))
            }
            None if backing_off => Err(JwksError::Fetch(
                "JWKS endpoint unavailable, retry pending".to_string(),
            )),
            _ => Ok(None),
        }
    }

    async fn store(&self, jwks: JwkSet) {
        let mut state = self.state.write().await;
        state.entry = Some(CacheEntry {
            jwks,
            fetched_at: Instant::now(),
        });
        state.retry_after = None;
    }

    /// Refetch after a `kid` miss, in case the provider rotated its keys.
    ///
    /// Rate limited so unknown `kid`s cannot drive traffic to the endpoint.
    async fn refresh_for_unknown_kid(&self, kid: &str) {
        let _fetching = self.refresh_lock.lock().await;
        {
            let mut state = self.state.write().await;
            let now = Instant::now();
            let recently_forced = state
                .last_forced_refresh
                .is_some_and(|at| now.duration_since(at) < self.forced_refresh_interval);
            if recently_forced || state.backing_off(now) {
                return;
            }
            state.last_forced_refresh = Some(now);
        }

        tracing::info!(jwks_url = %self.jwks_url, kid, "Unknown key id, refetching JWKS");
        match self.fetch_jwks().await {
            Ok(jwks) => self.store(jwks).await,
            Err(e) => {
                tracing::warn!(jwks_url = %self.jwks_url, error = %e, "JWKS refetch failed");
                self.state.write().await.retry_after = Some(Instant::now() + self.refresh_backoff);
            }
        }
    }

    /// Fetch JWKS from the endpoint.
    async fn fetch_jwks(&self) -> Result<JwkSet, JwksError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| JwksError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(JwksError::Fetch(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| JwksError::Fetch(e.to_string()))?;

        tracing::debug!(jwks_url = %self.jwks_url, keys = jwks.keys.len(), "Fetched JWKS");
        Ok(jwks)
    }

    /// Get a decoding key for the given key ID.
    ///
    /// A `kid` absent from the cached set triggers one rate-limited refetch.
    pub async fn get_decoding_key(&self, kid: &str) -> Result<(DecodingKey, Algorithm), JwksError> {
        let jwks = self.get_jwks().await?;
        if let Some(jwk) = find_key(&jwks, kid) {
            return jwk_to_decoding_key(jwk);
        }

        self.refresh_for_unknown_kid(kid).await;

        let state = self.state.read().await;
        let jwk = state
            .entry
            .as_ref()
            .and_then(|entry| find_key(&entry.jwks, kid))
            .ok_or(JwksError::NoMatchingKey)?;
        jwk_to_decoding_key(jwk)
    }

    /// Get any valid decoding key (for tokens without kid).
    pub async fn get_any_decoding_key(&self) -> Result<(DecodingKey, Algorithm), JwksError> {
        let jwks = self.get_jwks().await?;

        jwks.keys
            .iter()
            .find_map(|jwk| jwk_to_decoding_key(jwk).ok())
            .ok_or(JwksError::NoMatchingKey)
    }

    /// Force refresh the JWKS cache.
    ///
    /// A failure starts the same backoff as a failed cache refresh.
    pub async fn refresh(&self) -> Result<(), JwksError> {
        let _fetching = self.refresh_lock.lock().await;
        match self.fetch_jwks().await {
            Ok(jwks) => {
                self.store(jwks).await;
                Ok(())
            }
            Err(e) => {
                self.state.write().await.retry_after = Some(Instant::now() + self.refresh_backoff);
                Err(e)
            }
        }
    }

    /// Check if JWKS is currently cached and valid.
    pub async fn is_cached(&self) -> bool {
        let state = self.state.read().await;
        state
            .entry
            .as_ref()
            .is_some_and(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
    }

    #[cfg(test)]
    pub(crate) async fn seed(&self, jwks: JwkSet) {
        self.store(jwks).await;
    }
}

fn find_key<'a>(jwks: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    jwks.keys
        .iter()
        .find(|k| k.common.key_id.as_deref() == Some(kid))
}

/// Convert a JWK to a DecodingKey.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), JwksError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|e| JwksError::UnusableKey(format!("RSA: {e}")))?;

            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                Some(KeyAlgorithm::PS256) => Algorithm::PS256,
                Some(KeyAlgorithm::PS384) => Algorithm::PS384,
                Some(KeyAlgorithm::PS512) => Algorithm::PS512,
                _ => Algorithm::RS256,
            };

            Ok((key, alg))
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map_err(|e| JwksError::UnusableKey(format!("EC: {e}")))?;

            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::ES384) => Algorithm::ES384,
                _ => Algorithm::ES256,
            };

            Ok((key, alg))
        }
        _ => Err(JwksError::UnusableKey(
            "unsupported key type".to_string(),
        )),
    }
}
