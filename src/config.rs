// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup into an
//! immutable [`Config`]. `.env` files are not read.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `users.redb` | `./data` |
//! | `USER_STORE` | User store backend (`redb` or `memory`) | `redb` |
//! | `AUTH_ISSUER` | Trusted JWT issuer (`iss`) | Required |
//! | `AUTH_AUDIENCE` | Expected JWT audience (`aud`) | Not checked |
//! | `AUTH_JWKS_URL` | JWKS endpoint for signing keys | One key source required |
//! | `AUTH_JWT_SECRET` | HS256 shared secret | One key source required |
//! | `AUTH_PUBLIC_KEY_PEM` | RSA public key (PEM, `\n` escapes allowed) | One key source required |
//! | `AUTH_LEEWAY_SECONDS` | Clock skew tolerance | `60` |
//! | `JWKS_CACHE_TTL_SECONDS` | JWKS cache lifetime | `300` |
//! | `PERSISTENCE_TIMEOUT_MS` | Per-request user store timeout | `5000` |
//! | `AUTH_ERROR_DETAILS` | Include `details` in error bodies | `true` |
//! | `TLS_CERT_PATH` | PEM certificate chain for HTTPS | Unset (plain HTTP) |
//! | `TLS_KEY_PATH` | PEM private key for HTTPS | Unset (plain HTTP) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::auth::jwks::{JwksError, JwksManager, DEFAULT_CACHE_TTL};
use crate::auth::reconciler::DEFAULT_PERSISTENCE_TIMEOUT;
use crate::auth::trust::{KeySource, StaticKey, TrustConfig, DEFAULT_LEEWAY_SECS};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Directory for the embedded user database. Created on startup if missing.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const USER_STORE_ENV: &str = "USER_STORE";

/// Trusted issuer. Tokens whose `iss` differs are rejected.
pub const AUTH_ISSUER_ENV: &str = "AUTH_ISSUER";
pub const AUTH_AUDIENCE_ENV: &str = "AUTH_AUDIENCE";

/// Remote signing keys. Must be HTTPS except for loopback hosts.
pub const AUTH_JWKS_URL_ENV: &str = "AUTH_JWKS_URL";
pub const AUTH_JWT_SECRET_ENV: &str = "AUTH_JWT_SECRET";
pub const AUTH_PUBLIC_KEY_PEM_ENV: &str = "AUTH_PUBLIC_KEY_PEM";

pub const AUTH_LEEWAY_SECONDS_ENV: &str = "AUTH_LEEWAY_SECONDS";
pub const JWKS_CACHE_TTL_SECONDS_ENV: &str = "JWKS_CACHE_TTL_SECONDS";
pub const PERSISTENCE_TIMEOUT_MS_ENV: &str = "PERSISTENCE_TIMEOUT_MS";

/// Whether rejection bodies carry diagnostic `details`. Disable for
/// public-facing deployments.
pub const AUTH_ERROR_DETAILS_ENV: &str = "AUTH_ERROR_DETAILS";

pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// User database file name inside `DATA_DIR`.
pub const USER_DB_FILE: &str = "users.redb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("no signing key source configured (set one of AUTH_JWKS_URL, AUTH_JWT_SECRET, AUTH_PUBLIC_KEY_PEM)")]
    NoKeySource,

    #[error("multiple signing key sources configured ({0}); set exactly one")]
    MultipleKeySources(String),

    #[error("AUTH_JWKS_URL must use https: {0}")]
    InsecureJwksUrl(String),

    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    PartialTls,

    #[error("AUTH_PUBLIC_KEY_PEM is not a valid RSA public key: {0}")]
    InvalidPublicKey(#[source] jsonwebtoken::errors::Error),

    #[error("failed to build JWKS client: {0}")]
    Jwks(#[from] JwksError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redb,
    Memory,
}

/// Where token signing keys come from.
#[derive(Clone, PartialEq, Eq)]
pub enum KeySettings {
    Jwks { url: Url, cache_ttl: Duration },
    Secret(String),
    PublicKeyPem(String),
}

impl std::fmt::Debug for KeySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySettings::Jwks { url, cache_ttl } => f
                .debug_struct("Jwks")
                .field("url", &url.as_str())
                .field("cache_ttl", cache_ttl)
                .finish(),
            KeySettings::Secret(_) => f.write_str("Secret(<redacted>)"),
            KeySettings::PublicKeyPem(_) => f.write_str("PublicKeyPem(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub store_backend: StoreBackend,
    pub issuer: String,
    pub audience: Option<String>,
    pub keys: KeySettings,
    pub leeway_secs: u64,
    pub persistence_timeout: Duration,
    pub error_details: bool,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match get(PORT_ENV) {
            Some(raw) => parse_number::<u16>(PORT_ENV, &raw)?,
            None => DEFAULT_PORT,
        };
        // IPv6 hosts may be given bare (`::`) or bracketed (`[::1]`).
        let ip: IpAddr = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&host)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: HOST_ENV,
                reason: e.to_string(),
            })?;
        let bind_addr = SocketAddr::new(ip, port);

        let store_backend = match get(USER_STORE_ENV).as_deref() {
            None | Some("redb") => StoreBackend::Redb,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: USER_STORE_ENV,
                    reason: format!("expected 'redb' or 'memory', got '{other}'"),
                })
            }
        };

        let issuer = get(AUTH_ISSUER_ENV).ok_or(ConfigError::Missing(AUTH_ISSUER_ENV))?;

        let cache_ttl = match get(JWKS_CACHE_TTL_SECONDS_ENV) {
            Some(raw) => Duration::from_secs(parse_number(JWKS_CACHE_TTL_SECONDS_ENV, &raw)?),
            None => DEFAULT_CACHE_TTL,
        };
        let keys = key_settings(
            get(AUTH_JWKS_URL_ENV),
            get(AUTH_JWT_SECRET_ENV),
            get(AUTH_PUBLIC_KEY_PEM_ENV),
            cache_ttl,
        )?;

        let leeway_secs = match get(AUTH_LEEWAY_SECONDS_ENV) {
            Some(raw) => parse_number(AUTH_LEEWAY_SECONDS_ENV, &raw)?,
            None => DEFAULT_LEEWAY_SECS,
        };
        let persistence_timeout = match get(PERSISTENCE_TIMEOUT_MS_ENV) {
            Some(raw) => Duration::from_millis(parse_number(PERSISTENCE_TIMEOUT_MS_ENV, &raw)?),
            None => DEFAULT_PERSISTENCE_TIMEOUT,
        };
        let error_details = match get(AUTH_ERROR_DETAILS_ENV) {
            Some(raw) => parse_bool(AUTH_ERROR_DETAILS_ENV, &raw)?,
            None => true,
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: PathBuf::from(cert),
                key: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialTls),
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: LOG_FORMAT_ENV,
                    reason: format!("expected 'json' or 'pretty', got '{other}'"),
                })
            }
        };

        Ok(Self {
            bind_addr,
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            store_backend,
            issuer,
            audience: get(AUTH_AUDIENCE_ENV),
            keys,
            leeway_secs,
            persistence_timeout,
            error_details,
            tls,
            log_format,
        })
    }

    /// Path of the redb user database.
    pub fn user_db_path(&self) -> PathBuf {
        self.data_dir.join(USER_DB_FILE)
    }

    /// Build the immutable verification settings.
    pub fn build_trust(&self) -> Result<TrustConfig, ConfigError> {
        let keys = match &self.keys {
            KeySettings::Jwks { url, cache_ttl } => {
                let manager = JwksManager::new(url.as_str())?.with_cache_ttl(*cache_ttl);
                KeySource::Jwks(Arc::new(manager))
            }
            KeySettings::Secret(secret) => {
                KeySource::Static(vec![StaticKey::hs256(secret.as_bytes())])
            }
            KeySettings::PublicKeyPem(pem) => {
                let key =
                    StaticKey::rsa_pem(pem.as_bytes()).map_err(ConfigError::InvalidPublicKey)?;
                KeySource::Static(vec![key])
            }
        };

        let mut trust = TrustConfig::new(self.issuer.clone(), keys).with_leeway(self.leeway_secs);
        if let Some(audience) = &self.audience {
            trust = trust.with_audience(audience.clone());
        }
        Ok(trust)
    }
}

fn key_settings(
    jwks_url: Option<String>,
    secret: Option<String>,
    pem: Option<String>,
    cache_ttl: Duration,
) -> Result<KeySettings, ConfigError> {
    let configured: Vec<&str> = [
        (AUTH_JWKS_URL_ENV, jwks_url.is_some()),
        (AUTH_JWT_SECRET_ENV, secret.is_some()),
        (AUTH_PUBLIC_KEY_PEM_ENV, pem.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, set)| set.then_some(name))
    .collect();

    if configured.len() > 1 {
        return Err(ConfigError::MultipleKeySources(configured.join(", ")));
    }

    if let Some(raw) = jwks_url {
        return Ok(KeySettings::Jwks {
            url: parse_jwks_url(&raw)?,
            cache_ttl,
        });
    }
    if let Some(secret) = secret {
        return Ok(KeySettings::Secret(secret));
    }
    if let Some(pem) = pem {
        return Ok(KeySettings::PublicKeyPem(pem.replace("\\n", "\n")));
    }
    Err(ConfigError::NoKeySource)
}

fn parse_jwks_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        var: AUTH_JWKS_URL_ENV,
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]")) => Ok(url),
        _ => Err(ConfigError::InsecureJwksUrl(raw.to_string())),
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            var,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const MINIMAL: &[(&str, &str)] = &[
        (AUTH_ISSUER_ENV, "https://issuer.example.com"),
        (AUTH_JWT_SECRET_ENV, "secret"),
    ];

    #[test]
    fn defaults_apply() {
        let config = load(MINIMAL).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.user_db_path(), PathBuf::from("./data/users.redb"));
        assert_eq!(config.store_backend, StoreBackend::Redb);
        assert_eq!(config.issuer, "https://issuer.example.com");
        assert_eq!(config.audience, None);
        assert_eq!(config.keys, KeySettings::Secret("secret".to_string()));
        assert_eq!(config.leeway_secs, 60);
        assert_eq!(config.persistence_timeout, Duration::from_secs(5));
        assert!(config.error_details);
        assert_eq!(config.tls, None);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = MINIMAL.to_vec();
        vars.extend([
            (HOST_ENV, "127.0.0.1"),
            (PORT_ENV, "9000"),
            (USER_STORE_ENV, "memory"),
            (AUTH_AUDIENCE_ENV, "my-app"),
            (AUTH_LEEWAY_SECONDS_ENV, "5"),
            (PERSISTENCE_TIMEOUT_MS_ENV, "250"),
            (AUTH_ERROR_DETAILS_ENV, "false"),
            (LOG_FORMAT_ENV, "json"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.audience.as_deref(), Some("my-app"));
        assert_eq!(config.leeway_secs, 5);
        assert_eq!(config.persistence_timeout, Duration::from_millis(250));
        assert!(!config.error_details);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn ipv6_host_is_accepted() {
        for host in ["::", "[::]"] {
            let mut vars = MINIMAL.to_vec();
            vars.push((HOST_ENV, host));
            let config = load(&vars).unwrap();
            assert_eq!(config.bind_addr, "[::]:8080".parse::<SocketAddr>().unwrap());
        }

        let mut vars = MINIMAL.to_vec();
        vars.extend([(HOST_ENV, "::1"), (PORT_ENV, "9000")]);
        assert_eq!(
            load(&vars).unwrap().bind_addr,
            "[::1]:9000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn unparseable_host_is_invalid() {
        let mut vars = MINIMAL.to_vec();
        vars.push((HOST_ENV, "localhost"));
        assert!(matches!(
            load(&vars).unwrap_err(),
            ConfigError::Invalid { var: HOST_ENV, .. }
        ));
    }

    #[test]
    fn issuer_is_required() {
        let err = load(&[(AUTH_JWT_SECRET_ENV, "secret")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(AUTH_ISSUER_ENV)));
    }

    #[test]
    fn exactly_one_key_source() {
        let err = load(&[(AUTH_ISSUER_ENV, "iss")]).unwrap_err();
        assert!(matches!(err, ConfigError::NoKeySource));

        let err = load(&[
            (AUTH_ISSUER_ENV, "iss"),
            (AUTH_JWT_SECRET_ENV, "secret"),
            (AUTH_JWKS_URL_ENV, "https://issuer.example.com/.well-known/jwks.json"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::MultipleKeySources(_)));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = load(&[
            (AUTH_ISSUER_ENV, "iss"),
            (AUTH_JWT_SECRET_ENV, "secret"),
            (AUTH_JWKS_URL_ENV, "   "),
            (AUTH_AUDIENCE_ENV, ""),
        ])
        .unwrap();
        assert_eq!(config.keys, KeySettings::Secret("secret".to_string()));
        assert_eq!(config.audience, None);
    }

    #[test]
    fn jwks_url_must_be_https() {
        let ok = load(&[
            (AUTH_ISSUER_ENV, "iss"),
            (AUTH_JWKS_URL_ENV, "https://issuer.example.com/.well-known/jwks.json"),
            (JWKS_CACHE_TTL_SECONDS_ENV, "60"),
        ])
        .unwrap();
        assert!(matches!(
            ok.keys,
            KeySettings::Jwks { cache_ttl, .. } if cache_ttl == Duration::from_secs(60)
        ));

        let err = load(&[
            (AUTH_ISSUER_ENV, "iss"),
            (AUTH_JWKS_URL_ENV, "http://issuer.example.com/jwks.json"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InsecureJwksUrl(_)));

        assert!(load(&[
            (AUTH_ISSUER_ENV, "iss"),
            (AUTH_JWKS_URL_ENV, "http://localhost:8081/jwks.json"),
        ])
        .is_ok());
    }

    #[test]
    fn tls_paths_come_in_pairs() {
        let mut vars = MINIMAL.to_vec();
        vars.push((TLS_CERT_PATH_ENV, "/certs/server.pem"));
        assert!(matches!(load(&vars).unwrap_err(), ConfigError::PartialTls));

        vars.push((TLS_KEY_PATH_ENV, "/certs/server.key"));
        let config = load(&vars).unwrap();
        assert_eq!(
            config.tls,
            Some(TlsPaths {
                cert: PathBuf::from("/certs/server.pem"),
                key: PathBuf::from("/certs/server.key"),
            })
        );
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let mut vars = MINIMAL.to_vec();
        vars.push((PORT_ENV, "eighty"));
        assert!(matches!(
            load(&vars).unwrap_err(),
            ConfigError::Invalid { var: PORT_ENV, .. }
        ));

        let mut vars = MINIMAL.to_vec();
        vars.push((AUTH_ERROR_DETAILS_ENV, "maybe"));
        assert!(matches!(
            load(&vars).unwrap_err(),
            ConfigError::Invalid { var: AUTH_ERROR_DETAILS_ENV, .. }
        ));
    }

    #[test]
    fn pem_escapes_are_unfolded() {
        let config = load(&[
            (AUTH_ISSUER_ENV, "iss"),
            (AUTH_PUBLIC_KEY_PEM_ENV, "-----BEGIN PUBLIC KEY-----\\nAAAA\\n-----END PUBLIC KEY-----"),
        ])
        .unwrap();
        assert_eq!(
            config.keys,
            KeySettings::PublicKeyPem(
                "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----".to_string()
            )
        );
        assert!(matches!(
            config.build_trust(),
            Err(ConfigError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn build_trust_carries_settings() {
        let mut vars = MINIMAL.to_vec();
        vars.extend([(AUTH_AUDIENCE_ENV, "my-app"), (AUTH_LEEWAY_SECONDS_ENV, "10")]);
        let trust = load(&vars).unwrap().build_trust().unwrap();

        assert_eq!(trust.issuer(), "https://issuer.example.com");
        assert_eq!(trust.audience(), Some("my-app"));
        assert_eq!(trust.leeway(), 10);
        assert!(trust.keys().jwks().is_none());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let config = load(MINIMAL).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("\"secret\""));
        assert!(debug.contains("<redacted>"));
    }
}
