//! API server configuration.

use std::time::Duration;

use pulse_core::auth::settings::{
    AuthSettings, DEFAULT_AUTH_SESSION_TTL_SECS, DEFAULT_SESSION_TOKEN_TTL,
    DEFAULT_SHARE_TOKEN_HEADER, DEFAULT_SSO_TOKEN_HEADER,
};
use pulse_core::auth::sso::{DEFAULT_HTTP_TIMEOUT, DEFAULT_JWKS_CACHE_TTL, SsoConfig};
use thiserror::Error;

/// Startup configuration errors. All are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL; `None` keeps principals in memory.
    pub database_url: Option<String>,
    /// Redis URL; `None` disables the session store.
    pub redis_url: Option<String>,
    pub auth: AuthSettings,
    /// `None` when SSO is disabled.
    pub sso: Option<SsoConfig>,
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                   | Default                     |
    /// |----------------------------|-----------------------------|
    /// | `BIND_ADDR`                | `127.0.0.1:3100`            |
    /// | `DATABASE_URL`             | unset (in-memory users)     |
    /// | `REDIS_URL`                | unset (no session store)    |
    /// | `APP_SECRET`               | required                    |
    /// | `SESSION_TOKEN_TTL_SECS`   | `86400` (`0` = no expiry)   |
    /// | `AUTH_SESSION_TTL_SECS`    | `3600`                      |
    /// | `SSO_TOKEN_HEADER`         | `x-pulse-sso-token`         |
    /// | `SHARE_TOKEN_HEADER`       | `x-pulse-share-token`       |
    /// | `SSO_ENABLED`              | `false`                     |
    /// | `SSO_*` endpoints and ids  | required when SSO enabled   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret = var("APP_SECRET").ok_or(ConfigError::Missing("APP_SECRET"))?;
        let session_ttl = match var("SESSION_TOKEN_TTL_SECS") {
            Some(v) => match parse_secs("SESSION_TOKEN_TTL_SECS", &v)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => Some(DEFAULT_SESSION_TOKEN_TTL),
        };
        let auth_session_ttl = match var("AUTH_SESSION_TTL_SECS") {
            Some(v) => parse_secs("AUTH_SESSION_TTL_SECS", &v)?,
            None => DEFAULT_AUTH_SESSION_TTL_SECS,
        };
        let sso_header = var("SSO_TOKEN_HEADER").unwrap_or_else(|| DEFAULT_SSO_TOKEN_HEADER.into());
        let share_header =
            var("SHARE_TOKEN_HEADER").unwrap_or_else(|| DEFAULT_SHARE_TOKEN_HEADER.into());

        let auth = AuthSettings::new(secret)
            .map_err(|e| ConfigError::Invalid {
                var: "APP_SECRET",
                message: e.to_string(),
            })?
            .with_headers(&sso_header, &share_header)
            .map_err(|e| ConfigError::Invalid {
                var: "SSO_TOKEN_HEADER / SHARE_TOKEN_HEADER",
                message: e.to_string(),
            })?
            .with_session_token_ttl(session_ttl)
            .with_auth_session_ttl_secs(auth_session_ttl);

        let sso_enabled = match var("SSO_ENABLED") {
            Some(v) => parse_bool("SSO_ENABLED", &v)?,
            None => false,
        };
        let sso = if sso_enabled {
            Some(sso_from_lookup(&var)?)
        } else {
            None
        };

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3100".into()),
            database_url: var("DATABASE_URL"),
            redis_url: var("REDIS_URL"),
            auth,
            sso,
        })
    }
}

fn sso_from_lookup(var: &impl Fn(&str) -> Option<String>) -> Result<SsoConfig, ConfigError> {
    let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));

    let mut config = SsoConfig::new(
        required("SSO_ISSUER")?,
        required("SSO_CLIENT_ID")?,
        &required("SSO_AUTH_ENDPOINT")?,
        &required("SSO_TOKEN_ENDPOINT")?,
        &required("SSO_JWKS_ENDPOINT")?,
        required("SSO_REDIRECT_URI")?,
    )
    .map_err(|e| ConfigError::Invalid {
        var: "SSO_*_ENDPOINT",
        message: e.to_string(),
    })?;

    config.client_secret = var("SSO_CLIENT_SECRET");
    config.http_timeout = match var("SSO_HTTP_TIMEOUT_SECS") {
        Some(v) => Duration::from_secs(parse_secs("SSO_HTTP_TIMEOUT_SECS", &v)?),
        None => DEFAULT_HTTP_TIMEOUT,
    };
    config.jwks_cache_ttl = match var("SSO_JWKS_CACHE_TTL_SECS") {
        Some(v) => Duration::from_secs(parse_secs("SSO_JWKS_CACHE_TTL_SECS", &v)?),
        None => DEFAULT_JWKS_CACHE_TTL,
    };
    Ok(config)
}

/// Upper bound for any configured duration: ten years.
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn parse_secs(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    let secs: u64 = value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        message: format!("expected seconds, got '{value}'"),
    })?;
    if secs > MAX_DURATION_SECS {
        return Err(ConfigError::Invalid {
            var,
            message: format!("{secs}s exceeds the maximum of {MAX_DURATION_SECS}s"),
        });
    }
    Ok(secs)
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            message: format!("expected a boolean, got '{value}'"),
        }),
    }
}
