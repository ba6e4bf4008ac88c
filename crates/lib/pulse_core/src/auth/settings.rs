//! Process-wide auth settings, constructed once at startup and injected.

use std::time::Duration;

use http::HeaderName;

use super::AuthError;

/// Default header carrying an SSO identity token.
pub const DEFAULT_SSO_TOKEN_HEADER: &str = "x-pulse-sso-token";
/// Default header carrying a share token.
pub const DEFAULT_SHARE_TOKEN_HEADER: &str = "x-pulse-share-token";
/// Default session token lifetime: 24 hours.
pub const DEFAULT_SESSION_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Default TTL of session store records written at SSO callback: 1 hour.
pub const DEFAULT_AUTH_SESSION_TTL_SECS: u64 = 3600;

/// Signing secret, header names and lifetimes.
#[derive(Clone)]
pub struct AuthSettings {
    secret: Vec<u8>,
    /// `exp` added to session tokens; `None` issues tokens without expiry.
    pub session_token_ttl: Option<Duration>,
    /// TTL applied to session store records created at SSO callback.
    pub auth_session_ttl_secs: u64,
    pub sso_token_header: HeaderName,
    pub share_token_header: HeaderName,
}

impl AuthSettings {
    /// Settings with defaults. An empty secret is a fatal configuration error.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, AuthError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(AuthError::Config("signing secret must not be empty".into()));
        }
        Ok(Self {
            secret,
            session_token_ttl: Some(DEFAULT_SESSION_TOKEN_TTL),
            auth_session_ttl_secs: DEFAULT_AUTH_SESSION_TTL_SECS,
            sso_token_header: HeaderName::from_static(DEFAULT_SSO_TOKEN_HEADER),
            share_token_header: HeaderName::from_static(DEFAULT_SHARE_TOKEN_HEADER),
        })
    }

    pub fn with_session_token_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.session_token_ttl = ttl;
        self
    }

    pub fn with_auth_session_ttl_secs(mut self, ttl: u64) -> Self {
        self.auth_session_ttl_secs = ttl;
        self
    }

    /// Override the credential header names.
    pub fn with_headers(mut self, sso: &str, share: &str) -> Result<Self, AuthError> {
        self.sso_token_header = parse_header(sso)?;
        self.share_token_header = parse_header(share)?;
        Ok(self)
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret", &"<redacted>")
            .field("session_token_ttl", &self.session_token_ttl)
            .field("auth_session_ttl_secs", &self.auth_session_ttl_secs)
            .field("sso_token_header", &self.sso_token_header)
            .field("share_token_header", &self.share_token_header)
            .finish()
    }
}

fn parse_header(name: &str) -> Result<HeaderName, AuthError> {
    HeaderName::try_from(name.to_ascii_lowercase())
        .map_err(|e| AuthError::Config(format!("invalid header name '{name}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(AuthSettings::new(""), Err(AuthError::Config(_))));
    }

    #[test]
    fn defaults_are_applied() {
        let settings = AuthSettings::new("s3cret").unwrap();
        assert_eq!(settings.session_token_ttl, Some(DEFAULT_SESSION_TOKEN_TTL));
        assert_eq!(settings.sso_token_header.as_str(), DEFAULT_SSO_TOKEN_HEADER);
        assert_eq!(settings.share_token_header.as_str(), DEFAULT_SHARE_TOKEN_HEADER);
    }

    #[test]
    fn header_overrides_are_normalized() {
        let settings = AuthSettings::new("s3cret")
            .unwrap()
            .with_headers("X-SSO", "X-Share")
            .unwrap();
        assert_eq!(settings.sso_token_header.as_str(), "x-sso");
        assert_eq!(settings.share_token_header.as_str(), "x-share");
    }

    #[test]
    fn debug_redacts_secret() {
        let settings = AuthSettings::new("s3cret").unwrap();
        assert!(!format!("{settings:?}").contains("s3cret"));
    }
}
