//! SSO client: OIDC authorization-code flow and identity-token verification.
//!
//! Verified identities are resolved to local principals: looked up by email,
//! provisioned on first login, or linked to the provider subject when an
//! existing principal has none.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::jwks::JwksCache;
use super::random::{RANDOM_KEY_LEN, random_chars};
use super::repository::{PrincipalRepository, RepositoryError};
use crate::models::auth::{NewPrincipal, Principal, PrincipalUpdate, Role};

/// Scope requested from the identity provider.
pub const DEFAULT_SCOPE: &str = "openid profile email";
/// Bound on token-endpoint and JWKS requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
/// Lifetime of a cached JWKS.
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(300);

/// SSO errors.
#[derive(Debug, Error)]
pub enum SsoError {
    #[error("invalid SSO URL: {0}")]
    InvalidUrl(String),

    #[error("identity provider error: {0}")]
    Provider(String),

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("signing key not found")]
    KeyNotFound,

    #[error("malformed identity token")]
    Malformed,

    #[error("identity token verification failed: {0}")]
    VerificationFailed(String),

    #[error("identity token is missing claim: {0}")]
    MissingClaim(&'static str),

    #[error("principal is deleted")]
    PrincipalDeleted,

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Identity provider settings.
#[derive(Debug, Clone)]
pub struct SsoConfig {
    /// Expected `iss` of identity tokens.
    pub issuer: String,
    /// OAuth client id; also the expected `aud`.
    pub client_id: String,
    pub client_secret: Option<String>,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub jwks_endpoint: Url,
    /// Registered callback URL.
    pub redirect_uri: String,
    pub scope: String,
    pub http_timeout: Duration,
    pub jwks_cache_ttl: Duration,
}

impl SsoConfig {
    /// Config with default scope, timeout and cache TTL.
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        authorization_endpoint: &str,
        token_endpoint: &str,
        jwks_endpoint: &str,
        redirect_uri: impl Into<String>,
    ) -> Result<Self, SsoError> {
        Ok(Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            client_secret: None,
            authorization_endpoint: parse_url("authorization endpoint", authorization_endpoint)?,
            token_endpoint: parse_url("token endpoint", token_endpoint)?,
            jwks_endpoint: parse_url("JWKS endpoint", jwks_endpoint)?,
            redirect_uri: redirect_uri.into(),
            scope: DEFAULT_SCOPE.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            jwks_cache_ttl: DEFAULT_JWKS_CACHE_TTL,
        })
    }
}

fn parse_url(what: &str, value: &str) -> Result<Url, SsoError> {
    Url::parse(value).map_err(|e| SsoError::InvalidUrl(format!("{what} '{value}': {e}")))
}

/// Authorization redirect target plus the `state` it carries.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    pub id_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Identity claims taken from a verified identity token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoIdentity {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// OIDC client bound to one identity provider.
pub struct SsoClient {
    config: SsoConfig,
    http: reqwest::Client,
    jwks: JwksCache,
    users: Arc<dyn PrincipalRepository>,
}

impl SsoClient {
    pub fn new(config: SsoConfig, users: Arc<dyn PrincipalRepository>) -> Result<Self, SsoError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| SsoError::Provider(format!("http client: {e}")))?;
        let jwks = JwksCache::new(http.clone(), config.jwks_cache_ttl);
        Ok(Self {
            config,
            http,
            jwks,
            users,
        })
    }

    pub fn config(&self) -> &SsoConfig {
        &self.config
    }

    /// Build the provider authorization URL with a fresh `state`.
    ///
    /// `redirect_url` overrides the configured redirect URI and must be an
    /// absolute URL. The code exchange always sends the configured URI, so
    /// providers that require the two to match will reject an overridden
    /// login at the token endpoint. No network call.
    pub fn authorization_url(
        &self,
        redirect_url: Option<&str>,
    ) -> Result<AuthorizationRequest, SsoError> {
        let redirect_uri = match redirect_url {
            Some(value) => parse_url("redirect URL", value)?.to_string(),
            None => self.config.redirect_uri.clone(),
        };
        let state = random_chars(RANDOM_KEY_LEN);
        let mut url = self.config.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scope)
            .append_pair("state", &state);
        Ok(AuthorizationRequest {
            url: url.into(),
            state,
        })
    }

    /// Exchange an authorization code at the token endpoint.
    pub async fn exchange_code_for_token(&self, code: &str) -> Result<ProviderTokens, SsoError> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let resp = self
            .http
            .post(self.config.token_endpoint.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| SsoError::TokenExchangeFailed(format!("request: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(SsoError::TokenExchangeFailed(format!("HTTP {status}")));
        }

        resp.json::<ProviderTokens>()
            .await
            .map_err(|e| SsoError::Provider(format!("token response parse error: {e}")))
    }

    /// Verify an identity token's signature, issuer, audience and expiry.
    pub async fn verify_identity_token(&self, token: &str) -> Result<SsoIdentity, SsoError> {
        let header = decode_header(token).map_err(|_| SsoError::Malformed)?;
        if !matches!(header.alg, Algorithm::RS256 | Algorithm::ES256) {
            return Err(SsoError::VerificationFailed(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }
        let kid = header.kid.as_deref().ok_or(SsoError::Malformed)?;

        let jwk = self
            .jwks
            .find_key(self.config.jwks_endpoint.as_str(), kid)
            .await?;
        ensure_jwk_matches_algorithm(&jwk, header.alg)?;
        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| SsoError::VerificationFailed(format!("jwk: {e}")))?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.client_id.as_str()]);
        validation
            .required_spec_claims
            .extend(["iss".to_string(), "aud".to_string()]);

        let claims = decode::<IdentityClaims>(token, &key, &validation)
            .map_err(|e| SsoError::VerificationFailed(e.to_string()))?
            .claims;

        Ok(SsoIdentity {
            subject: claims.sub.ok_or(SsoError::MissingClaim("sub"))?,
            email: claims.email.ok_or(SsoError::MissingClaim("email"))?,
            name: claims.name,
            picture: claims.picture,
        })
    }

    /// Find, provision, or link the local principal for a verified identity.
    pub async fn resolve_principal(&self, identity: &SsoIdentity) -> Result<Principal, SsoError> {
        let existing = match self.users.find_by_email(&identity.email).await? {
            Some(principal) => principal,
            None => match self.users.create(new_sso_principal(identity)).await {
                Ok(principal) => {
                    info!(principal_id = %principal.id, "provisioned principal from SSO login");
                    return Ok(principal);
                }
                // Lost a concurrent first-login race; the winner's record is authoritative.
                Err(RepositoryError::Conflict(_)) => {
                    debug!("principal created concurrently, re-reading");
                    self.users
                        .find_by_email(&identity.email)
                        .await?
                        .ok_or_else(|| RepositoryError::NotFound(identity.email.clone()))?
                }
                Err(e) => return Err(e.into()),
            },
        };

        if existing.is_deleted() {
            return Err(SsoError::PrincipalDeleted);
        }

        match existing.sso_subject.as_deref() {
            None => {
                let linked = self
                    .users
                    .update(
                        &existing.id,
                        PrincipalUpdate {
                            sso_subject: Some(identity.subject.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;
                info!(principal_id = %linked.id, "linked principal to SSO subject");
                Ok(linked)
            }
            Some(subject) if subject != identity.subject => {
                warn!(
                    principal_id = %existing.id,
                    "SSO subject differs from the one linked to this email"
                );
                Ok(existing)
            }
            Some(_) => Ok(existing),
        }
    }

    /// Verify an identity token and resolve its principal.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, SsoError> {
        let identity = self.verify_identity_token(token).await?;
        self.resolve_principal(&identity).await
    }

    /// [`Self::authenticate`], with every failure collapsed to `None`.
    ///
    /// A failed validation must be indistinguishable from no SSO credential.
    pub async fn validate_sso_token(&self, token: &str) -> Option<Principal> {
        match self.authenticate(token).await {
            Ok(principal) => Some(principal),
            Err(e) => {
                debug!(error = %e, "SSO token validation failed");
                None
            }
        }
    }
}

fn new_sso_principal(identity: &SsoIdentity) -> NewPrincipal {
    NewPrincipal {
        username: identity.email.clone(),
        email: identity.email.clone(),
        password_hash: None,
        role: Role::DEFAULT,
        name: Some(
            identity
                .name
                .clone()
                .unwrap_or_else(|| identity.email.clone()),
        ),
        picture: identity.picture.clone(),
        sso_subject: Some(identity.subject.clone()),
    }
}

fn ensure_jwk_matches_algorithm(jwk: &Jwk, alg: Algorithm) -> Result<(), SsoError> {
    // Providers often omit `alg` on keys; when present it must agree.
    match (jwk.common.key_algorithm, alg) {
        (None, _)
        | (Some(KeyAlgorithm::RS256), Algorithm::RS256)
        | (Some(KeyAlgorithm::ES256), Algorithm::ES256) => {}
        _ => return Err(SsoError::VerificationFailed("jwk alg mismatch".into())),
    }
    match (&jwk.algorithm, alg) {
        (AlgorithmParameters::RSA(_), Algorithm::RS256) => Ok(()),
        (AlgorithmParameters::EllipticCurve(params), Algorithm::ES256)
            if params.curve == EllipticCurve::P256 =>
        {
            Ok(())
        }
        _ => Err(SsoError::VerificationFailed("jwk kty mismatch".into())),
    }
}
