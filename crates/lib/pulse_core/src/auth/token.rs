//! Self-issued token codec (HS256 JWT) for session and share tokens.
//!
//! Both flavors share one secret and one wire format, distinguished by the
//! `typ` claim. Verified tokens are decoded into [`SessionClaims`] or
//! [`ShareClaims`]; a token of one flavor never verifies as the other.

use std::collections::HashSet;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::settings::AuthSettings;
use crate::models::auth::{SessionClaims, ShareClaims, TokenClaims};

/// Token verification and signing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("token is of the wrong kind")]
    WrongKind,

    #[error("token signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TokenKind {
    Session,
    Share,
}

/// On-the-wire claim set. Private: callers only ever see [`TokenClaims`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireClaims {
    typ: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    share_id: Option<String>,
    iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

impl WireClaims {
    fn into_claims(self) -> Result<TokenClaims, TokenError> {
        match self.typ {
            TokenKind::Session => {
                if self.share_id.is_some() || (self.user_id.is_none() && self.auth_key.is_none())
                {
                    return Err(TokenError::Malformed);
                }
                Ok(TokenClaims::Session(SessionClaims {
                    user_id: self.user_id,
                    auth_key: self.auth_key,
                }))
            }
            TokenKind::Share => match (self.share_id, self.user_id, self.auth_key) {
                (Some(share_id), None, None) => Ok(TokenClaims::Share(ShareClaims { share_id })),
                _ => Err(TokenError::Malformed),
            },
        }
    }
}

/// Signs and verifies tokens under the process-wide secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    session_ttl_secs: Option<i64>,
}

impl TokenCodec {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            encoding: EncodingKey::from_secret(settings.secret()),
            decoding: DecodingKey::from_secret(settings.secret()),
            session_ttl_secs: settings
                .session_token_ttl
                .map(|ttl| i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
        }
    }

    /// Sign session claims. At least one of `user_id` / `auth_key` is required.
    pub fn sign_session(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        if claims.user_id.is_none() && claims.auth_key.is_none() {
            return Err(TokenError::Signing("session claims are empty".into()));
        }
        let iat = Utc::now().timestamp();
        self.encode(&WireClaims {
            typ: TokenKind::Session,
            user_id: claims.user_id.clone(),
            auth_key: claims.auth_key.clone(),
            share_id: None,
            iat,
            exp: self.session_ttl_secs.map(|ttl| iat.saturating_add(ttl)),
        })
    }

    /// Sign a share token. Share tokens carry no expiry.
    pub fn sign_share(&self, claims: &ShareClaims) -> Result<String, TokenError> {
        self.encode(&WireClaims {
            typ: TokenKind::Share,
            user_id: None,
            auth_key: None,
            share_id: Some(claims.share_id.clone()),
            iat: Utc::now().timestamp(),
            exp: None,
        })
    }

    /// Verify a token of either flavor.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is optional here; it is still checked whenever present.
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = true;

        let data = decode::<WireClaims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            }
        })?;
        data.claims.into_claims()
    }

    pub fn verify_session(&self, token: &str) -> Result<SessionClaims, TokenError> {
        match self.verify(token)? {
            TokenClaims::Session(claims) => Ok(claims),
            TokenClaims::Share(_) => Err(TokenError::WrongKind),
        }
    }

    pub fn verify_share(&self, token: &str) -> Result<ShareClaims, TokenError> {
        match self.verify(token)? {
            TokenClaims::Share(claims) => Ok(claims),
            TokenClaims::Session(_) => Err(TokenError::WrongKind),
        }
    }

    fn encode(&self, claims: &WireClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(format!("jwt encode: {e}")))
    }
}
