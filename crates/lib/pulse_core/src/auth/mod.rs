//! Authentication and authorization logic.
//!
//! Token codec, session store, SSO client, credential resolver and role
//! permissions, shared by `pulse_api` and the server binary.

pub mod callback;
pub mod jwks;
pub mod permissions;
pub mod queries;
pub mod random;
pub mod repository;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod sso;
pub mod token;

use thiserror::Error;

use self::repository::RepositoryError;
use self::session::{SaveAuthError, StoreError};
use self::sso::SsoError;
use self::token::TokenError;

/// Authentication errors, by failure kind.
///
/// Component errors convert into this taxonomy at crate boundaries. None of
/// these ever escape [`resolver::AuthResolver::check_auth`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed credential")]
    MalformedCredential,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Credential expired")]
    Expired,

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Signing key not found")]
    KeyNotFound,

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InvalidSignature => AuthError::InvalidSignature,
            TokenError::Expired => AuthError::Expired,
            TokenError::Malformed | TokenError::WrongKind => AuthError::MalformedCredential,
            TokenError::Signing(msg) => AuthError::Config(msg),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::StoreUnavailable(e.to_string())
    }
}

impl From<SaveAuthError> for AuthError {
    fn from(e: SaveAuthError) -> Self {
        match e {
            SaveAuthError::Store(e) => e.into(),
            SaveAuthError::Token(e) => e.into(),
        }
    }
}

impl From<SsoError> for AuthError {
    fn from(e: SsoError) -> Self {
        match e {
            SsoError::InvalidUrl(msg) => AuthError::Config(msg),
            SsoError::Provider(msg) => AuthError::Provider(msg),
            SsoError::TokenExchangeFailed(msg) => AuthError::Provider(msg),
            SsoError::KeyNotFound => AuthError::KeyNotFound,
            SsoError::Malformed => AuthError::MalformedCredential,
            SsoError::VerificationFailed(msg) => AuthError::VerificationFailed(msg),
            SsoError::MissingClaim(claim) => {
                AuthError::VerificationFailed(format!("missing claim: {claim}"))
            }
            SsoError::PrincipalDeleted => {
                AuthError::VerificationFailed("principal is deleted".into())
            }
            SsoError::Repository(e) => AuthError::Repository(e),
        }
    }
}
