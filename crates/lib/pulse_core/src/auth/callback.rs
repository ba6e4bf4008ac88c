//! SSO callback: turns an authorization code into a Pulse session token.
//!
//! Stages run strictly in order and any failure aborts the whole flow; the
//! caller only ever receives a complete token or a coarse error tag.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use super::AuthError;
use super::session::{SessionStore, save_auth};
use super::sso::SsoClient;
use super::token::TokenCodec;
use crate::models::auth::{SessionClaims, SessionPayload};

/// Query parameters the identity provider sends to the callback URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Progress through the callback flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStage {
    RequestReceived,
    CodeValidated,
    TokenExchanged,
    IdentityVerified,
    SessionEstablished,
}

impl fmt::Display for CallbackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallbackStage::RequestReceived => "request_received",
            CallbackStage::CodeValidated => "code_validated",
            CallbackStage::TokenExchanged => "token_exchanged",
            CallbackStage::IdentityVerified => "identity_verified",
            CallbackStage::SessionEstablished => "session_established",
        })
    }
}

/// Callback failures.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("identity provider returned error: {0}")]
    ProviderDenied(String),

    #[error("authorization code missing")]
    MissingCode,

    /// `stage` is the last stage reached before the failure.
    #[error("SSO callback failed after {stage}: {source}")]
    Failed {
        stage: CallbackStage,
        #[source]
        source: AuthError,
    },
}

impl CallbackError {
    /// Coarse tag exposed to the browser as `?error=<tag>`.
    pub fn error_tag(&self) -> &'static str {
        match self {
            CallbackError::ProviderDenied(_) => "sso_failed",
            CallbackError::MissingCode => "invalid_code",
            CallbackError::Failed { .. } => "sso_error",
        }
    }

    fn at(stage: CallbackStage, source: impl Into<AuthError>) -> Self {
        CallbackError::Failed {
            stage,
            source: source.into(),
        }
    }
}

/// Run the callback flow and return the secure token for the browser.
///
/// With the session store enabled the provider tokens are saved under a new
/// auth key for `ttl_secs` and the token references that key. Without a store
/// the token carries the principal id directly.
pub async fn complete_callback(
    sso: &SsoClient,
    sessions: &dyn SessionStore,
    codec: &TokenCodec,
    params: &CallbackParams,
    ttl_secs: u64,
) -> Result<String, CallbackError> {
    if let Some(error) = params.error.as_deref().filter(|e| !e.is_empty()) {
        warn!(error, "identity provider denied authorization");
        return Err(CallbackError::ProviderDenied(error.to_string()));
    }
    let code = params
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or(CallbackError::MissingCode)?;

    let tokens = sso
        .exchange_code_for_token(code)
        .await
        .map_err(|e| CallbackError::at(CallbackStage::CodeValidated, e))?;

    let principal = sso
        .authenticate(&tokens.id_token)
        .await
        .map_err(|e| CallbackError::at(CallbackStage::TokenExchanged, e))?;

    let token = if sessions.enabled() {
        let payload = SessionPayload {
            user_id: Some(principal.id.clone()),
            sso_token: Some(tokens.access_token),
            id_token: Some(tokens.id_token),
        };
        save_auth(sessions, codec, &payload, Some(ttl_secs))
            .await
            .map_err(|e| CallbackError::at(CallbackStage::IdentityVerified, e))?
    } else {
        codec
            .sign_session(&SessionClaims::for_user(principal.id.clone()))
            .map_err(|e| CallbackError::at(CallbackStage::IdentityVerified, e))?
    };

    info!(principal_id = %principal.id, stage = %CallbackStage::SessionEstablished, "SSO login complete");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::auth::repository::{MemoryPrincipalRepository, PrincipalRepository};
    use crate::auth::session::{DisabledSessionStore, MemorySessionStore, StoreError};
    use crate::auth::settings::AuthSettings;
    use crate::testing::{MockIdp, MockIdpBehavior, identity_claims, mint_identity_token};

    fn codec() -> TokenCodec {
        TokenCodec::new(&AuthSettings::new("callback-secret").unwrap())
    }

    fn params(code: Option<&str>, error: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(str::to_string),
            state: Some("state".into()),
            error: error.map(str::to_string),
        }
    }

    async fn setup(
        behavior: MockIdpBehavior,
    ) -> (MockIdp, SsoClient, Arc<MemoryPrincipalRepository>) {
        let idp = MockIdp::spawn(behavior).await;
        let repo = Arc::new(MemoryPrincipalRepository::new());
        let client = SsoClient::new(idp.sso_config(), repo.clone()).unwrap();
        (idp, client, repo)
    }

    #[tokio::test]
    async fn success_stores_provider_tokens_under_auth_key() {
        let (_idp, sso, repo) = setup(MockIdpBehavior::default()).await;
        let store = MemorySessionStore::new();
        let codec = codec();

        let token = complete_callback(&sso, &store, &codec, &params(Some("c"), None), 3600)
            .await
            .unwrap();

        let claims = codec.verify_session(&token).unwrap();
        let key = claims.auth_key.unwrap();
        let payload = store.get(&key).await.unwrap().unwrap();
        let principal = repo.find_by_email("ann@example.com").await.unwrap().unwrap();
        assert_eq!(payload.user_id.as_deref(), Some(principal.id.as_str()));
        assert_eq!(payload.sso_token.as_deref(), Some("mock-access-token"));
        assert!(payload.id_token.is_some());
    }

    #[tokio::test]
    async fn success_without_store_issues_user_token() {
        let (_idp, sso, repo) = setup(MockIdpBehavior::default()).await;
        let codec = codec();

        let token = complete_callback(
            &sso,
            &DisabledSessionStore,
            &codec,
            &params(Some("c"), None),
            3600,
        )
        .await
        .unwrap();

        let principal = repo.find_by_email("ann@example.com").await.unwrap().unwrap();
        assert_eq!(
            codec.verify_session(&token).unwrap(),
            SessionClaims::for_user(principal.id)
        );
    }

    #[tokio::test]
    async fn provider_error_is_sso_failed() {
        let (idp, sso, _) = setup(MockIdpBehavior::default()).await;
        let err = complete_callback(
            &sso,
            &DisabledSessionStore,
            &codec(),
            &params(Some("c"), Some("access_denied")),
            3600,
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_tag(), "sso_failed");
        assert!(idp.token_requests().is_empty());
    }

    #[tokio::test]
    async fn missing_or_empty_code_is_invalid_code() {
        let (idp, sso, _) = setup(MockIdpBehavior::default()).await;
        for code in [None, Some("")] {
            let err = complete_callback(
                &sso,
                &DisabledSessionStore,
                &codec(),
                &params(code, None),
                3600,
            )
            .await
            .unwrap_err();
            assert_eq!(err.error_tag(), "invalid_code");
        }
        assert!(idp.token_requests().is_empty());
    }

    #[tokio::test]
    async fn rejected_exchange_is_sso_error() {
        let (_idp, sso, repo) = setup(MockIdpBehavior {
            token_status: 400,
            ..Default::default()
        })
        .await;
        let err = complete_callback(
            &sso,
            &DisabledSessionStore,
            &codec(),
            &params(Some("c"), None),
            3600,
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_tag(), "sso_error");
        assert!(matches!(
            err,
            CallbackError::Failed {
                stage: CallbackStage::CodeValidated,
                ..
            }
        ));
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn unverifiable_identity_token_is_sso_error() {
        let id_token = mint_identity_token("k9", &identity_claims("sub-1", "ann@example.com"));
        let (_idp, sso, repo) = setup(MockIdpBehavior::issuing(&id_token)).await;
        let store = MemorySessionStore::new();

        let err = complete_callback(&sso, &store, &codec(), &params(Some("c"), None), 3600)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CallbackError::Failed {
                stage: CallbackStage::TokenExchanged,
                source: AuthError::KeyNotFound,
            }
        ));
        assert!(repo.is_empty());
        assert!(store.is_empty());
    }

    struct FailingStore;

    #[async_trait]
    impl SessionStore for FailingStore {
        fn enabled(&self) -> bool {
            true
        }

        async fn get(&self, _key: &str) -> Result<Option<SessionPayload>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn set(
            &self,
            _key: &str,
            _value: &SessionPayload,
            _ttl_secs: Option<u64>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn store_failure_returns_no_token() {
        let (_idp, sso, _) = setup(MockIdpBehavior::default()).await;
        let err = complete_callback(&sso, &FailingStore, &codec(), &params(Some("c"), None), 3600)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CallbackError::Failed {
                stage: CallbackStage::IdentityVerified,
                source: AuthError::StoreUnavailable(_),
            }
        ));
        assert_eq!(err.error_tag(), "sso_error");
    }
}
