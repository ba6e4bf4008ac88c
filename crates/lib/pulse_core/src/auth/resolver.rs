//! Request credential resolution.
//!
//! Credentials come from three headers: `Authorization: Bearer <session
//! token>`, the SSO identity token header and the share token header. The
//! first principal found wins, in this order:
//!
//! 1. SSO identity token (when SSO is configured)
//! 2. `userId` claim of the bearer token
//! 3. `authKey` claim of the bearer token, via the session store
//!
//! Every credential failure is a miss; nothing here fails a request.

use std::sync::Arc;

use http::{HeaderMap, HeaderName};
use http::header::AUTHORIZATION;
use tracing::{debug, warn};

use super::repository::PrincipalRepository;
use super::session::SessionStore;
use super::settings::AuthSettings;
use super::sso::SsoClient;
use super::token::TokenCodec;
use crate::models::auth::{AuthContext, Principal, SessionClaims};

/// Raw credentials presented on a request. Empty header values are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCredentials {
    pub bearer: Option<String>,
    pub sso_token: Option<String>,
    pub share_token: Option<String>,
}

impl RequestCredentials {
    pub fn from_headers(headers: &HeaderMap, settings: &AuthSettings) -> Self {
        let header = |name: &HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        // Segment after the first space; the scheme itself is not checked.
        let bearer = header(&AUTHORIZATION)
            .and_then(|v| v.split(' ').nth(1).map(str::to_string))
            .filter(|v| !v.is_empty());

        Self {
            bearer,
            sso_token: header(&settings.sso_token_header),
            share_token: header(&settings.share_token_header),
        }
    }
}

/// Resolves request credentials to an [`AuthContext`].
#[derive(Clone)]
pub struct AuthResolver {
    settings: AuthSettings,
    codec: Arc<TokenCodec>,
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn PrincipalRepository>,
    sso: Option<Arc<SsoClient>>,
}

impl AuthResolver {
    pub fn new(
        settings: &AuthSettings,
        codec: Arc<TokenCodec>,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn PrincipalRepository>,
    ) -> Self {
        Self {
            settings: settings.clone(),
            codec,
            sessions,
            users,
            sso: None,
        }
    }

    /// Enable SSO identity-token resolution.
    pub fn with_sso(mut self, sso: Arc<SsoClient>) -> Self {
        self.sso = Some(sso);
        self
    }

    /// Resolve the credentials carried by `headers`.
    ///
    /// `None` when neither a principal nor a share claim could be established.
    pub async fn check_auth(&self, headers: &HeaderMap) -> Option<AuthContext> {
        self.check_credentials(RequestCredentials::from_headers(headers, &self.settings))
            .await
    }

    pub async fn check_credentials(&self, creds: RequestCredentials) -> Option<AuthContext> {
        let claims = creds
            .bearer
            .as_deref()
            .and_then(|token| match self.codec.verify_session(token) {
                Ok(claims) => Some(claims),
                Err(e) => {
                    debug!(error = %e, "bearer token rejected");
                    None
                }
            });

        let share = creds
            .share_token
            .as_deref()
            .and_then(|token| match self.codec.verify_share(token) {
                Ok(claims) => Some(claims),
                Err(e) => {
                    debug!(error = %e, "share token rejected");
                    None
                }
            });

        let mut principal = match (&self.sso, creds.sso_token.as_deref()) {
            (Some(sso), Some(token)) => sso.validate_sso_token(token).await,
            _ => None,
        };
        if principal.is_none()
            && let Some(claims) = &claims
        {
            principal = self.principal_from_claims(claims).await;
        }

        if principal.is_none() && share.is_none() {
            return None;
        }

        Some(AuthContext {
            token: creds.bearer,
            sso_token: creds.sso_token,
            auth_key: claims.and_then(|c| c.auth_key),
            share,
            principal: principal.map(Into::into),
        })
    }

    async fn principal_from_claims(&self, claims: &SessionClaims) -> Option<Principal> {
        if let Some(user_id) = &claims.user_id {
            return self.find_active(user_id).await;
        }

        let auth_key = claims.auth_key.as_deref()?;
        if !self.sessions.enabled() {
            return None;
        }
        let payload = match self.sessions.get(auth_key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("auth key not found in session store");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "session store lookup failed");
                return None;
            }
        };
        self.find_active(payload.user_id.as_deref()?).await
    }

    async fn find_active(&self, id: &str) -> Option<Principal> {
        match self.users.find_by_id(id).await {
            Ok(Some(principal)) if !principal.is_deleted() => Some(principal),
            Ok(Some(_)) => {
                debug!(principal_id = id, "principal is deleted");
                None
            }
            Ok(None) => {
                debug!(principal_id = id, "principal not found");
                None
            }
            Err(e) => {
                warn!(error = %e, "principal lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use http::HeaderValue;

    use super::*;
    use crate::auth::repository::{MemoryPrincipalRepository, RepositoryError};
    use crate::auth::session::{DisabledSessionStore, MemorySessionStore, StoreError, save_auth};
    use crate::models::auth::{
        NewPrincipal, PrincipalUpdate, Role, SessionPayload, ShareClaims,
    };
    use crate::testing::{MockIdp, MockIdpBehavior, identity_claims, jwks, mint_identity_token};

    const SECRET: &str = "resolver-secret";

    struct Fixture {
        settings: AuthSettings,
        codec: Arc<TokenCodec>,
        repo: Arc<MemoryPrincipalRepository>,
    }

    impl Fixture {
        fn new() -> Self {
            let settings = AuthSettings::new(SECRET).unwrap();
            Self {
                codec: Arc::new(TokenCodec::new(&settings)),
                settings,
                repo: Arc::new(MemoryPrincipalRepository::new()),
            }
        }

        fn resolver(&self, sessions: Arc<dyn SessionStore>) -> AuthResolver {
            AuthResolver::new(&self.settings, self.codec.clone(), sessions, self.repo.clone())
        }

        async fn principal(&self, email: &str, role: Role) -> Principal {
            self.repo
                .create(NewPrincipal {
                    username: email.into(),
                    email: email.into(),
                    password_hash: None,
                    role,
                    name: None,
                    picture: None,
                    sso_subject: None,
                })
                .await
                .unwrap()
        }

        fn bearer(&self, claims: &SessionClaims) -> HeaderMap {
            let token = self.codec.sign_session(claims).unwrap();
            let mut headers = HeaderMap::new();
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
            );
            headers
        }
    }

    #[test]
    fn extracts_credentials_from_headers() {
        let settings = AuthSettings::new(SECRET).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert("x-pulse-sso-token", HeaderValue::from_static("sso"));
        headers.insert("x-pulse-share-token", HeaderValue::from_static(""));

        let creds = RequestCredentials::from_headers(&headers, &settings);
        assert_eq!(
            creds,
            RequestCredentials {
                bearer: Some("abc".into()),
                sso_token: Some("sso".into()),
                share_token: None,
            }
        );
    }

    #[test]
    fn authorization_without_token_segment_is_absent() {
        let settings = AuthSettings::new(SECRET).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert_eq!(
            RequestCredentials::from_headers(&headers, &settings).bearer,
            None
        );
    }

    #[tokio::test]
    async fn no_headers_resolve_to_none() {
        let fx = Fixture::new();
        let resolver = fx.resolver(Arc::new(DisabledSessionStore));
        assert!(resolver.check_auth(&HeaderMap::new()).await.is_none());
    }

    #[tokio::test]
    async fn user_id_bearer_resolves_principal() {
        let fx = Fixture::new();
        let admin = fx.principal("root@example.com", Role::Admin).await;
        let resolver = fx.resolver(Arc::new(DisabledSessionStore));

        let ctx = resolver
            .check_auth(&fx.bearer(&SessionClaims::for_user(admin.id.clone())))
            .await
            .unwrap();
        let resolved = ctx.principal.as_ref().unwrap();
        assert_eq!(resolved.principal.id, admin.id);
        assert!(resolved.is_admin);
        assert!(ctx.is_admin());
        assert!(ctx.token.is_some());
        assert_eq!(ctx.auth_key, None);
    }

    #[tokio::test]
    async fn non_admin_is_not_admin() {
        let fx = Fixture::new();
        let user = fx.principal("ann@example.com", Role::User).await;
        let resolver = fx.resolver(Arc::new(DisabledSessionStore));

        let ctx = resolver
            .check_auth(&fx.bearer(&SessionClaims::for_user(user.id)))
            .await
            .unwrap();
        assert!(!ctx.is_admin());
    }

    #[tokio::test]
    async fn auth_key_bearer_resolves_through_store() {
        let fx = Fixture::new();
        let user = fx.principal("ann@example.com", Role::User).await;
        let store = Arc::new(MemorySessionStore::new());
        let token = save_auth(
            store.as_ref(),
            &fx.codec,
            &SessionPayload {
                user_id: Some(user.id.clone()),
                ..Default::default()
            },
            Some(3600),
        )
        .await
        .unwrap();
        let resolver = fx.resolver(store);

        let ctx = resolver
            .check_credentials(RequestCredentials {
                bearer: Some(token),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(ctx.principal.unwrap().principal.id, user.id);
        assert!(ctx.auth_key.unwrap().starts_with("auth:"));
    }

    #[tokio::test]
    async fn auth_key_bearer_with_disabled_store_is_none() {
        let fx = Fixture::new();
        let resolver = fx.resolver(Arc::new(DisabledSessionStore));
        let headers = fx.bearer(&SessionClaims::for_auth_key("auth:abc"));
        assert!(resolver.check_auth(&headers).await.is_none());
    }

    #[tokio::test]
    async fn stale_secret_tokens_are_ignored() {
        let fx = Fixture::new();
        let user = fx.principal("ann@example.com", Role::User).await;
        let old = TokenCodec::new(&AuthSettings::new("rotated-away").unwrap());
        let resolver = fx.resolver(Arc::new(DisabledSessionStore));

        let creds = RequestCredentials {
            bearer: Some(old.sign_session(&SessionClaims::for_user(user.id)).unwrap()),
            sso_token: None,
            share_token: Some(
                old.sign_share(&ShareClaims {
                    share_id: "s1".into(),
                })
                .unwrap(),
            ),
        };
        assert!(resolver.check_credentials(creds).await.is_none());
    }

    #[tokio::test]
    async fn share_token_alone_yields_context_without_principal() {
        let fx = Fixture::new();
        let resolver = fx.resolver(Arc::new(DisabledSessionStore));
        let share = fx
            .codec
            .sign_share(&ShareClaims {
                share_id: "s1".into(),
            })
            .unwrap();

        let ctx = resolver
            .check_credentials(RequestCredentials {
                share_token: Some(share),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(ctx.principal.is_none());
        assert_eq!(ctx.share.unwrap().share_id, "s1");
    }

    #[tokio::test]
    async fn share_token_in_bearer_position_is_rejected() {
        let fx = Fixture::new();
        let resolver = fx.resolver(Arc::new(DisabledSessionStore));
        let share = fx
            .codec
            .sign_share(&ShareClaims {
                share_id: "s1".into(),
            })
            .unwrap();
        let creds = RequestCredentials {
            bearer: Some(share),
            ..Default::default()
        };
        assert!(resolver.check_credentials(creds).await.is_none());
    }

    #[tokio::test]
    async fn deleted_principal_is_a_miss() {
        let fx = Fixture::new();
        let user = fx.principal("ann@example.com", Role::User).await;
        fx.repo.soft_delete(&user.id).unwrap();
        let resolver = fx.resolver(Arc::new(DisabledSessionStore));

        let headers = fx.bearer(&SessionClaims::for_user(user.id));
        assert!(resolver.check_auth(&headers).await.is_none());
    }

    #[tokio::test]
    async fn sso_token_takes_priority_over_bearer() {
        let fx = Fixture::new();
        let other = fx.principal("other@example.com", Role::Admin).await;
        let idp = MockIdp::spawn(MockIdpBehavior::default()).await;
        let sso = Arc::new(SsoClient::new(idp.sso_config(), fx.repo.clone()).unwrap());
        let resolver = fx.resolver(Arc::new(DisabledSessionStore)).with_sso(sso);

        let mut headers = fx.bearer(&SessionClaims::for_user(other.id));
        let id_token = mint_identity_token("k1", &identity_claims("sub-1", "ann@example.com"));
        headers.insert(
            "x-pulse-sso-token",
            HeaderValue::from_str(&id_token).unwrap(),
        );

        let ctx = resolver.check_auth(&headers).await.unwrap();
        let resolved = ctx.principal.unwrap();
        assert_eq!(resolved.principal.email, "ann@example.com");
        assert_eq!(resolved.principal.role, Role::User);
        assert_eq!(ctx.sso_token.as_deref(), Some(id_token.as_str()));
    }

    #[tokio::test]
    async fn failed_sso_validation_falls_through_to_bearer() {
        let fx = Fixture::new();
        let user = fx.principal("ann@example.com", Role::User).await;
        let idp = MockIdp::spawn(MockIdpBehavior::with_jwks(jwks(&["k2", "k3"]))).await;
        let sso = Arc::new(SsoClient::new(idp.sso_config(), fx.repo.clone()).unwrap());
        let resolver = fx.resolver(Arc::new(DisabledSessionStore)).with_sso(sso);

        let mut headers = fx.bearer(&SessionClaims::for_user(user.id.clone()));
        let id_token = mint_identity_token("k1", &identity_claims("sub-1", "sso@example.com"));
        headers.insert(
            "x-pulse-sso-token",
            HeaderValue::from_str(&id_token).unwrap(),
        );

        let ctx = resolver.check_auth(&headers).await.unwrap();
        assert_eq!(ctx.principal.unwrap().principal.id, user.id);
        assert!(fx.repo.find_by_email("sso@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sso_header_is_ignored_without_sso_client() {
        let fx = Fixture::new();
        let resolver = fx.resolver(Arc::new(DisabledSessionStore));
        let creds = RequestCredentials {
            sso_token: Some(mint_identity_token(
                "k1",
                &identity_claims("sub-1", "ann@example.com"),
            )),
            ..Default::default()
        };
        assert!(resolver.check_credentials(creds).await.is_none());
        assert!(fx.repo.is_empty());
    }

    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        fn enabled(&self) -> bool {
            true
        }

        async fn get(&self, _key: &str) -> Result<Option<SessionPayload>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn set(
            &self,
            _key: &str,
            _value: &SessionPayload,
            _ttl_secs: Option<u64>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn store_errors_count_as_misses() {
        let fx = Fixture::new();
        let resolver = fx.resolver(Arc::new(BrokenStore));
        let headers = fx.bearer(&SessionClaims::for_auth_key("auth:abc"));
        assert!(resolver.check_auth(&headers).await.is_none());
    }

    struct BrokenRepository;

    #[async_trait]
    impl PrincipalRepository for BrokenRepository {
        async fn find_by_id(&self, _id: &str) -> Result<Option<Principal>, RepositoryError> {
            Err(RepositoryError::Corrupt("bad row".into()))
        }

        async fn find_by_email(
            &self,
            _email: &str,
        ) -> Result<Option<Principal>, RepositoryError> {
            Err(RepositoryError::Corrupt("bad row".into()))
        }

        async fn create(&self, _fields: NewPrincipal) -> Result<Principal, RepositoryError> {
            Err(RepositoryError::Corrupt("bad row".into()))
        }

        async fn update(
            &self,
            id: &str,
            _fields: PrincipalUpdate,
        ) -> Result<Principal, RepositoryError> {
            Err(RepositoryError::NotFound(id.into()))
        }
    }

    #[tokio::test]
    async fn repository_errors_count_as_misses() {
        let fx = Fixture::new();
        let resolver = AuthResolver::new(
            &fx.settings,
            fx.codec.clone(),
            Arc::new(DisabledSessionStore),
            Arc::new(BrokenRepository),
        );
        let headers = fx.bearer(&SessionClaims::for_user("u1"));
        assert!(resolver.check_auth(&headers).await.is_none());
    }
}
