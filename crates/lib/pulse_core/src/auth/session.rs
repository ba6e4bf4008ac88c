//! Auth session store: opaque auth key to [`SessionPayload`] with a TTL.
//!
//! Backends: redis (feature `redis`), in-memory, or disabled. A disabled or
//! unreachable store degrades to "no session found"; it never fails a request.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use super::random::{RANDOM_KEY_LEN, random_chars};
use super::token::{TokenCodec, TokenError};
use crate::models::auth::{SessionClaims, SessionPayload};

/// Namespace tag for auth keys in a shared key-value service.
pub const AUTH_KEY_PREFIX: &str = "auth:";

/// Session store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    #[error("session payload codec: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Key-value store for auth session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Whether a backing service is configured. When `false`, lookups always miss.
    fn enabled(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<SessionPayload>, StoreError>;

    /// Store `value` under `key`, expiring after `ttl_secs` when given.
    async fn set(
        &self,
        key: &str,
        value: &SessionPayload,
        ttl_secs: Option<u64>,
    ) -> Result<(), StoreError>;
}

/// Generate a fresh auth key: `auth:` followed by 32 random alphanumerics.
pub fn generate_auth_key() -> String {
    format!("{AUTH_KEY_PREFIX}{}", random_chars(RANDOM_KEY_LEN))
}

/// Errors from [`save_auth`].
#[derive(Debug, Error)]
pub enum SaveAuthError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Persist `payload` under a new auth key and return a session token
/// referencing it.
///
/// When the store is disabled nothing is written and the returned token will
/// never resolve to a principal.
pub async fn save_auth(
    store: &dyn SessionStore,
    codec: &TokenCodec,
    payload: &SessionPayload,
    ttl_secs: Option<u64>,
) -> Result<String, SaveAuthError> {
    let auth_key = generate_auth_key();
    if store.enabled() {
        store.set(&auth_key, payload, ttl_secs.filter(|t| *t > 0)).await?;
    } else {
        debug!("session store disabled, auth payload not persisted");
    }
    Ok(codec.sign_session(&SessionClaims::for_auth_key(auth_key))?)
}

// =============================================================================
// Disabled store
// =============================================================================

/// Store used when no key-value service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSessionStore;

#[async_trait]
impl SessionStore for DisabledSessionStore {
    fn enabled(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> Result<Option<SessionPayload>, StoreError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _value: &SessionPayload,
        _ttl_secs: Option<u64>,
    ) -> Result<(), StoreError> {
        Ok(())
    }
}

// =============================================================================
// In-memory store
// =============================================================================

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Single-node store keeping JSON payloads in a `DashMap`.
///
/// Expired entries are evicted lazily on read and by [`Self::purge_expired`].
#[derive(Default)]
pub struct MemorySessionStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict expired entries.
    pub fn purge_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn a periodic eviction task.
    pub fn spawn_purge_task(
        self: &std::sync::Arc<Self>,
        every: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                store.purge_expired();
            }
        })
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn enabled(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Result<Option<SessionPayload>, StoreError> {
        // The read guard must be released before `remove_if` takes a write lock.
        let lookup = self
            .entries
            .get(key)
            .map(|entry| (!entry.is_expired()).then(|| entry.value.clone()));
        match lookup {
            Some(Some(raw)) => Ok(Some(serde_json::from_str(&raw)?)),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| entry.is_expired());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &SessionPayload,
        ttl_secs: Option<u64>,
    ) -> Result<(), StoreError> {
        let entry = MemoryEntry {
            value: serde_json::to_string(value)?,
            // A TTL too large to represent as an `Instant` never expires.
            expires_at: ttl_secs
                .and_then(|ttl| Instant::now().checked_add(Duration::from_secs(ttl))),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }
}

// =============================================================================
// Redis store
// =============================================================================

#[cfg(feature = "redis")]
pub use self::redis_store::RedisSessionStore;

#[cfg(feature = "redis")]
mod redis_store {
    use async_trait::async_trait;
    use redis::AsyncCommands;
    use tracing::info;

    use super::{SessionStore, StoreError};
    use crate::models::auth::SessionPayload;

    /// Store backed by a redis connection manager (reconnects transparently).
    #[derive(Clone)]
    pub struct RedisSessionStore {
        conn: redis::aio::ConnectionManager,
    }

    impl RedisSessionStore {
        /// Connect to `redis_url` (e.g. `redis://localhost:6379`).
        pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
            let client = redis::Client::open(redis_url)
                .map_err(|e| StoreError::Unavailable(format!("redis client: {e}")))?;
            let conn = redis::aio::ConnectionManager::new(client)
                .await
                .map_err(|e| StoreError::Unavailable(format!("redis connect: {e}")))?;
            info!("redis session store connected");
            Ok(Self { conn })
        }
    }

    #[async_trait]
    impl SessionStore for RedisSessionStore {
        fn enabled(&self) -> bool {
            true
        }

        async fn get(&self, key: &str) -> Result<Option<SessionPayload>, StoreError> {
            let mut conn = self.conn.clone();
            let raw: Option<String> = conn
                .get(key)
                .await
                .map_err(|e| StoreError::Unavailable(format!("redis GET: {e}")))?;
            raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
                .transpose()
        }

        async fn set(
            &self,
            key: &str,
            value: &SessionPayload,
            ttl_secs: Option<u64>,
        ) -> Result<(), StoreError> {
            let raw = serde_json::to_string(value)?;
            let mut conn = self.conn.clone();
            match ttl_secs {
                Some(ttl) => {
                    let _: () = conn
                        .set_ex(key, raw, ttl)
                        .await
                        .map_err(|e| StoreError::Unavailable(format!("redis SET EX: {e}")))?;
                }
                None => {
                    let _: () = conn
                        .set(key, raw)
                        .await
                        .map_err(|e| StoreError::Unavailable(format!("redis SET: {e}")))?;
                }
            }
            Ok(())
        }
    }
}
