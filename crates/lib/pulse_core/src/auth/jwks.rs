//! Identity provider signing keys (JWKS) with a time-bounded cache.
//!
//! Key sets are cached per JWKS URL. A `kid` missing from a cached set forces
//! one refetch before failing with [`SsoError::KeyNotFound`], so provider key
//! rotation is picked up without waiting for the TTL. A zero TTL disables
//! caching and every lookup fetches a fresh set.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use tracing::{debug, warn};

use super::sso::SsoError;

#[derive(Debug, Clone)]
struct CachedJwks {
    jwks: JwkSet,
    /// `None` when the TTL is too large to represent.
    expires_at: Option<Instant>,
}

/// JWKS fetcher and cache. Safe to share between concurrent requests; no lock
/// is held across a fetch.
#[derive(Debug)]
pub struct JwksCache {
    client: reqwest::Client,
    ttl: Duration,
    entries: DashMap<String, CachedJwks>,
}

impl JwksCache {
    pub fn new(client: reqwest::Client, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Find the key with id `kid` in the set published at `jwks_url`.
    pub async fn find_key(&self, jwks_url: &str, kid: &str) -> Result<Jwk, SsoError> {
        if let Some(jwks) = self.cached(jwks_url)
            && let Some(key) = find_jwk(&jwks, kid)
        {
            return Ok(key.clone());
        }

        let jwks = self.refresh(jwks_url).await?;
        match find_jwk(&jwks, kid) {
            Some(key) => Ok(key.clone()),
            None => {
                debug!(kid, "signing key not present in refreshed JWKS");
                Err(SsoError::KeyNotFound)
            }
        }
    }

    fn cached(&self, jwks_url: &str) -> Option<JwkSet> {
        let entry = self.entries.get(jwks_url)?;
        let fresh = entry.expires_at.is_none_or(|at| at > Instant::now());
        fresh.then(|| entry.jwks.clone())
    }

    async fn refresh(&self, jwks_url: &str) -> Result<JwkSet, SsoError> {
        // Fetch failures (transport, timeout, status, body) count as a missing key.
        let resp = self.client.get(jwks_url).send().await.map_err(|e| {
            warn!(error = %e, "JWKS fetch failed");
            SsoError::KeyNotFound
        })?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "JWKS endpoint returned an error status");
            return Err(SsoError::KeyNotFound);
        }
        let jwks: JwkSet = resp.json().await.map_err(|e| {
            warn!(error = %e, "JWKS response could not be parsed");
            SsoError::KeyNotFound
        })?;

        if !self.ttl.is_zero() {
            self.entries.insert(
                jwks_url.to_string(),
                CachedJwks {
                    jwks: jwks.clone(),
                    expires_at: Instant::now().checked_add(self.ttl),
                },
            );
        }
        Ok(jwks)
    }
}

fn find_jwk<'a>(jwks: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    jwks.keys
        .iter()
        .find(|key| key.common.key_id.as_deref() == Some(kid))
}
