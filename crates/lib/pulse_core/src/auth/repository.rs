//! Principal repository: the narrow interface the auth core needs from user
//! storage.
//!
//! `create` must enforce email uniqueness and report a duplicate as
//! [`RepositoryError::Conflict`]; the SSO client relies on that to resolve
//! concurrent first logins for the same email.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;

use crate::models::auth::{NewPrincipal, Principal, PrincipalUpdate};

/// Principal repository errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Principal not found: {0}")]
    NotFound(String),

    #[error("Principal already exists: {0}")]
    Conflict(String),

    #[error("Invalid stored principal: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}

/// User storage as seen by the auth core.
#[async_trait]
pub trait PrincipalRepository: Send + Sync {
    /// Look up by id, including soft-deleted principals.
    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>, RepositoryError>;

    /// Look up by email, including soft-deleted principals.
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, RepositoryError>;

    async fn create(&self, fields: NewPrincipal) -> Result<Principal, RepositoryError>;

    async fn update(&self, id: &str, fields: PrincipalUpdate)
    -> Result<Principal, RepositoryError>;
}

/// In-memory repository keyed by id, with an email uniqueness index.
#[derive(Default)]
pub struct MemoryPrincipalRepository {
    by_id: DashMap<String, Principal>,
    /// email -> id
    by_email: DashMap<String, String>,
}

impl MemoryPrincipalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Mark a principal deleted.
    pub fn soft_delete(&self, id: &str) -> Result<(), RepositoryError> {
        let mut principal = self
            .by_id
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        principal.deleted_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl PrincipalRepository for MemoryPrincipalRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>, RepositoryError> {
        Ok(self.by_id.get(id).map(|p| p.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, RepositoryError> {
        let Some(id) = self.by_email.get(email).map(|id| id.clone()) else {
            return Ok(None);
        };
        self.find_by_id(&id).await
    }

    async fn create(&self, fields: NewPrincipal) -> Result<Principal, RepositoryError> {
        // The email entry is the uniqueness constraint; holding it while the
        // principal is inserted makes the pair atomic for concurrent creators.
        match self.by_email.entry(fields.email.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(fields.email)),
            Entry::Vacant(slot) => {
                let principal = Principal {
                    id: uuid::Uuid::now_v7().to_string(),
                    username: fields.username,
                    email: fields.email,
                    role: fields.role,
                    name: fields.name,
                    picture: fields.picture,
                    sso_subject: fields.sso_subject,
                    created_at: Utc::now(),
                    deleted_at: None,
                };
                self.by_id.insert(principal.id.clone(), principal.clone());
                slot.insert(principal.id.clone());
                Ok(principal)
            }
        }
    }

    async fn update(
        &self,
        id: &str,
        fields: PrincipalUpdate,
    ) -> Result<Principal, RepositoryError> {
        let mut principal = self
            .by_id
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        if let Some(role) = fields.role {
            principal.role = role;
        }
        if let Some(name) = fields.name {
            principal.name = Some(name);
        }
        if let Some(picture) = fields.picture {
            principal.picture = Some(picture);
        }
        if let Some(subject) = fields.sso_subject {
            principal.sso_subject = Some(subject);
        }
        Ok(principal.clone())
    }
}
