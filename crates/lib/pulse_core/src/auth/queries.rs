//! PostgreSQL principal repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::repository::{PrincipalRepository, RepositoryError};
use crate::models::auth::{NewPrincipal, Principal, PrincipalUpdate, Role};

const PRINCIPAL_COLUMNS: &str =
    "id::text, username, email, role, name, picture, sso_subject, created_at, deleted_at";

type PrincipalRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

fn principal_from_row(row: PrincipalRow) -> Result<Principal, RepositoryError> {
    let (id, username, email, role, name, picture, sso_subject, created_at, deleted_at) = row;
    let role = role
        .parse::<Role>()
        .map_err(|e| RepositoryError::Corrupt(format!("principal {id}: {e}")))?;
    Ok(Principal {
        id,
        username,
        email,
        role,
        name,
        picture,
        sso_subject,
        created_at,
        deleted_at,
    })
}

/// Unique constraint on `users.email`, declared in `0001_users.sql`.
const EMAIL_UNIQUE_CONSTRAINT: &str = "users_email_key";

/// Only a duplicate email is a `Conflict`: callers re-read by email after one.
fn is_email_conflict(constraint: Option<&str>) -> bool {
    constraint == Some(EMAIL_UNIQUE_CONSTRAINT)
}

fn map_insert_error(e: sqlx::Error, email: &str) -> RepositoryError {
    match e {
        sqlx::Error::Database(db)
            if db.is_unique_violation() && is_email_conflict(db.constraint()) =>
        {
            RepositoryError::Conflict(email.to_string())
        }
        other => RepositoryError::DbError(other),
    }
}

/// `users` table access through a shared pool.
#[derive(Clone)]
pub struct PgPrincipalRepository {
    pool: PgPool,
}

impl PgPrincipalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalRepository for PgPrincipalRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Principal>, RepositoryError> {
        // Ids are opaque to callers; anything that is not a UUID cannot exist.
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(principal_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, RepositoryError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(principal_from_row).transpose()
    }

    async fn create(&self, fields: NewPrincipal) -> Result<Principal, RepositoryError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "INSERT INTO users (username, email, password_hash, role, name, picture, sso_subject) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {PRINCIPAL_COLUMNS}"
        ))
        .bind(&fields.username)
        .bind(&fields.email)
        .bind(&fields.password_hash)
        .bind(fields.role.as_str())
        .bind(&fields.name)
        .bind(&fields.picture)
        .bind(&fields.sso_subject)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &fields.email))?;
        principal_from_row(row)
    }

    async fn update(
        &self,
        id: &str,
        fields: PrincipalUpdate,
    ) -> Result<Principal, RepositoryError> {
        let uuid =
            Uuid::parse_str(id).map_err(|_| RepositoryError::NotFound(id.to_string()))?;
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "UPDATE users SET \
               role = COALESCE($2, role), \
               name = COALESCE($3, name), \
               picture = COALESCE($4, picture), \
               sso_subject = COALESCE($5, sso_subject), \
               updated_at = now() \
             WHERE id = $1 \
             RETURNING {PRINCIPAL_COLUMNS}"
        ))
        .bind(uuid)
        .bind(fields.role.map(|r| r.as_str()))
        .bind(&fields.name)
        .bind(&fields.picture)
        .bind(&fields.sso_subject)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => principal_from_row(row),
            None => Err(RepositoryError::NotFound(id.to_string())),
        }
    }
}
