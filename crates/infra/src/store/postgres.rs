//! Postgres-backed credential store.
//!
//! ## Atomicity
//!
//! Every operation is a single SQL statement, so each record mutation is atomic
//! without application-level locks:
//!
//! - `apply_attempt` is one `UPDATE ... WHERE id = $1 AND active AND NOT locked
//!   AND failed_attempts = $3 RETURNING ...`; zero rows means the record moved
//!   on, and only then is it read back to report `Stale`;
//! - `upsert_token` uses `INSERT ... ON CONFLICT (identity_id, kind) DO UPDATE`,
//!   assigning a new `id` so a superseded token can no longer be deleted (consumed);
//! - `delete_token` reports whether a row was removed.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError |
//! |-----------------------|------------|
//! | `23505` (unique violation) | `Conflict` |
//! | `23503` (foreign key violation) | `NotFound` |
//! | anything else | `Backend` |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use learnhub_auth::{
    AttemptMutation, Email, Identity, IdentityPatch, NewIdentity, RoleSet, SecurityToken,
    TokenKind, TokenSecret,
};
use learnhub_core::{IdentityId, SecurityTokenId};

use super::{AttemptOutcome, CredentialStore, IdentityFilter, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_identity.sql");

const IDENTITY_COLUMNS: &str = "id, email, password_hash, firstname, lastname, avatar, roles, \
     active, verified, locked, failed_attempts, last_login, created_at, updated_at";

/// Postgres-backed credential store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`.
#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn fetch_identity(&self, sql: &str, operation: &str, bind: Uuid) -> Result<Identity, StoreError> {
        let row = sqlx::query(sql)
            .bind(bind)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?
            .ok_or(StoreError::NotFound)?;
        identity_from_row(&row)
    }
}

#[async_trait::async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self, new), fields(identity_id = %new.id), err)]
    async fn insert_identity(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let roles: Vec<&str> = new.roles.iter().map(|r| r.as_str()).collect();
        let sql = format!(
            "INSERT INTO identities ({IDENTITY_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, FALSE, FALSE, 0, NULL, $8, $8) \
             RETURNING {IDENTITY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(new.id.as_uuid())
            .bind(new.email.as_str())
            .bind(&new.password_hash)
            .bind(&new.firstname)
            .bind(&new.lastname)
            .bind(new.avatar.as_deref())
            .bind(roles)
            .bind(new.created_at)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_identity", e))?;
        identity_from_row(&row)
    }

    #[instrument(skip(self), fields(identity_id = %id), err)]
    async fn get_identity(&self, id: IdentityId) -> Result<Identity, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1");
        self.fetch_identity(&sql, "get_identity", *id.as_uuid()).await
    }

    #[instrument(skip(self, email), err)]
    async fn get_identity_by_email(&self, email: &Email) -> Result<Identity, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE email = $1");
        let row = sqlx::query(&sql)
            .bind(email.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_identity_by_email", e))?
            .ok_or(StoreError::NotFound)?;
        identity_from_row(&row)
    }

    #[instrument(skip(self, patch), fields(identity_id = %id), err)]
    async fn update_identity(
        &self,
        id: IdentityId,
        patch: IdentityPatch,
        at: DateTime<Utc>,
    ) -> Result<Identity, StoreError> {
        let (set_avatar, avatar) = match patch.avatar {
            Some(avatar) => (true, avatar),
            None => (false, None),
        };
        let sql = format!(
            "UPDATE identities SET \
                password_hash = COALESCE($2, password_hash), \
                active = COALESCE($3, active), \
                verified = COALESCE($4, verified), \
                locked = COALESCE($5, locked), \
                failed_attempts = CASE WHEN $6 THEN 0 ELSE failed_attempts END, \
                firstname = COALESCE($7, firstname), \
                lastname = COALESCE($8, lastname), \
                avatar = CASE WHEN $9 THEN $10 ELSE avatar END, \
                updated_at = $11 \
             WHERE id = $1 \
             RETURNING {IDENTITY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(patch.password_hash)
            .bind(patch.active)
            .bind(patch.verified)
            .bind(patch.locked)
            .bind(patch.reset_failed_attempts)
            .bind(patch.firstname)
            .bind(patch.lastname)
            .bind(set_avatar)
            .bind(avatar)
            .bind(at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_identity", e))?
            .ok_or(StoreError::NotFound)?;
        identity_from_row(&row)
    }

    #[instrument(skip(self), fields(identity_id = %id, mutation = ?mutation), err)]
    async fn apply_attempt(
        &self,
        id: IdentityId,
        mutation: AttemptMutation,
        seen_failed_attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<AttemptOutcome, StoreError> {
        let set = match mutation {
            AttemptMutation::RecordFailure => "failed_attempts = failed_attempts + 1",
            AttemptMutation::RecordSuccess => "failed_attempts = 0, last_login = $2",
            AttemptMutation::Lock => "active = FALSE, locked = TRUE",
        };
        let sql = format!(
            "UPDATE identities SET {set}, updated_at = $2 \
             WHERE id = $1 AND active AND NOT locked AND failed_attempts = $3 \
             RETURNING {IDENTITY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(at)
            .bind(i64::from(seen_failed_attempts))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_attempt", e))?;
        match row {
            Some(row) => identity_from_row(&row).map(AttemptOutcome::Applied),
            None => self.get_identity(id).await.map(AttemptOutcome::Stale),
        }
    }

    #[instrument(skip(self), fields(identity_id = %id), err)]
    async fn delete_identity(&self, id: IdentityId) -> Result<(), StoreError> {
        // security_tokens rows go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM identities WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_identity", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_identities(&self, filter: IdentityFilter) -> Result<Vec<Identity>, StoreError> {
        let (role, only): (Option<&str>, Option<Uuid>) = match filter {
            IdentityFilter::All => (None, None),
            IdentityFilter::WithRole(role) => (Some(role.as_str()), None),
            IdentityFilter::Only(id) => (None, Some(*id.as_uuid())),
        };
        let sql = format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities \
             WHERE ($1::text IS NULL OR $1 = ANY(roles)) \
               AND ($2::uuid IS NULL OR id = $2) \
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(role)
            .bind(only)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_identities", e))?;
        rows.iter().map(identity_from_row).collect()
    }

    #[instrument(skip(self, secret), fields(identity_id = %identity_id, kind = %kind), err)]
    async fn upsert_token(
        &self,
        identity_id: IdentityId,
        kind: TokenKind,
        secret: TokenSecret,
        created_at: DateTime<Utc>,
    ) -> Result<SecurityToken, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO security_tokens (id, identity_id, kind, secret, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (identity_id, kind) DO UPDATE
                SET id = EXCLUDED.id,
                    secret = EXCLUDED.secret,
                    created_at = EXCLUDED.created_at
            RETURNING id, identity_id, kind, secret, created_at
            "#,
        )
        .bind(*SecurityTokenId::new().as_uuid())
        .bind(identity_id.as_uuid())
        .bind(kind.as_str())
        .bind(secret.expose())
        .bind(created_at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_token", e))?;
        token_from_row(&row)
    }

    #[instrument(skip(self, secret), fields(kind = %kind), err)]
    async fn get_token(&self, secret: &TokenSecret, kind: TokenKind) -> Result<SecurityToken, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, identity_id, kind, secret, created_at
            FROM security_tokens
            WHERE secret = $1 AND kind = $2
            "#,
        )
        .bind(secret.expose())
        .bind(kind.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_token", e))?
        .ok_or(StoreError::NotFound)?;
        token_from_row(&row)
    }

    #[instrument(skip(self), fields(token_id = %id), err)]
    async fn delete_token(&self, id: SecurityTokenId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM security_tokens WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_token", e))?;
        Ok(result.rows_affected() == 1)
    }
}

fn identity_from_row(row: &PgRow) -> Result<Identity, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode identity row: {e}"));

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let email: String = row.try_get("email").map_err(decode)?;
    let roles: Vec<String> = row.try_get("roles").map_err(decode)?;
    let failed_attempts: i32 = row.try_get("failed_attempts").map_err(decode)?;

    Ok(Identity {
        id: IdentityId::from_uuid(id),
        email: Email::parse(&email).map_err(|e| StoreError::Backend(format!("stored email: {e}")))?,
        password_hash: row.try_get("password_hash").map_err(decode)?,
        firstname: row.try_get("firstname").map_err(decode)?,
        lastname: row.try_get("lastname").map_err(decode)?,
        avatar: row.try_get("avatar").map_err(decode)?,
        roles: RoleSet::parse(&roles).map_err(|e| StoreError::Backend(format!("stored roles: {e}")))?,
        active: row.try_get("active").map_err(decode)?,
        verified: row.try_get("verified").map_err(decode)?,
        locked: row.try_get("locked").map_err(decode)?,
        failed_attempts: u32::try_from(failed_attempts)
            .map_err(|_| StoreError::Backend("negative failed_attempts".to_string()))?,
        last_login: row.try_get("last_login").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn token_from_row(row: &PgRow) -> Result<SecurityToken, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode token row: {e}"));

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let identity_id: Uuid = row.try_get("identity_id").map_err(decode)?;
    let kind: String = row.try_get("kind").map_err(decode)?;
    let secret: String = row.try_get("secret").map_err(decode)?;

    Ok(SecurityToken {
        id: SecurityTokenId::from_uuid(id),
        identity_id: IdentityId::from_uuid(identity_id),
        kind: kind
            .parse()
            .map_err(|e| StoreError::Backend(format!("stored token kind: {e}")))?,
        secret: TokenSecret::from_string(secret),
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(conflict_message(db_err.constraint())),
                Some("23503") => StoreError::NotFound,
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn conflict_message(constraint: Option<&str>) -> String {
    match constraint {
        Some("identities_email_key") => "email already registered".to_string(),
        Some("security_tokens_secret_key") => "token secret collision".to_string(),
        Some(other) => format!("unique constraint '{other}' violated"),
        None => "unique constraint violated".to_string(),
    }
}
