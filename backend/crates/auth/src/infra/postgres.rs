//! PostgreSQL Identity Store
//!
//! Uniqueness of `email` and `external_id` is enforced by the
//! `users_email_key` / `users_external_id_key` constraints, so a create that
//! loses a race fails inside the database rather than in a pre-check.
//!
//! Transient failures (serialization, deadlock, lock timeout, pool timeout)
//! are retried exactly once. Multi-statement operations run in a transaction
//! that rolls back when dropped uncommitted.

use std::future::Future;

use chrono::{DateTime, Utc};
use kernel::error::conversions::{DbErrorClass, classify_sqlx};
use platform::password::HashedPassword;
use sqlx::PgPool;

use crate::domain::entity::{
    auth_event::{AuthEvent, AuthEventStats},
    user::{NewUser, User, UserUpdate},
};
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::{
    app_fingerprint::AppFingerprint, email::Email, external_id::ExternalId, user_id::UserId,
};
use crate::error::{AuthError, AuthResult};

const EMAIL_CONSTRAINT: &str = "users_email_key";
const EXTERNAL_ID_CONSTRAINT: &str = "users_external_id_key";

/// PostgreSQL-backed identity store
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_user(&self, new_user: &NewUser) -> Result<UserRow, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (
                email,
                hashed_password,
                name,
                external_id,
                provider
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, hashed_password, name, external_id, provider, created_at
            "#,
        )
        .bind(new_user.email().as_str())
        .bind(new_user.hashed_password().map(HashedPassword::as_phc_string))
        .bind(new_user.name())
        .bind(new_user.external_id().map(ExternalId::as_str))
        .bind(new_user.provider().as_str())
        .fetch_one(&self.pool)
        .await
    }

    async fn select_user_by_email(&self, email: &Email) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, hashed_password, name, external_id, provider, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
    }

    async fn select_user_by_id(&self, user_id: UserId) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, hashed_password, name, external_id, provider, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await
    }

    async fn select_user_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, hashed_password, name, external_id, provider, created_at
            FROM users
            WHERE external_id = $1
            "#,
        )
        .bind(external_id.as_str())
        .fetch_optional(&self.pool)
        .await
    }

    async fn update_user_tx(
        &self,
        user_id: UserId,
        update: &UserUpdate,
    ) -> Result<Option<UserRow>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id.get())
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(None);
        }

        // COALESCE keeps the stored value for every field not being set
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                name = COALESCE($3, name),
                hashed_password = COALESCE($4, hashed_password),
                external_id = COALESCE($5, external_id)
            WHERE id = $1
            RETURNING id, email, hashed_password, name, external_id, provider, created_at
            "#,
        )
        .bind(user_id.get())
        .bind(update.email.as_ref().map(Email::as_str))
        .bind(update.name.as_deref())
        .bind(update.hashed_password.as_ref().map(HashedPassword::as_phc_string))
        .bind(update.external_id.as_ref().map(ExternalId::as_str))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(row))
    }

    async fn delete_user_row(&self, user_id: UserId) -> Result<bool, sqlx::Error> {
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id.get())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    async fn insert_event(
        &self,
        fingerprint: &AppFingerprint,
        event_type: &str,
    ) -> Result<EventRow, sqlx::Error> {
        sqlx::query_as::<_, EventRow>(
            r#"
            INSERT INTO auth_events (app_fingerprint, event_type)
            VALUES ($1, $2)
            RETURNING id, app_fingerprint, event_type, created_at
            "#,
        )
        .bind(fingerprint.as_str())
        .bind(event_type)
        .fetch_one(&self.pool)
        .await
    }

    async fn select_events(
        &self,
        fingerprint: Option<&AppFingerprint>,
        limit: u32,
    ) -> Result<Vec<EventRow>, sqlx::Error> {
        sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, app_fingerprint, event_type, created_at
            FROM auth_events
            WHERE ($1::text IS NULL OR app_fingerprint = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(fingerprint.map(AppFingerprint::as_str))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
    }

    async fn select_stats(&self) -> Result<StatsRow, sqlx::Error> {
        sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM auth_events) AS total_events,
                (SELECT COUNT(DISTINCT app_fingerprint) FROM auth_events) AS unique_apps,
                (SELECT COUNT(*) FROM users) AS total_users
            "#,
        )
        .fetch_one(&self.pool)
        .await
    }
}

// ============================================================================
// Identity Store Implementation
// ============================================================================

impl IdentityStore for PgIdentityStore {
    async fn create_user(&self, new_user: NewUser) -> AuthResult<User> {
        let new_user = &new_user;
        retry_once("create_user", move || self.insert_user(new_user))
            .await?
            .into_user()
    }

    async fn get_user_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        retry_once("get_user_by_email", move || self.select_user_by_email(email))
            .await?
            .map(UserRow::into_user)
            .transpose()
    }

    async fn get_user_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        retry_once("get_user_by_id", move || self.select_user_by_id(user_id))
            .await?
            .map(UserRow::into_user)
            .transpose()
    }

    async fn get_user_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> AuthResult<Option<User>> {
        retry_once("get_user_by_external_id", move || {
            self.select_user_by_external_id(external_id)
        })
        .await?
        .map(UserRow::into_user)
        .transpose()
    }

    async fn update_user(&self, user_id: UserId, update: UserUpdate) -> AuthResult<User> {
        let update = &update;
        retry_once("update_user", move || self.update_user_tx(user_id, update))
            .await?
            .ok_or(AuthError::NotFound)?
            .into_user()
    }

    async fn delete_user(&self, user_id: UserId) -> AuthResult<bool> {
        let deleted = retry_once("delete_user", move || self.delete_user_row(user_id)).await?;
        if deleted {
            tracing::info!(user_id = %user_id, "User deleted");
        }
        Ok(deleted)
    }

    async fn record_auth_event(&self, app_id: &str, event_type: &str) -> AuthResult<AuthEvent> {
        let fingerprint = AppFingerprint::of(app_id);
        let fingerprint = &fingerprint;
        retry_once("record_auth_event", move || {
            self.insert_event(fingerprint, event_type)
        })
        .await
        .map(EventRow::into_event)
    }

    async fn list_auth_events(
        &self,
        app_id: Option<&str>,
        limit: u32,
    ) -> AuthResult<Vec<AuthEvent>> {
        let fingerprint = app_id.map(AppFingerprint::of);
        let fingerprint = fingerprint.as_ref();
        let rows = retry_once("list_auth_events", move || {
            self.select_events(fingerprint, limit)
        })
        .await?;

        Ok(rows.into_iter().map(EventRow::into_event).collect())
    }

    async fn auth_event_stats(&self) -> AuthResult<AuthEventStats> {
        let row = retry_once("auth_event_stats", move || self.select_stats()).await?;

        Ok(AuthEventStats {
            total_events: row.total_events,
            unique_apps: row.unique_apps,
            total_users: row.total_users,
        })
    }
}

// ============================================================================
// Retry and error mapping
// ============================================================================

/// Run `attempt`, running it a second time only after a transient failure.
async fn retry_once<T, F, Fut>(op: &'static str, mut attempt: F) -> AuthResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    match attempt().await {
        Ok(value) => Ok(value),
        Err(e) if classify_sqlx(&e) == DbErrorClass::Transient => {
            tracing::warn!(op, error = %e, "Transient storage error, retrying once");
            attempt().await.map_err(map_db_error)
        }
        Err(e) => Err(map_db_error(e)),
    }
}

fn map_db_error(err: sqlx::Error) -> AuthError {
    match classify_sqlx(&err) {
        DbErrorClass::UniqueViolation { constraint } => match constraint.as_deref() {
            Some(EMAIL_CONSTRAINT) => AuthError::DuplicateEmail,
            Some(EXTERNAL_ID_CONSTRAINT) => AuthError::DuplicateExternalId,
            _ => AuthError::Internal(format!("unexpected unique violation: {err}")),
        },
        _ => AuthError::StorageUnavailable(err.to_string()),
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    hashed_password: Option<String>,
    name: Option<String>,
    external_id: Option<String>,
    provider: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> AuthResult<User> {
        Ok(User {
            id: UserId::from_raw(self.id),
            email: Email::from_db(self.email),
            hashed_password: self.hashed_password.map(HashedPassword::from_db),
            name: self.name,
            external_id: self.external_id.map(ExternalId::from_db),
            provider: self.provider.parse()?,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    app_fingerprint: String,
    event_type: String,
    created_at: DateTime<Utc>,
}

impl EventRow {
    fn into_event(self) -> AuthEvent {
        AuthEvent {
            id: self.id,
            app_fingerprint: AppFingerprint::from_db(self.app_fingerprint),
            event_type: self.event_type,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    total_events: i64,
    unique_apps: i64,
    total_users: i64,
}
