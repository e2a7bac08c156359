//! Repository traits and their Postgres implementations.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use uwire_config::DatabaseConfig;

use crate::entities::{IdempotencyRecord, User, ValidatedUser};
use crate::error::UserError;
use crate::password;
use crate::queries;

/// Persistent user store.
///
/// `create` hashes the password as part of its contract; callers never hand
/// a plaintext password to the database. The unique indexes on username and
/// email are the authoritative uniqueness guard.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: ValidatedUser) -> Result<User, UserError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, UserError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError>;
    /// Append a token to the row's append-only token list.
    async fn append_token(&self, id: Uuid, token: &str) -> Result<(), UserError>;
}

/// Store for idempotency records, written atomically with the side effect
/// they protect.
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    async fn find_by_key(&self, key: &str) -> Result<Option<IdempotencyRecord>, UserError>;
    async fn create(&self, record: &IdempotencyRecord) -> Result<(), UserError>;
}

/// Connect a Postgres pool with the configured limits.
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool, UserError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| UserError::upstream("database error", e))
}

/// Postgres-backed user repository.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: PgRow) -> Result<User, UserError> {
        Ok(User {
            id: row.try_get("id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password: row.try_get("password")?,
            tokens: row.try_get("tokens")?,
            is_verified: row.try_get("is_verified")?,
        })
    }

    async fn find_one(&self, query: &str, bind: &str) -> Result<Option<User>, UserError> {
        let row = sqlx::query(query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_user).transpose()
    }
}

/// Translate a unique-index violation into the conflict the caller raced on.
fn map_unique_violation(err: sqlx::Error) -> UserError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let constraint = db_err.constraint().unwrap_or_default();
            if constraint.contains("username") {
                return UserError::Conflict("username already exists".to_string());
            }
            if constraint.contains("email") {
                return UserError::Conflict("email already exists".to_string());
            }
            return UserError::Conflict("duplicate row".to_string());
        }
    }
    err.into()
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: ValidatedUser) -> Result<User, UserError> {
        let mut user = user.into_user();
        user.password = password::hash_password(&user.password)?;

        let row = sqlx::query(queries::INSERT_USER)
            .bind(user.id)
            .bind(user.created_at)
            .bind(user.updated_at)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password)
            .bind(&user.tokens)
            .bind(user.is_verified)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)?;

        Self::row_to_user(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserError> {
        let row = sqlx::query(queries::SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_user).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, UserError> {
        self.find_one(queries::SELECT_BY_USERNAME, username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        self.find_one(queries::SELECT_BY_EMAIL, email).await
    }

    async fn append_token(&self, id: Uuid, token: &str) -> Result<(), UserError> {
        sqlx::query(queries::APPEND_TOKEN)
            .bind(id)
            .bind(token)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for PgUserRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgUserRepository").finish_non_exhaustive()
    }
}

/// Postgres-backed idempotency record store.
#[derive(Clone)]
pub struct PgIdempotencyRepository {
    pool: PgPool,
}

impl PgIdempotencyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyRepository for PgIdempotencyRepository {
    async fn find_by_key(&self, key: &str) -> Result<Option<IdempotencyRecord>, UserError> {
        let row = sqlx::query(queries::FIND_IDEMPOTENCY_BY_KEY)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(IdempotencyRecord {
                id: row.try_get("id")?,
                key: row.try_get("key")?,
                request: row.try_get("request")?,
                response: row.try_get("response")?,
                status_code: row.try_get("status_code")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    async fn create(&self, record: &IdempotencyRecord) -> Result<(), UserError> {
        sqlx::query(queries::INSERT_IDEMPOTENCY)
            .bind(record.id)
            .bind(&record.key)
            .bind(&record.request)
            .bind(&record.response)
            .bind(record.status_code)
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .map_err(map_unique_violation)?;
        Ok(())
    }
}

impl std::fmt::Debug for PgIdempotencyRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgIdempotencyRepository")
            .finish_non_exhaustive()
    }
}
