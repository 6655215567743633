// ABOUTME: SQLite user store built on sqlx
// ABOUTME: Schema migration plus single-statement atomic lockout updates
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

//! SQLite implementation of [`UserStore`]
//!
//! Timestamps are stored as Unix milliseconds so lock expiry can be compared
//! inside SQL. Each lockout transition is one `UPDATE ... RETURNING`
//! statement, which SQLite executes atomically.

use super::{provider_id_conflict, UserStore};
use crate::models::{
    normalize_email, AuthProvider, LockoutOutcome, LockoutPolicy, NewUser, User, UserUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use sublow_core::errors::{AppError, AppResult};
use tracing::info;
use uuid::Uuid;

const USER_COLUMNS: &str = r"
    id, email, first_name, last_name, password_hash, role, auth_provider,
    is_email_verified, failed_login_attempts, locked_until, last_login_at,
    last_failed_login_at, hashed_refresh_token, google_id, apple_id, phone,
    date_of_birth, referral_code, created_at, updated_at
";

/// Lockout transitions are retried this many times if the row changes
/// between the conditional update and the follow-up read
const LOCKOUT_RETRIES: usize = 3;

/// User store persisted in SQLite
#[derive(Debug, Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    /// Connect and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the database cannot be opened,
    /// or the schema cannot be created
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::config(format!("Invalid DATABASE_URL: {e}")))?
            .create_if_missing(true);

        // An in-memory database lives and dies with its connection, so it
        // must stay on a single connection that is never recycled
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to open SQLite database: {e}")))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool without migrating
    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the users table and indexes
    ///
    /// # Errors
    ///
    /// Returns an error if a DDL statement fails
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                password_hash TEXT,
                role TEXT NOT NULL DEFAULT 'USER' CHECK (role IN ('USER', 'ADMIN', 'SYSTEM_OWNER')),
                auth_provider TEXT NOT NULL DEFAULT 'LOCAL' CHECK (auth_provider IN ('LOCAL', 'GOOGLE', 'APPLE')),
                is_email_verified BOOLEAN NOT NULL DEFAULT 0,
                failed_login_attempts INTEGER NOT NULL DEFAULT 0 CHECK (failed_login_attempts >= 0),
                locked_until INTEGER,
                last_login_at INTEGER,
                last_failed_login_at INTEGER,
                hashed_refresh_token TEXT,
                google_id TEXT UNIQUE,
                apple_id TEXT UNIQUE,
                phone TEXT,
                date_of_birth TEXT,
                referral_code TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create users table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_locked_until ON users(locked_until)")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to create index: {e}")))?;

        info!("SQLite user store migrated");
        Ok(())
    }

    async fn fetch_one_by(&self, column: &str, value: String) -> AppResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to load user: {e}")))?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn require_user(&self, id: Uuid) -> AppResult<User> {
        self.find_user_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("User {id}")))
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.fetch_one_by("email", normalize_email(email)).await
    }

    async fn find_user_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        self.fetch_one_by("id", id.to_string()).await
    }

    async fn create_user(&self, new_user: NewUser, now: DateTime<Utc>) -> AppResult<User> {
        let user = User::from_new(new_user, now);

        let result = sqlx::query(
            r"
            INSERT INTO users (
                id, email, first_name, last_name, password_hash, role, auth_provider,
                is_email_verified, failed_login_attempts, google_id, apple_id, phone,
                date_of_birth, referral_code, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9, $10, $11, $12, $13, $14, $14)
            ",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.auth_provider.as_str())
        .bind(user.is_email_verified)
        .bind(&user.google_id)
        .bind(&user.apple_id)
        .bind(&user.phone)
        .bind(user.date_of_birth)
        .bind(&user.referral_code)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => self.require_user(user.id).await,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(provider_violation(db_err.message()).unwrap_or_else(|| {
                    AppError::already_exists(format!("User with email {}", user.email))
                }))
            }
            Err(e) => Err(AppError::database(format!("Failed to create user: {e}"))),
        }
    }

    async fn update_user(
        &self,
        id: Uuid,
        update: UserUpdate,
        now: DateTime<Utc>,
    ) -> AppResult<User> {
        // Each nullable column carries a "set" flag so one statement covers
        // every combination of present fields
        let (set_password, password_hash) = split_nullable(update.password_hash);
        let (set_refresh, hashed_refresh_token) = split_nullable(update.hashed_refresh_token);

        let result = sqlx::query(
            r"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                password_hash = CASE WHEN $4 THEN $5 ELSE password_hash END,
                hashed_refresh_token = CASE WHEN $6 THEN $7 ELSE hashed_refresh_token END,
                google_id = COALESCE($8, google_id),
                apple_id = COALESCE($9, apple_id),
                is_email_verified = COALESCE($10, is_email_verified),
                updated_at = $11
            WHERE id = $1
            ",
        )
        .bind(id.to_string())
        .bind(update.first_name)
        .bind(update.last_name)
        .bind(set_password)
        .bind(password_hash)
        .bind(set_refresh)
        .bind(hashed_refresh_token)
        .bind(update.google_id)
        .bind(update.apple_id)
        .bind(update.is_email_verified)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                provider_violation(db_err.message()).unwrap_or_else(|| {
                    AppError::database(format!("Failed to update user {id}: {e}"))
                })
            }
            e => AppError::database(format!("Failed to update user {id}: {e}")),
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("User {id}")));
        }
        self.require_user(id).await
    }

    async fn swap_refresh_token_hash(
        &self,
        id: Uuid,
        expected: &str,
        replacement: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let row = sqlx::query(
            r"
            UPDATE users SET hashed_refresh_token = $3, updated_at = $4
            WHERE id = $1 AND hashed_refresh_token = $2
            RETURNING id
            ",
        )
        .bind(id.to_string())
        .bind(expected)
        .bind(replacement)
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to rotate refresh token: {e}")))?;

        if row.is_some() {
            return Ok(true);
        }
        self.require_user(id).await?;
        Ok(false)
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> AppResult<LockoutOutcome> {
        let now_ms = now.timestamp_millis();
        let lock_ms = (now + policy.lockout_duration).timestamp_millis();

        for _ in 0..LOCKOUT_RETRIES {
            // SET expressions see the pre-update row, so an elapsed lock
            // restarts the count at 1 and the threshold test uses the new count
            let row = sqlx::query(
                r"
                UPDATE users SET
                    failed_login_attempts = CASE
                        WHEN locked_until IS NOT NULL THEN 1
                        ELSE failed_login_attempts + 1
                    END,
                    locked_until = CASE
                        WHEN (CASE WHEN locked_until IS NOT NULL THEN 1 ELSE failed_login_attempts + 1 END) >= $3
                        THEN $4
                        ELSE NULL
                    END,
                    last_failed_login_at = $2,
                    updated_at = $2
                WHERE id = $1 AND (locked_until IS NULL OR locked_until <= $2)
                RETURNING failed_login_attempts, locked_until
                ",
            )
            .bind(id.to_string())
            .bind(now_ms)
            .bind(i64::from(policy.max_failed_attempts))
            .bind(lock_ms)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to record failed login: {e}")))?;

            if let Some(row) = row {
                let failed_attempts = column_u32(&row, "failed_login_attempts")?;
                let locked_until: Option<i64> = row.get("locked_until");
                return Ok(match locked_until {
                    Some(ms) => LockoutOutcome::LockedNow {
                        failed_attempts,
                        locked_until: from_millis(ms)?,
                    },
                    None => LockoutOutcome::Recorded { failed_attempts },
                });
            }

            // Nothing updated: either the user is missing or a lock is active
            let user = self.require_user(id).await?;
            if let Some(locked_until) = user.active_lock(now) {
                return Ok(LockoutOutcome::AlreadyLocked { locked_until });
            }
        }

        Err(AppError::database(format!(
            "Lockout state for user {id} kept changing during update"
        )))
    }

    async fn record_successful_login(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let now_ms = now.timestamp_millis();

        let row = sqlx::query(
            r"
            UPDATE users SET
                failed_login_attempts = 0,
                locked_until = NULL,
                last_login_at = $2,
                updated_at = $2
            WHERE id = $1 AND (locked_until IS NULL OR locked_until <= $2)
            RETURNING id
            ",
        )
        .bind(id.to_string())
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to record successful login: {e}")))?;

        if row.is_some() {
            return Ok(true);
        }
        // Surfaces not-found; otherwise a lock won the race
        self.require_user(id).await?;
        Ok(false)
    }
}

/// Provider id conflict named by a UNIQUE failure message, if any
fn provider_violation(message: &str) -> Option<AppError> {
    if message.contains("users.google_id") {
        Some(provider_id_conflict(AuthProvider::Google))
    } else if message.contains("users.apple_id") {
        Some(provider_id_conflict(AuthProvider::Apple))
    } else {
        None
    }
}

fn split_nullable(value: Option<Option<String>>) -> (bool, Option<String>) {
    match value {
        Some(inner) => (true, inner),
        None => (false, None),
    }
}

fn from_millis(ms: i64) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AppError::database(format!("Timestamp out of range: {ms}")))
}

fn optional_millis(row: &SqliteRow, column: &str) -> AppResult<Option<DateTime<Utc>>> {
    row.get::<Option<i64>, _>(column).map(from_millis).transpose()
}

fn column_u32(row: &SqliteRow, column: &str) -> AppResult<u32> {
    let value: i64 = row.get(column);
    u32::try_from(value)
        .map_err(|_| AppError::database(format!("Column {column} out of range: {value}")))
}

fn row_to_user(row: &SqliteRow) -> AppResult<User> {
    let id: String = row.get("id");
    let role: String = row.get("role");
    let auth_provider: String = row.get("auth_provider");
    let date_of_birth: Option<NaiveDate> = row.get("date_of_birth");

    Ok(User {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::database(format!("Invalid user id {id}: {e}")))?,
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password_hash: row.get("password_hash"),
        role: role.parse()?,
        auth_provider: auth_provider.parse()?,
        is_email_verified: row.get("is_email_verified"),
        failed_login_attempts: column_u32(row, "failed_login_attempts")?,
        locked_until: optional_millis(row, "locked_until")?,
        last_login_at: optional_millis(row, "last_login_at")?,
        last_failed_login_at: optional_millis(row, "last_failed_login_at")?,
        hashed_refresh_token: row.get("hashed_refresh_token"),
        google_id: row.get("google_id"),
        apple_id: row.get("apple_id"),
        phone: row.get("phone"),
        date_of_birth,
        referral_code: row.get("referral_code"),
        created_at: from_millis(row.get("created_at"))?,
        updated_at: from_millis(row.get("updated_at"))?,
    })
}
