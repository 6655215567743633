// ABOUTME: User record store abstraction consumed by the identity core
// ABOUTME: In-memory and SQLite backends with atomic lockout primitives
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

use crate::models::{AuthProvider, LockoutOutcome, LockoutPolicy, NewUser, User, UserUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sublow_core::errors::{AppError, AppResult, ErrorCode};
use uuid::Uuid;

/// Process-local store
pub mod memory;
/// SQLite store
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryUserStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteUserStore;

const PROVIDER_ID_CONFLICT: &str = "provider_id";

/// Error for a provider subject already linked to a different user
#[must_use]
pub fn provider_id_conflict(provider: AuthProvider) -> AppError {
    AppError::already_exists(format!("{provider} identity linked to another user"))
        .with_details(serde_json::json!({ "conflict": PROVIDER_ID_CONFLICT }))
}

/// Whether `error` came from a provider id uniqueness violation rather than
/// a duplicate email
#[must_use]
pub fn is_provider_id_conflict(error: &AppError) -> bool {
    error.code == ErrorCode::ResourceAlreadyExists
        && error.details.get("conflict").and_then(serde_json::Value::as_str)
            == Some(PROVIDER_ID_CONFLICT)
}

/// Transactional store of user records
///
/// Implementations must make `record_failed_login` and
/// `record_successful_login` single atomic steps per user id. Two concurrent
/// failures must never read the same pre-increment counter.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by email, case-insensitively
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Look up a user by id
    async fn find_user_by_id(&self, id: Uuid) -> AppResult<Option<User>>;

    /// Insert a user
    ///
    /// # Errors
    ///
    /// Fails with `ResourceAlreadyExists` when the email is taken, or with
    /// [`provider_id_conflict`] when a provider id belongs to another user
    async fn create_user(&self, new_user: NewUser, now: DateTime<Utc>) -> AppResult<User>;

    /// Apply a partial update and return the updated record
    ///
    /// # Errors
    ///
    /// Fails with `ResourceNotFound` when the user does not exist, or with
    /// [`provider_id_conflict`] when a provider id belongs to another user
    async fn update_user(&self, id: Uuid, update: UserUpdate, now: DateTime<Utc>)
        -> AppResult<User>;

    /// Atomically replace the refresh token fingerprint if it still equals
    /// `expected`
    ///
    /// Returns `false` when the stored value differs, which means the
    /// presented token was already rotated, logged out, or never issued.
    ///
    /// # Errors
    ///
    /// Fails with `ResourceNotFound` when the user does not exist
    async fn swap_refresh_token_hash(
        &self,
        id: Uuid,
        expected: &str,
        replacement: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Atomically apply one failed password attempt
    ///
    /// # Errors
    ///
    /// Fails with `ResourceNotFound` when the user does not exist
    async fn record_failed_login(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> AppResult<LockoutOutcome>;

    /// Atomically reset the failure counter and stamp the login time
    ///
    /// Returns `false` without changing anything when a lock is active at
    /// `now`.
    ///
    /// # Errors
    ///
    /// Fails with `ResourceNotFound` when the user does not exist
    async fn record_successful_login(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool>;
}
