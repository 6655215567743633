// ABOUTME: Password credential validation with brute-force lockout
// ABOUTME: Checks locks before hashing and records every outcome atomically in the store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

use super::errors::{AuthError, AuthResult};
use crate::clock::Clock;
use crate::crypto::PasswordHasher;
use crate::database_plugins::UserStore;
use crate::models::{remaining_minutes, LockoutOutcome, LockoutPolicy, User};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Validates email/password pairs
#[derive(Clone)]
pub struct CredentialValidator {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
    policy: LockoutPolicy,
}

impl CredentialValidator {
    /// Create a validator
    #[must_use]
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn PasswordHasher>,
        clock: Arc<dyn Clock>,
        policy: LockoutPolicy,
    ) -> Self {
        Self {
            store,
            hasher,
            clock,
            policy,
        }
    }

    /// Check a password and apply the lockout state machine
    ///
    /// Returns the user without credential secrets on success and `None` for
    /// an unknown email, a federated-only account or a wrong password.
    ///
    /// # Errors
    ///
    /// Returns `AccountLocked` when a lock is active, including when this
    /// attempt is the one that reaches the threshold, and an internal error
    /// if the store or hasher fails
    pub async fn validate(&self, email: &str, password: &str) -> AuthResult<Option<User>> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            debug!("Login attempt for unknown email");
            return Ok(None);
        };

        let now = self.clock.now();
        if let Some(locked_until) = user.active_lock(now) {
            warn!(user_id = %user.id, %locked_until, "Login attempt on locked account");
            return Err(Self::locked(locked_until, now));
        }

        let Some(password_hash) = user.password_hash.as_deref() else {
            debug!(user_id = %user.id, "Password login attempted on federated-only account");
            return Ok(None);
        };

        if self.hasher.verify(password, password_hash).await? {
            self.record_success(user, now).await.map(Some)
        } else {
            self.record_failure(&user, now).await
        }
    }

    /// Lockout policy in force
    #[must_use]
    pub const fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    async fn record_success(&self, mut user: User, now: DateTime<Utc>) -> AuthResult<User> {
        if !self.store.record_successful_login(user.id, now).await? {
            // A concurrent failure locked the account after our lock check
            let locked_until = self
                .store
                .find_user_by_id(user.id)
                .await?
                .and_then(|fresh| fresh.active_lock(now))
                .unwrap_or(now + self.policy.lockout_duration);
            warn!(user_id = %user.id, %locked_until, "Account locked during login");
            return Err(Self::locked(locked_until, now));
        }

        user.failed_login_attempts = 0;
        user.locked_until = None;
        user.last_login_at = Some(now);
        user.updated_at = now;
        info!(user_id = %user.id, "Password verified");
        Ok(user.into_sanitized())
    }

    async fn record_failure(&self, user: &User, now: DateTime<Utc>) -> AuthResult<Option<User>> {
        match self
            .store
            .record_failed_login(user.id, now, &self.policy)
            .await?
        {
            LockoutOutcome::Recorded { failed_attempts } => {
                warn!(user_id = %user.id, failed_attempts, "Failed login attempt");
                Ok(None)
            }
            LockoutOutcome::LockedNow {
                failed_attempts,
                locked_until,
            } => {
                warn!(
                    user_id = %user.id,
                    failed_attempts,
                    %locked_until,
                    "Account locked after repeated failed logins"
                );
                Err(Self::locked(locked_until, now))
            }
            LockoutOutcome::AlreadyLocked { locked_until } => {
                warn!(user_id = %user.id, %locked_until, "Account locked by a concurrent attempt");
                Err(Self::locked(locked_until, now))
            }
        }
    }

    fn locked(locked_until: DateTime<Utc>, now: DateTime<Utc>) -> AuthError {
        AuthError::AccountLocked {
            remaining_minutes: remaining_minutes(locked_until, now).max(1),
        }
    }
}
