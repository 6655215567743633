// ABOUTME: Failed-login lockout state machine shared by every user store
// ABOUTME: Pure transitions applied atomically by the store implementations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

//! # Lockout State Machine
//!
//! Per user: `UNLOCKED(n)` moves to `UNLOCKED(n + 1)` on a failure below the
//! threshold and to `LOCKED(now + duration)` on the failure that reaches it.
//! A lock is only lifted lazily, by the first attempt made after it elapsed,
//! which restarts the counter from zero. Any success resets to `UNLOCKED(0)`.
//!
//! Stores call [`LockoutPolicy::apply_failure`] and
//! [`LockoutPolicy::apply_success`] while holding whatever per-record
//! exclusivity they provide, so each transition is one atomic step.

use chrono::{DateTime, Duration, Utc};
use sublow_core::constants::lockout;

use super::User;

/// Threshold and duration of the brute-force lockout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that lock the account
    pub max_failed_attempts: u32,
    /// Lock length
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: lockout::MAX_FAILED_ATTEMPTS,
            lockout_duration: Duration::minutes(lockout::LOCKOUT_DURATION_MINUTES),
        }
    }
}

/// Result of recording a failed password attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutOutcome {
    /// Counter incremented, account still usable
    Recorded {
        /// Post-increment counter value
        failed_attempts: u32,
    },
    /// This failure reached the threshold and locked the account
    LockedNow {
        /// Post-increment counter value
        failed_attempts: u32,
        /// Lock expiry
        locked_until: DateTime<Utc>,
    },
    /// A lock was already active; nothing was changed
    AlreadyLocked {
        /// Lock expiry
        locked_until: DateTime<Utc>,
    },
}

impl LockoutOutcome {
    /// Lock expiry if the account is locked after this attempt
    #[must_use]
    pub const fn locked_until(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Recorded { .. } => None,
            Self::LockedNow { locked_until, .. } | Self::AlreadyLocked { locked_until } => {
                Some(*locked_until)
            }
        }
    }
}

impl LockoutPolicy {
    /// Apply a failed attempt to `user`
    pub fn apply_failure(&self, user: &mut User, now: DateTime<Utc>) -> LockoutOutcome {
        if let Some(locked_until) = user.active_lock(now) {
            return LockoutOutcome::AlreadyLocked { locked_until };
        }

        // Lazy unlock: an elapsed lock restarts the count
        if user.locked_until.take().is_some() {
            user.failed_login_attempts = 0;
        }

        user.failed_login_attempts = user.failed_login_attempts.saturating_add(1);
        user.last_failed_login_at = Some(now);
        user.updated_at = now;

        if user.failed_login_attempts >= self.max_failed_attempts {
            let locked_until = now + self.lockout_duration;
            user.locked_until = Some(locked_until);
            LockoutOutcome::LockedNow {
                failed_attempts: user.failed_login_attempts,
                locked_until,
            }
        } else {
            LockoutOutcome::Recorded {
                failed_attempts: user.failed_login_attempts,
            }
        }
    }

    /// Apply a successful login to `user`
    ///
    /// Returns `false` without touching the record when a lock is active at
    /// `now`, which happens when a concurrent failure locked the account after
    /// the caller's initial lock check.
    pub fn apply_success(user: &mut User, now: DateTime<Utc>) -> bool {
        if user.is_locked_at(now) {
            return false;
        }
        user.failed_login_attempts = 0;
        user.locked_until = None;
        user.last_login_at = Some(now);
        user.updated_at = now;
        true
    }
}

/// Whole minutes until `until`, rounded up, never below one while locked
#[must_use]
pub fn remaining_minutes(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (until - now).num_seconds();
    if secs <= 0 {
        return 0;
    }
    (secs + 59) / 60
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;

    fn user(now: DateTime<Utc>) -> User {
        User::from_new(
            NewUser {
                email: "lock@example.com".into(),
                ..NewUser::default()
            },
            now,
        )
    }

    #[test]
    fn test_fifth_failure_locks() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let mut user = user(now);

        for expected in 1..5 {
            assert_eq!(
                policy.apply_failure(&mut user, now),
                LockoutOutcome::Recorded {
                    failed_attempts: expected
                }
            );
        }
        let outcome = policy.apply_failure(&mut user, now);
        assert_eq!(
            outcome,
            LockoutOutcome::LockedNow {
                failed_attempts: 5,
                locked_until: now + Duration::minutes(30)
            }
        );
    }

    #[test]
    fn test_failure_while_locked_changes_nothing() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let mut user = user(now);
        let until = now + Duration::minutes(10);
        user.failed_login_attempts = 5;
        user.locked_until = Some(until);

        let before = user.clone();
        assert_eq!(
            policy.apply_failure(&mut user, now),
            LockoutOutcome::AlreadyLocked {
                locked_until: until
            }
        );
        assert_eq!(user, before);
    }

    #[test]
    fn test_elapsed_lock_restarts_count() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let mut user = user(now);
        user.failed_login_attempts = 5;
        user.locked_until = Some(now - Duration::seconds(1));

        assert_eq!(
            policy.apply_failure(&mut user, now),
            LockoutOutcome::Recorded { failed_attempts: 1 }
        );
        assert!(user.locked_until.is_none());
    }

    #[test]
    fn test_success_resets_counter_unless_locked() {
        let now = Utc::now();
        let mut user = user(now);
        user.failed_login_attempts = 3;
        assert!(LockoutPolicy::apply_success(&mut user, now));
        assert_eq!(user.failed_login_attempts, 0);
        assert_eq!(user.last_login_at, Some(now));

        user.failed_login_attempts = 5;
        user.locked_until = Some(now + Duration::minutes(1));
        assert!(!LockoutPolicy::apply_success(&mut user, now));
        assert_eq!(user.failed_login_attempts, 5);
    }

    #[test]
    fn test_remaining_minutes_rounds_up() {
        let now = Utc::now();
        assert_eq!(remaining_minutes(now + Duration::seconds(61), now), 2);
        assert_eq!(remaining_minutes(now + Duration::minutes(30), now), 30);
        assert_eq!(remaining_minutes(now + Duration::seconds(1), now), 1);
        assert_eq!(remaining_minutes(now, now), 0);
    }
}
