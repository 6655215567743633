// ABOUTME: In-memory user store backed by concurrent hash maps
// ABOUTME: Per-entry locking makes the lockout transitions and unique indexes atomic
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

use super::{provider_id_conflict, UserStore};
use crate::crypto::constant_time_eq;
use crate::models::{
    normalize_email, AuthProvider, LockoutOutcome, LockoutPolicy, NewUser, User, UserUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use sublow_core::errors::{AppError, AppResult};
use uuid::Uuid;

/// User store held in process memory
///
/// Records live in `users`; `emails`, `google_ids` and `apple_ids` are the
/// unique indexes onto user ids. Clones share the same data.
///
/// Lock order is index entries first, then the user entry. No operation
/// holds a user entry while touching an index.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<DashMap<Uuid, User>>,
    emails: Arc<DashMap<String, Uuid>>,
    google_ids: Arc<DashMap<String, Uuid>>,
    apple_ids: Arc<DashMap<String, Uuid>>,
}

impl InMemoryUserStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the store holds no users
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn not_found(id: Uuid) -> AppError {
        AppError::not_found(format!("User {id}"))
    }

    fn provider_index(&self, provider: AuthProvider) -> Option<&DashMap<String, Uuid>> {
        match provider {
            AuthProvider::Google => Some(&*self.google_ids),
            AuthProvider::Apple => Some(&*self.apple_ids),
            AuthProvider::Local => None,
        }
    }

    /// Reserve `external_id` for `owner`
    ///
    /// Returns `true` when the reservation is new and must be released if
    /// the surrounding write fails.
    fn claim_provider_id(
        &self,
        provider: AuthProvider,
        external_id: Option<&str>,
        owner: Uuid,
    ) -> AppResult<bool> {
        let (Some(index), Some(external_id)) = (self.provider_index(provider), external_id) else {
            return Ok(false);
        };
        match index.entry(external_id.to_owned()) {
            Entry::Occupied(slot) if *slot.get() != owner => Err(provider_id_conflict(provider)),
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(owner);
                Ok(true)
            }
        }
    }

    fn release_provider_id(&self, provider: AuthProvider, external_id: Option<&str>) {
        if let (Some(index), Some(external_id)) = (self.provider_index(provider), external_id) {
            index.remove(external_id);
        }
    }

    /// Claim both provider ids, releasing the first if the second is taken
    fn claim_provider_ids(
        &self,
        google_id: Option<&str>,
        apple_id: Option<&str>,
        owner: Uuid,
    ) -> AppResult<(bool, bool)> {
        let google = self.claim_provider_id(AuthProvider::Google, google_id, owner)?;
        match self.claim_provider_id(AuthProvider::Apple, apple_id, owner) {
            Ok(apple) => Ok((google, apple)),
            Err(e) => {
                if google {
                    self.release_provider_id(AuthProvider::Google, google_id);
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let Some(id) = self.emails.get(&normalize_email(email)).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|user| user.clone()))
    }

    async fn find_user_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.get(&id).map(|user| user.clone()))
    }

    async fn create_user(&self, new_user: NewUser, now: DateTime<Utc>) -> AppResult<User> {
        let user = User::from_new(new_user, now);

        // The email index entry is held for the whole insert so two
        // registrations of one address cannot both succeed
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(AppError::already_exists(format!(
                "User with email {}",
                user.email
            ))),
            Entry::Vacant(slot) => {
                self.claim_provider_ids(
                    user.google_id.as_deref(),
                    user.apple_id.as_deref(),
                    user.id,
                )?;
                self.users.insert(user.id, user.clone());
                slot.insert(user.id);
                Ok(user)
            }
        }
    }

    async fn update_user(
        &self,
        id: Uuid,
        update: UserUpdate,
        now: DateTime<Utc>,
    ) -> AppResult<User> {
        let (old_google_id, old_apple_id) = {
            let current = self.users.get(&id).ok_or_else(|| Self::not_found(id))?;
            (current.google_id.clone(), current.apple_id.clone())
        };

        let (claimed_google, claimed_apple) = self.claim_provider_ids(
            update.google_id.as_deref(),
            update.apple_id.as_deref(),
            id,
        )?;

        let updated = {
            let mut entry = self.users.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
            entry.apply(update, now);
            entry.clone()
        };

        // A newly claimed id replaces the old one, which no longer points here
        if claimed_google {
            self.release_provider_id(AuthProvider::Google, old_google_id.as_deref());
        }
        if claimed_apple {
            self.release_provider_id(AuthProvider::Apple, old_apple_id.as_deref());
        }
        Ok(updated)
    }

    async fn swap_refresh_token_hash(
        &self,
        id: Uuid,
        expected: &str,
        replacement: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut entry = self.users.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        let matches = entry
            .hashed_refresh_token
            .as_deref()
            .is_some_and(|stored| constant_time_eq(stored, expected));
        if matches {
            entry.hashed_refresh_token = replacement;
            entry.updated_at = now;
        }
        Ok(matches)
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> AppResult<LockoutOutcome> {
        let mut entry = self.users.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        Ok(policy.apply_failure(&mut entry, now))
    }

    async fn record_successful_login(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let mut entry = self.users.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        Ok(LockoutPolicy::apply_success(&mut entry, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_plugins::is_provider_id_conflict;
    use sublow_core::errors::ErrorCode;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            first_name: "Test".into(),
            last_name: "User".into(),
            ..NewUser::default()
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts_case_insensitively() {
        let store = InMemoryUserStore::new();
        let now = Utc::now();
        store.create_user(new_user("a@x.com"), now).await.unwrap();

        let err = store
            .create_user(new_user("A@X.COM"), now)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ResourceAlreadyExists);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_provider_id_is_unique_across_users() {
        let store = InMemoryUserStore::new();
        let now = Utc::now();
        let first = store
            .create_user(
                NewUser {
                    google_id: Some("g-1".into()),
                    ..new_user("first@x.com")
                },
                now,
            )
            .await
            .unwrap();

        let err = store
            .create_user(
                NewUser {
                    google_id: Some("g-1".into()),
                    ..new_user("second@x.com")
                },
                now,
            )
            .await
            .unwrap_err();
        assert!(is_provider_id_conflict(&err));
        assert!(store.find_user_by_email("second@x.com").await.unwrap().is_none());

        let other = store.create_user(new_user("other@x.com"), now).await.unwrap();
        let err = store
            .update_user(
                other.id,
                UserUpdate {
                    google_id: Some("g-1".into()),
                    ..UserUpdate::default()
                },
                now,
            )
            .await
            .unwrap_err();
        assert!(is_provider_id_conflict(&err));

        // The owner can rewrite its own id
        store
            .update_user(
                first.id,
                UserUpdate {
                    google_id: Some("g-1".into()),
                    ..UserUpdate::default()
                },
                now,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_create_releases_provider_claims() {
        let store = InMemoryUserStore::new();
        let now = Utc::now();
        store
            .create_user(
                NewUser {
                    apple_id: Some("a-1".into()),
                    ..new_user("apple@x.com")
                },
                now,
            )
            .await
            .unwrap();

        // The Apple id is taken, so the Google claim must not linger
        store
            .create_user(
                NewUser {
                    google_id: Some("g-2".into()),
                    apple_id: Some("a-1".into()),
                    ..new_user("both@x.com")
                },
                now,
            )
            .await
            .unwrap_err();
        store
            .create_user(
                NewUser {
                    google_id: Some("g-2".into()),
                    ..new_user("google@x.com")
                },
                now,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_by_email_ignores_case() {
        let store = InMemoryUserStore::new();
        let created = store
            .create_user(new_user("Mixed@Case.com"), Utc::now())
            .await
            .unwrap();

        let found = store.find_user_by_email("mixed@CASE.com").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(created.id));
    }

    #[tokio::test]
    async fn test_concurrent_failures_never_lose_increments() {
        let store = InMemoryUserStore::new();
        let now = Utc::now();
        let user = store.create_user(new_user("race@x.com"), now).await.unwrap();
        let policy = LockoutPolicy {
            max_failed_attempts: 1_000,
            ..LockoutPolicy::default()
        };

        let id = user.id;
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record_failed_login(id, now, &policy).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 50);
    }

    #[tokio::test]
    async fn test_refresh_hash_swap_succeeds_once() {
        let store = InMemoryUserStore::new();
        let now = Utc::now();
        let user = store.create_user(new_user("swap@x.com"), now).await.unwrap();
        store
            .update_user(user.id, UserUpdate::refresh_token_hash(Some("old".into())), now)
            .await
            .unwrap();

        assert!(store
            .swap_refresh_token_hash(user.id, "old", Some("new".into()), now)
            .await
            .unwrap());
        assert!(!store
            .swap_refresh_token_hash(user.id, "old", Some("newer".into()), now)
            .await
            .unwrap());

        let stored = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.hashed_refresh_token.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let store = InMemoryUserStore::new();
        let err = store
            .record_successful_login(Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ResourceNotFound);
    }
}
