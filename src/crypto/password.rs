// ABOUTME: Memory-hard password hashing behind a swappable trait
// ABOUTME: Argon2id PHC strings for passwords, SHA-256 fingerprints for tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Argon2, Params,
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use sublow_core::errors::{AppError, AppResult};
use zeroize::Zeroizing;

/// One-way password hashing
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password for storage
    ///
    /// # Errors
    ///
    /// Returns an error if hashing fails
    async fn hash(&self, password: &str) -> AppResult<String>;

    /// Check a plaintext password against a stored hash
    ///
    /// A malformed stored hash verifies as `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the hashing task cannot run
    async fn verify(&self, password: &str, hash: &str) -> AppResult<bool>;
}

/// Argon2id hasher
///
/// Hashing and verification run on the blocking pool so the async executor
/// is never stalled by the memory-hard computation.
#[derive(Clone, Default)]
pub struct Argon2Hasher {
    argon2: Arc<Argon2<'static>>,
}

impl Argon2Hasher {
    /// Hasher with explicit cost parameters
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are out of range
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> AppResult<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AppError::config(format!("Invalid Argon2 parameters: {e}")))?;
        Ok(Self {
            argon2: Arc::new(Argon2::new(
                argon2::Algorithm::Argon2id,
                argon2::Version::V0x13,
                params,
            )),
        })
    }
}

impl std::fmt::Debug for Argon2Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2Hasher").finish_non_exhaustive()
    }
}

#[async_trait]
impl PasswordHasher for Argon2Hasher {
    async fn hash(&self, password: &str) -> AppResult<String> {
        let argon2 = Arc::clone(&self.argon2);
        let password = Zeroizing::new(password.to_owned());

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AppError::internal(format!("Argon2 password hashing failed: {e}")))
        })
        .await
        .map_err(|e| AppError::internal(format!("Password hashing task failed: {e}")))?
    }

    async fn verify(&self, password: &str, hash: &str) -> AppResult<bool> {
        let argon2 = Arc::clone(&self.argon2);
        let password = Zeroizing::new(password.to_owned());
        let hash = hash.to_owned();

        tokio::task::spawn_blocking(move || {
            let Ok(parsed) = PasswordHash::new(&hash) else {
                tracing::error!("Stored password hash is not a valid PHC string");
                return false;
            };
            argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .await
        .map_err(|e| AppError::internal(format!("Password verification task failed: {e}")))
    }
}

/// Hex SHA-256 of a token
///
/// Refresh and access tokens are high-entropy signed values, so a fast hash
/// is enough to keep them out of storage.
#[must_use]
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time string comparison
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> Argon2Hasher {
        Argon2Hasher::with_params(8, 1, 1).unwrap()
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hasher = fast_hasher();
        let hash = hasher.hash("Password123").await.unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("Password123", &hash).await.unwrap());
        assert!(!hasher.verify("password123", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_hashes_are_salted() {
        let hasher = fast_hasher();
        let first = hasher.hash("same").await.unwrap();
        let second = hasher.hash("same").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_malformed_hash_does_not_verify() {
        let hasher = fast_hasher();
        assert!(!hasher.verify("anything", "not-a-phc-string").await.unwrap());
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let a = fingerprint("token");
        assert_eq!(a.len(), 64);
        assert_eq!(a, fingerprint("token"));
        assert_ne!(a, fingerprint("token2"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
    }
}
