// ABOUTME: Revocation store built from configuration with an explicit disabled mode
// ABOUTME: Owns the fail-open policy for lookups and TTL clamping for writes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

//! # Revocation Store
//!
//! Policy:
//! - **Disabled** (no backend configured): nothing is ever revoked and
//!   writes are ignored.
//! - **Lookup errors**: a transient backend failure answers "not revoked"
//!   and is logged at warn, so an outage of the cache does not block every
//!   authenticated request.
//! - **Write errors**: propagated, so a logout that could not revoke is
//!   reported to the caller.
//! - **TTL**: an entry never outlives the token it revokes; a token with no
//!   remaining lifetime is never written.

use super::memory::InMemoryRevocationCache;
#[cfg(feature = "redis-cache")]
use super::redis::RedisRevocationCache;
use super::RevocationCache;
use crate::config::{CacheBackend, CacheConfig};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use sublow_core::constants::cache::REVOKED_MARKER;
use sublow_core::errors::{AppError, AppResult};
use tracing::{debug, info, warn};

/// Revocation list over the configured cache backend
#[derive(Clone)]
pub enum RevocationStore {
    /// No backend; revocation is not enforced
    Disabled,
    /// Any cache backend
    Enabled(Arc<dyn RevocationCache>),
}

impl fmt::Debug for RevocationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("RevocationStore::Disabled"),
            Self::Enabled(_) => f.write_str("RevocationStore::Enabled"),
        }
    }
}

impl RevocationStore {
    /// Build the store for the configured backend
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis backend is selected but cannot be reached
    /// or was compiled out
    pub async fn from_config(config: &CacheConfig) -> AppResult<Self> {
        match config.backend {
            CacheBackend::Disabled => {
                warn!("Revocation cache disabled; logged-out access tokens stay valid until expiry");
                Ok(Self::Disabled)
            }
            CacheBackend::Memory => {
                info!(
                    "Initializing in-memory revocation cache (max entries: {})",
                    config.max_entries
                );
                Ok(Self::memory(config))
            }
            #[cfg(feature = "redis-cache")]
            CacheBackend::Redis => {
                let cache = RedisRevocationCache::connect(config).await?;
                Ok(Self::Enabled(Arc::new(cache)))
            }
            #[cfg(not(feature = "redis-cache"))]
            CacheBackend::Redis => Err(AppError::config(
                "Redis revocation cache requested but the redis-cache feature is disabled",
            )),
        }
    }

    /// In-memory store
    #[must_use]
    pub fn memory(config: &CacheConfig) -> Self {
        Self::Enabled(Arc::new(InMemoryRevocationCache::new(config)))
    }

    /// Store over an arbitrary backend
    #[must_use]
    pub fn with_cache(cache: Arc<dyn RevocationCache>) -> Self {
        Self::Enabled(cache)
    }

    /// Whether revocation is enforced
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Whether `key` has been revoked
    ///
    /// Never fails: backend errors answer `false`.
    pub async fn is_revoked(&self, key: &str) -> bool {
        let Self::Enabled(cache) = self else {
            return false;
        };
        match cache.exists(key).await {
            Ok(revoked) => revoked,
            Err(e) => {
                warn!(error = %e, "Revocation lookup failed; treating token as not revoked");
                false
            }
        }
    }

    /// Revoke `key` for `remaining` time
    ///
    /// A zero `remaining` is a no-op because the token is already dead.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails
    pub async fn revoke(&self, key: &str, remaining: Duration) -> AppResult<()> {
        let Self::Enabled(cache) = self else {
            debug!("Revocation cache disabled; skipping revoke");
            return Ok(());
        };
        if remaining.is_zero() {
            debug!("Token already expired; nothing to revoke");
            return Ok(());
        }
        cache
            .set_with_expiry(key, REVOKED_MARKER, remaining)
            .await
            .map_err(|e| AppError::cache(format!("Failed to revoke token: {}", e.message)))
    }

    /// Verify the backend is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unhealthy
    pub async fn health_check(&self) -> AppResult<()> {
        match self {
            Self::Disabled => Ok(()),
            Self::Enabled(cache) => cache.health_check().await,
        }
    }
}
