// ABOUTME: Key-value cache abstraction backing token revocation
// ABOUTME: Pluggable backends (in-memory, Redis) selected by the revocation store factory
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

/// Revocation store built from configuration
pub mod factory;
/// In-memory cache implementation
pub mod memory;
/// Redis cache implementation
#[cfg(feature = "redis-cache")]
pub mod redis;

use std::time::Duration;
use sublow_core::errors::AppResult;

pub use factory::RevocationStore;
pub use memory::InMemoryRevocationCache;
#[cfg(feature = "redis-cache")]
pub use self::redis::RedisRevocationCache;

/// String key-value store with per-entry expiry
///
/// Keys passed in are logical; backends may namespace them.
#[async_trait::async_trait]
pub trait RevocationCache: Send + Sync {
    /// Read a value
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Write a value that disappears after `ttl`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Whether a live entry exists
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Remove an entry
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Verify the backend is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unhealthy
    async fn health_check(&self) -> AppResult<()>;
}
