// ABOUTME: Revocation cache configuration types
// ABOUTME: Backend selection, in-memory sizing and Redis connection settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use sublow_core::constants::{cache, redis};
use sublow_core::errors::{AppError, AppResult};

/// Which store backs token revocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// No store configured; revocation is not enforced
    #[default]
    Disabled,
    /// Process-local LRU store
    Memory,
    /// Shared Redis store
    Redis,
}

impl FromStr for CacheBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            "memory" | "in-memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(AppError::config(format!(
                "Invalid REVOCATION_CACHE value: {other} (expected redis, memory or disabled)"
            ))),
        }
    }
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled",
            Self::Memory => "memory",
            Self::Redis => "redis",
        })
    }
}

/// Revocation cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Selected backend
    pub backend: CacheBackend,
    /// Redis URL, required for the Redis backend
    pub redis_url: Option<String>,
    /// Capacity of the in-memory store
    pub max_entries: usize,
    /// Interval between sweeps of expired in-memory entries
    pub cleanup_interval: Duration,
    /// Whether the in-memory store runs its background sweeper
    pub enable_background_cleanup: bool,
    /// Redis connection configuration
    pub redis_connection: RedisConnectionConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Disabled,
            redis_url: None,
            max_entries: cache::DEFAULT_CACHE_MAX_ENTRIES,
            cleanup_interval: Duration::from_secs(cache::DEFAULT_CLEANUP_INTERVAL_SECS),
            enable_background_cleanup: true,
            redis_connection: RedisConnectionConfig::default(),
        }
    }
}

impl CacheConfig {
    /// In-memory backend without the background sweeper
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: CacheBackend::Memory,
            enable_background_cleanup: false,
            ..Self::default()
        }
    }

    /// Load cache configuration from environment
    ///
    /// Without `REVOCATION_CACHE` the backend is Redis when `REDIS_URL` is
    /// set and disabled otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if `REVOCATION_CACHE` is invalid, names Redis
    /// without a `REDIS_URL`, or `CACHE_CLEANUP_INTERVAL_SECS` is zero
    pub fn from_env() -> AppResult<Self> {
        let redis_url = env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty());

        let backend = match env::var("REVOCATION_CACHE") {
            Ok(value) => value.parse()?,
            Err(_) if redis_url.is_some() => CacheBackend::Redis,
            Err(_) => CacheBackend::Disabled,
        };

        if backend == CacheBackend::Redis && redis_url.is_none() {
            return Err(AppError::config(
                "REVOCATION_CACHE=redis requires REDIS_URL to be set",
            ));
        }

        let cleanup_secs = env::var("CACHE_CLEANUP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(cache::DEFAULT_CLEANUP_INTERVAL_SECS);
        if cleanup_secs == 0 {
            return Err(AppError::config(
                "CACHE_CLEANUP_INTERVAL_SECS must be greater than zero",
            ));
        }

        Ok(Self {
            backend,
            redis_url,
            max_entries: env::var("CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(cache::DEFAULT_CACHE_MAX_ENTRIES),
            cleanup_interval: Duration::from_secs(cleanup_secs),
            enable_background_cleanup: true,
            redis_connection: RedisConnectionConfig::from_env(),
        })
    }
}

/// Redis connection and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConnectionConfig {
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
    /// Response/command timeout in seconds
    pub response_timeout_secs: u64,
    /// Number of reconnection retries after connection drop
    pub reconnection_retries: usize,
    /// Exponential backoff base for retry delays
    pub retry_exponent_base: u64,
    /// Maximum retry delay in milliseconds
    pub max_retry_delay_ms: u64,
    /// Number of retries for initial connection at startup
    pub initial_connection_retries: u32,
    /// Initial retry delay in milliseconds (doubles with exponential backoff)
    pub initial_retry_delay_ms: u64,
}

impl Default for RedisConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: redis::CONNECTION_TIMEOUT_SECS,
            response_timeout_secs: redis::RESPONSE_TIMEOUT_SECS,
            reconnection_retries: redis::RECONNECTION_RETRIES,
            retry_exponent_base: redis::RETRY_EXPONENT_BASE,
            max_retry_delay_ms: redis::MAX_RETRY_DELAY_MS,
            initial_connection_retries: redis::INITIAL_CONNECTION_RETRIES,
            initial_retry_delay_ms: redis::INITIAL_RETRY_DELAY_MS,
        }
    }
}

impl RedisConnectionConfig {
    /// Load Redis connection configuration from environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            connection_timeout_secs: env::var("REDIS_CONNECTION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(redis::CONNECTION_TIMEOUT_SECS),
            response_timeout_secs: env::var("REDIS_RESPONSE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(redis::RESPONSE_TIMEOUT_SECS),
            reconnection_retries: env::var("REDIS_RECONNECTION_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(redis::RECONNECTION_RETRIES),
            retry_exponent_base: env::var("REDIS_RETRY_EXPONENT_BASE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(redis::RETRY_EXPONENT_BASE),
            max_retry_delay_ms: env::var("REDIS_MAX_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(redis::MAX_RETRY_DELAY_MS),
            initial_connection_retries: env::var("REDIS_INITIAL_CONNECTION_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(redis::INITIAL_CONNECTION_RETRIES),
            initial_retry_delay_ms: env::var("REDIS_INITIAL_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(redis::INITIAL_RETRY_DELAY_MS),
        }
    }
}
