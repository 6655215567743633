// ABOUTME: Redis revocation cache with managed reconnection and TTL support
// ABOUTME: Shares revocations across every instance of the service
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

use super::RevocationCache;
use crate::config::{CacheConfig, RedisConnectionConfig};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use std::time::Duration;
use sublow_core::constants::cache::REVOCATION_KEY_PREFIX;
use sublow_core::errors::{AppError, AppResult};
use tracing::{error, info, warn};

/// Redis-backed revocation cache
///
/// Uses Redis `ConnectionManager` for automatic reconnection.
/// All keys are prefixed with `REVOCATION_KEY_PREFIX` for namespace isolation.
#[derive(Clone)]
pub struct RedisRevocationCache {
    manager: ConnectionManager,
}

impl RedisRevocationCache {
    /// Connect using the cache configuration
    ///
    /// # Errors
    ///
    /// Returns an error if no Redis URL is configured or every connection
    /// attempt fails
    pub async fn connect(config: &CacheConfig) -> AppResult<Self> {
        let redis_url = config
            .redis_url
            .as_ref()
            .ok_or_else(|| AppError::config("Redis URL is required for Redis cache backend"))?;

        let conn_config = &config.redis_connection;

        // URL may carry credentials; only the connection parameters are logged
        info!(
            "Connecting to Redis (timeout={}s, response_timeout={}s, retries={})",
            conn_config.connection_timeout_secs,
            conn_config.response_timeout_secs,
            conn_config.initial_connection_retries
        );

        let client = redis::Client::open(redis_url.as_str())
            .map_err(|e| AppError::config(format!("Failed to create Redis client: {e}")))?;

        let manager = Self::connect_with_retry(&client, conn_config).await?;

        info!("Successfully connected to Redis");

        Ok(Self { manager })
    }

    /// Connect to Redis with exponential backoff retry on failure
    async fn connect_with_retry(
        client: &redis::Client,
        conn_config: &RedisConnectionConfig,
    ) -> AppResult<ConnectionManager> {
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(conn_config.connection_timeout_secs))
            .set_response_timeout(Duration::from_secs(conn_config.response_timeout_secs))
            .set_number_of_retries(conn_config.reconnection_retries)
            .set_exponent_base(conn_config.retry_exponent_base)
            .set_max_delay(conn_config.max_retry_delay_ms);

        let max_retries = conn_config.initial_connection_retries;
        let max_delay_ms = conn_config.max_retry_delay_ms;

        let mut last_error = None;
        let mut delay_ms = conn_config.initial_retry_delay_ms;

        for attempt in 0..=max_retries {
            match ConnectionManager::new_with_config(client.clone(), manager_config.clone()).await {
                Ok(manager) => {
                    if attempt > 0 {
                        info!("Redis connection established after {} retries", attempt);
                    }
                    return Ok(manager);
                }
                Err(e) => {
                    if attempt < max_retries {
                        warn!(
                            "Redis connection attempt {}/{} failed, retrying in {}ms: {}",
                            attempt + 1,
                            max_retries + 1,
                            delay_ms,
                            e
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = (delay_ms * 2).min(max_delay_ms);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(AppError::cache(format!(
            "Failed to connect to Redis after {} attempts: {}",
            max_retries + 1,
            last_error.map_or_else(|| "unknown error".to_owned(), |e| e.to_string())
        )))
    }

    /// Build full Redis key with namespace prefix
    fn build_key(key: &str) -> String {
        format!("{REVOCATION_KEY_PREFIX}{key}")
    }

    fn command_error(operation: &str, e: &redis::RedisError) -> AppError {
        error!("Redis {} operation failed: {}", operation, e);
        AppError::cache(format!("Redis {operation} failed: {e}"))
    }
}

#[async_trait::async_trait]
impl RevocationCache for RedisRevocationCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(Self::build_key(key))
            .await
            .map_err(|e| Self::command_error("GET", &e))
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        // SET EX rejects zero; callers never pass sub-second TTLs
        let ttl_secs = ttl.as_secs().max(1);
        let mut conn = self.manager.clone();

        conn.set_ex::<_, _, ()>(Self::build_key(key), value, ttl_secs)
            .await
            .map_err(|e| Self::command_error("SET", &e))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        conn.exists(Self::build_key(key))
            .await
            .map_err(|e| Self::command_error("EXISTS", &e))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(Self::build_key(key))
            .await
            .map_err(|e| Self::command_error("DEL", &e))
    }

    async fn health_check(&self) -> AppResult<()> {
        let mut conn = self.manager.clone();

        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::command_error("PING", &e))?;

        if response == "PONG" {
            Ok(())
        } else {
            Err(AppError::cache(format!(
                "Unexpected PING response '{response}'"
            )))
        }
    }
}
