// ABOUTME: Bounded in-memory revocation cache with TTL support
// ABOUTME: Live entries are never evicted; a background task sweeps expired ones
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

use super::RevocationCache;
use crate::config::CacheConfig;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use sublow_core::errors::{AppError, AppResult};
use tokio::sync::RwLock;
use tokio::time::Instant;

/// In-memory cache entry with expiration
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

type Store = Arc<RwLock<LruCache<String, CacheEntry>>>;

/// Process-local revocation cache
///
/// Expiry uses `tokio::time::Instant`, so paused-clock tests can advance it.
/// An unexpired revocation is never evicted. When the cache is full, expired
/// entries are purged first; if it is still full the write fails, so capacity
/// should be sized for the number of logouts within one access-token lifetime.
#[derive(Clone)]
pub struct InMemoryRevocationCache {
    store: Store,
    shutdown_tx: Option<Arc<tokio::sync::mpsc::Sender<()>>>,
}

impl InMemoryRevocationCache {
    /// Fallback capacity when the configuration asks for zero entries
    const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1000) {
        Some(n) => n,
        None => unreachable!(),
    };

    /// Shortest sweep period accepted from configuration
    const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

    /// Create the cache, spawning the sweeper if configured
    ///
    /// Must be called inside a Tokio runtime when background cleanup is on.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.max_entries).unwrap_or(Self::DEFAULT_CACHE_CAPACITY);
        let store: Store = Arc::new(RwLock::new(LruCache::new(capacity)));

        let shutdown_tx = if config.enable_background_cleanup {
            let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
            let store_clone = Arc::clone(&store);
            // tokio::time::interval panics on a zero period
            let cleanup_interval = config.cleanup_interval.max(Self::MIN_CLEANUP_INTERVAL);

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(cleanup_interval);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            Self::cleanup_expired(&store_clone).await;
                        }
                        _ = shutdown_rx.recv() => {
                            tracing::debug!("Revocation cache cleanup task received shutdown signal");
                            break;
                        }
                    }
                }
            });

            Some(Arc::new(shutdown_tx))
        } else {
            None
        };

        Self { store, shutdown_tx }
    }

    /// Remove all expired entries from cache
    async fn cleanup_expired(store: &Store) {
        let mut guard = store.write().await;
        let purged = Self::purge_expired(&mut guard);
        drop(guard);

        if purged > 0 {
            tracing::debug!("Cleaned up {} expired revocation entries", purged);
        }
    }

    fn purge_expired(store: &mut LruCache<String, CacheEntry>) -> usize {
        let expired_keys: Vec<String> = store
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            store.pop(key);
        }
        expired_keys.len()
    }

    /// Number of entries currently held, expired or not
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    async fn live_entry(&self, key: &str) -> Option<String> {
        let mut store = self.store.write().await;
        let value = store
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone());
        if value.is_none() {
            store.pop(key);
        }
        value
    }
}

#[async_trait::async_trait]
impl RevocationCache for InMemoryRevocationCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.live_entry(key).await)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let entry = CacheEntry::new(value.to_owned(), ttl);
        let mut store = self.store.write().await;

        if !store.contains(key) && store.len() >= store.cap().get() {
            let purged = Self::purge_expired(&mut store);
            if store.len() >= store.cap().get() {
                tracing::error!(
                    capacity = store.cap().get(),
                    "Revocation cache full of live entries; refusing write"
                );
                return Err(AppError::cache(format!(
                    "Revocation cache is full ({} live entries)",
                    store.len()
                )));
            }
            tracing::debug!("Purged {} expired revocation entries to make room", purged);
        }

        // Capacity was checked above, so put never evicts a live entry
        store.put(key.to_owned(), entry);
        drop(store);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.live_entry(key).await.is_some())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.store.write().await.pop(key);
        Ok(())
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }
}

impl Drop for InMemoryRevocationCache {
    fn drop(&mut self) {
        // Only the last clone stops the sweeper
        if let Some(tx) = self.shutdown_tx.take() {
            if Arc::strong_count(&tx) == 1 {
                if let Err(e) = tx.try_send(()) {
                    tracing::debug!(error = ?e, "Revocation cache shutdown signal send failed (channel likely closed)");
                }
            }
        }
    }
}
