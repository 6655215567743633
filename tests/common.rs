// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Builds a session orchestrator over in-memory stores with a manual clock
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used
)]
//! Shared test utilities for `sublow_auth`

use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Once};
use sublow_auth::{
    audit::{InMemoryAuditRecorder, RequestMetadata},
    auth::{RegisterRequest, SessionOrchestrator},
    cache::RevocationStore,
    clock::ManualClock,
    config::{AuthConfig, CacheConfig},
    crypto::Argon2Hasher,
    database_plugins::InMemoryUserStore,
};

static INIT_LOGGER: Once = Once::new();

pub const ACCESS_SECRET: &str = "test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &str = "test-refresh-secret-0123456789abcdef";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Whole-second start instant so persisted timestamps compare exactly
pub fn test_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// Auth configuration with defaults and fixed test secrets
pub fn test_config() -> AuthConfig {
    AuthConfig::new(ACCESS_SECRET, REFRESH_SECRET).unwrap()
}

/// Cheap Argon2 parameters so tests do not spend seconds hashing
pub fn fast_hasher() -> Arc<Argon2Hasher> {
    Arc::new(Argon2Hasher::with_params(8, 1, 1).unwrap())
}

pub fn metadata() -> RequestMetadata {
    RequestMetadata::new("198.51.100.7", "sublow-tests/1.0")
}

pub fn register_request(email: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.into(),
        password: password.into(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        ..RegisterRequest::default()
    }
}

/// Orchestrator plus handles to the collaborators tests inspect
pub struct TestHarness {
    pub sessions: SessionOrchestrator,
    pub store: Arc<InMemoryUserStore>,
    pub audit: InMemoryAuditRecorder,
    pub clock: ManualClock,
    pub config: AuthConfig,
}

pub fn create_test_harness() -> TestHarness {
    init_test_logging();
    let config = test_config();
    let store = Arc::new(InMemoryUserStore::new());
    let audit = InMemoryAuditRecorder::new();
    let clock = ManualClock::new(test_start());
    let revocation = RevocationStore::memory(&CacheConfig::memory());

    let sessions = SessionOrchestrator::new(
        store.clone(),
        revocation,
        Arc::new(clock.clone()),
        fast_hasher(),
        Arc::new(audit.clone()),
        &config,
    );

    TestHarness {
        sessions,
        store,
        audit,
        clock,
        config,
    }
}
