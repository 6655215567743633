// ABOUTME: Tests for environment-driven auth and cache configuration
// ABOUTME: Run serially because they mutate process environment variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use chrono::Duration;
use serial_test::serial;
use std::env;
use sublow_auth::config::{AuthConfig, CacheBackend, CacheConfig};
use sublow_auth::errors::ErrorCode;

const MANAGED_VARS: &[&str] = &[
    "JWT_SECRET",
    "JWT_REFRESH_SECRET",
    "JWT_ACCESS_EXPIRY_MINUTES",
    "JWT_REFRESH_EXPIRY_DAYS",
    "LOCKOUT_MAX_FAILED_ATTEMPTS",
    "LOCKOUT_DURATION_MINUTES",
    "DATABASE_URL",
    "REDIS_URL",
    "REVOCATION_CACHE",
    "CACHE_MAX_ENTRIES",
    "CACHE_CLEANUP_INTERVAL_SECS",
];

fn clear_env() {
    for name in MANAGED_VARS {
        env::remove_var(name);
    }
}

fn set_secrets() {
    env::set_var("JWT_SECRET", "env-access-secret-0123456789abcdefgh");
    env::set_var("JWT_REFRESH_SECRET", "env-refresh-secret-0123456789abcdefgh");
}

#[test]
#[serial]
fn test_defaults_when_only_secrets_are_set() {
    clear_env();
    set_secrets();

    let config = AuthConfig::from_env().unwrap();
    assert_eq!(config.access_token_ttl, Duration::minutes(15));
    assert_eq!(config.refresh_token_ttl, Duration::days(7));
    assert_eq!(config.lockout.max_failed_attempts, 5);
    assert_eq!(config.lockout.lockout_duration, Duration::minutes(30));
    assert_eq!(config.database_url, "sqlite::memory:");
    assert_eq!(config.cache.backend, CacheBackend::Disabled);

    clear_env();
}

#[test]
#[serial]
fn test_missing_secret_is_config_error() {
    clear_env();
    env::set_var("JWT_SECRET", "env-access-secret-0123456789abcdefgh");

    let err = AuthConfig::from_env().unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigError);
    assert!(err.message.contains("JWT_REFRESH_SECRET"));

    clear_env();
}

#[test]
#[serial]
fn test_overrides_are_parsed_and_validated() {
    clear_env();
    set_secrets();
    env::set_var("JWT_ACCESS_EXPIRY_MINUTES", "5");
    env::set_var("LOCKOUT_MAX_FAILED_ATTEMPTS", "3");

    let config = AuthConfig::from_env().unwrap();
    assert_eq!(config.access_token_ttl, Duration::minutes(5));
    assert_eq!(config.lockout.max_failed_attempts, 3);

    env::set_var("JWT_ACCESS_EXPIRY_MINUTES", "soon");
    assert_eq!(
        AuthConfig::from_env().unwrap_err().code,
        ErrorCode::ConfigError
    );

    env::set_var("JWT_ACCESS_EXPIRY_MINUTES", "20000");
    assert!(AuthConfig::from_env()
        .unwrap_err()
        .message
        .contains("Refresh token lifetime"));

    clear_env();
}

#[test]
#[serial]
fn test_cache_backend_follows_redis_url() {
    clear_env();
    env::set_var("REDIS_URL", "redis://127.0.0.1:6379");
    assert_eq!(CacheConfig::from_env().unwrap().backend, CacheBackend::Redis);

    env::set_var("REVOCATION_CACHE", "memory");
    let config = CacheConfig::from_env().unwrap();
    assert_eq!(config.backend, CacheBackend::Memory);
    assert!(config.enable_background_cleanup);

    env::remove_var("REDIS_URL");
    env::set_var("REVOCATION_CACHE", "redis");
    assert!(CacheConfig::from_env().is_err());

    env::set_var("REVOCATION_CACHE", "sideways");
    assert!(CacheConfig::from_env().is_err());

    clear_env();
}

#[test]
#[serial]
fn test_zero_cleanup_interval_is_rejected() {
    clear_env();
    env::set_var("REVOCATION_CACHE", "memory");
    env::set_var("CACHE_CLEANUP_INTERVAL_SECS", "0");

    let err = CacheConfig::from_env().unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigError);

    env::set_var("CACHE_CLEANUP_INTERVAL_SECS", "15");
    assert_eq!(
        CacheConfig::from_env().unwrap().cleanup_interval,
        std::time::Duration::from_secs(15)
    );

    clear_env();
}

#[test]
#[serial]
fn test_unrepresentable_lifetimes_are_config_errors() {
    clear_env();
    set_secrets();

    env::set_var("JWT_REFRESH_EXPIRY_DAYS", "9223372036854775807");
    let err = AuthConfig::from_env().unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigError);
    assert!(err.message.contains("JWT_REFRESH_EXPIRY_DAYS"));

    env::remove_var("JWT_REFRESH_EXPIRY_DAYS");
    env::set_var("LOCKOUT_DURATION_MINUTES", "9223372036854775807");
    let err = AuthConfig::from_env().unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigError);
    assert!(err.message.contains("LOCKOUT_DURATION_MINUTES"));

    clear_env();
}
