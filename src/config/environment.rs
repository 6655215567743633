// ABOUTME: Environment-based configuration for the identity core
// ABOUTME: Signing secrets, token lifetimes, lockout policy and store locations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

use super::cache::CacheConfig;
use crate::models::LockoutPolicy;
use chrono::Duration;
use std::env;
use std::fmt;
use std::str::FromStr;
use sublow_core::constants::{lockout, tokens};
use sublow_core::errors::{AppError, AppResult};
use tracing::info;
use zeroize::Zeroizing;

/// Default record store location
pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";

/// A secret value that never appears in `Debug` output and is wiped on drop
#[derive(Clone)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
    /// Wrap a secret
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the secret bytes
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// Length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the secret is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        crate::crypto::constant_time_eq(self.expose(), other.expose())
    }
}

/// Configuration of the identity and session core
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 key for access tokens
    pub jwt_secret: SecretString,
    /// HS256 key for refresh tokens, distinct from `jwt_secret`
    pub jwt_refresh_secret: SecretString,
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// Brute-force lockout policy
    pub lockout: LockoutPolicy,
    /// Record store location
    pub database_url: String,
    /// Revocation cache configuration
    pub cache: CacheConfig,
}

impl AuthConfig {
    /// Configuration with default lifetimes and policy for the given secrets
    ///
    /// # Errors
    ///
    /// Returns an error if the secrets are too short or identical
    pub fn new(
        jwt_secret: impl Into<String>,
        jwt_refresh_secret: impl Into<String>,
    ) -> AppResult<Self> {
        let config = Self {
            jwt_secret: SecretString::new(jwt_secret),
            jwt_refresh_secret: SecretString::new(jwt_refresh_secret),
            access_token_ttl: Duration::minutes(tokens::ACCESS_TOKEN_EXPIRY_MINUTES),
            refresh_token_ttl: Duration::days(tokens::REFRESH_TOKEN_EXPIRY_DAYS),
            lockout: LockoutPolicy::default(),
            database_url: DEFAULT_DATABASE_URL.to_owned(),
            cache: CacheConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, a numeric value
    /// does not parse, or validation fails
    pub fn from_env() -> AppResult<Self> {
        info!("Loading auth configuration from environment variables");

        let config = Self {
            jwt_secret: SecretString::new(required_var("JWT_SECRET")?),
            jwt_refresh_secret: SecretString::new(required_var("JWT_REFRESH_SECRET")?),
            access_token_ttl: duration_var(
                "JWT_ACCESS_EXPIRY_MINUTES",
                tokens::ACCESS_TOKEN_EXPIRY_MINUTES,
                Duration::try_minutes,
            )?,
            refresh_token_ttl: duration_var(
                "JWT_REFRESH_EXPIRY_DAYS",
                tokens::REFRESH_TOKEN_EXPIRY_DAYS,
                Duration::try_days,
            )?,
            lockout: LockoutPolicy {
                max_failed_attempts: parse_var(
                    "LOCKOUT_MAX_FAILED_ATTEMPTS",
                    lockout::MAX_FAILED_ATTEMPTS,
                )?,
                lockout_duration: duration_var(
                    "LOCKOUT_DURATION_MINUTES",
                    lockout::LOCKOUT_DURATION_MINUTES,
                    Duration::try_minutes,
                )?,
            },
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_owned()),
            cache: CacheConfig::from_env()?,
        };

        config.validate()?;
        info!(
            access_minutes = config.access_token_ttl.num_minutes(),
            refresh_days = config.refresh_token_ttl.num_days(),
            max_failed_attempts = config.lockout.max_failed_attempts,
            cache_backend = %config.cache.backend,
            "Auth configuration loaded"
        );
        Ok(config)
    }

    /// Check secrets, lifetimes and policy for consistency
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first problem found
    pub fn validate(&self) -> AppResult<()> {
        for (name, secret) in [
            ("JWT_SECRET", &self.jwt_secret),
            ("JWT_REFRESH_SECRET", &self.jwt_refresh_secret),
        ] {
            if secret.len() < tokens::MIN_SECRET_LENGTH {
                return Err(AppError::config(format!(
                    "{name} must be at least {} bytes",
                    tokens::MIN_SECRET_LENGTH
                )));
            }
        }
        if self.jwt_secret == self.jwt_refresh_secret {
            return Err(AppError::config(
                "JWT_SECRET and JWT_REFRESH_SECRET must differ",
            ));
        }
        if self.access_token_ttl <= Duration::zero() || self.refresh_token_ttl <= Duration::zero()
        {
            return Err(AppError::config("Token lifetimes must be positive"));
        }
        if self.refresh_token_ttl <= self.access_token_ttl {
            return Err(AppError::config(
                "Refresh token lifetime must exceed access token lifetime",
            ));
        }
        if self.lockout.max_failed_attempts == 0 {
            return Err(AppError::config(
                "LOCKOUT_MAX_FAILED_ATTEMPTS must be at least 1",
            ));
        }
        if self.lockout.lockout_duration <= Duration::zero() {
            return Err(AppError::config("LOCKOUT_DURATION_MINUTES must be positive"));
        }
        Ok(())
    }
}

fn required_var(name: &str) -> AppResult<String> {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::config(format!("{name} environment variable is required")))
}

fn parse_var<T>(name: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::config(format!("Invalid {name} value '{raw}': {e}"))),
        Err(_) => Ok(default),
    }
}

/// Parse a whole-unit duration, rejecting values chrono cannot represent
fn duration_var(
    name: &str,
    default: i64,
    from_units: fn(i64) -> Option<Duration>,
) -> AppResult<Duration> {
    let units = parse_var(name, default)?;
    from_units(units).ok_or_else(|| AppError::config(format!("{name} is out of range: {units}")))
}
