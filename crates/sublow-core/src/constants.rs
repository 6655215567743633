// ABOUTME: Security policy constants for tokens, lockout, caching and auditing
// ABOUTME: Defaults used when configuration does not override them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

//! Constants organized by domain

/// Token lifetimes and claim values
pub mod tokens {
    /// Access token lifetime in minutes
    pub const ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 15;

    /// Refresh token lifetime in days
    pub const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 7;

    /// `typ` claim for access tokens
    pub const ACCESS_TOKEN_TYPE: &str = "access";

    /// `typ` claim for refresh tokens
    pub const REFRESH_TOKEN_TYPE: &str = "refresh";

    /// Minimum secret length in bytes accepted for HS256 signing
    pub const MIN_SECRET_LENGTH: usize = 32;
}

/// Brute-force lockout policy
pub mod lockout {
    /// Consecutive failures that lock an account
    pub const MAX_FAILED_ATTEMPTS: u32 = 5;

    /// How long a lock lasts, in minutes
    pub const LOCKOUT_DURATION_MINUTES: i64 = 30;
}

/// Revocation cache settings
pub mod cache {
    /// Key prefix for revoked access tokens
    pub const REVOCATION_KEY_PREFIX: &str = "sublow:revocation:";

    /// Marker value stored for a revoked token
    pub const REVOKED_MARKER: &str = "revoked";

    /// Default maximum entries for the in-memory revocation cache
    pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

    /// Default cleanup interval in seconds for expired entries
    pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
}

/// Redis connection defaults
pub mod redis {
    /// Connection timeout in seconds
    pub const CONNECTION_TIMEOUT_SECS: u64 = 5;

    /// Per-command response timeout in seconds
    pub const RESPONSE_TIMEOUT_SECS: u64 = 2;

    /// Reconnection attempts after a dropped connection
    pub const RECONNECTION_RETRIES: usize = 3;

    /// Exponential backoff base
    pub const RETRY_EXPONENT_BASE: u64 = 2;

    /// Maximum retry delay in milliseconds
    pub const MAX_RETRY_DELAY_MS: u64 = 2_000;

    /// Attempts for the first connection at startup
    pub const INITIAL_CONNECTION_RETRIES: u32 = 3;

    /// First retry delay in milliseconds (doubles each attempt)
    pub const INITIAL_RETRY_DELAY_MS: u64 = 50;
}

/// Registration input rules
pub mod validation {
    /// Minimum password length at registration and password change
    pub const MIN_PASSWORD_LENGTH: usize = 6;

    /// Maximum accepted email length
    pub const MAX_EMAIL_LENGTH: usize = 254;
}

/// Federated identity defaults
pub mod identity {
    /// First name stored when a provider omits it
    pub const PLACEHOLDER_FIRST_NAME: &str = "App";

    /// Last name stored when a provider omits it
    pub const PLACEHOLDER_LAST_NAME: &str = "User";
}

/// Audit trail vocabulary
pub mod audit {
    /// Entity type for user records
    pub const ENTITY_USER: &str = "USER";

    /// Password or federated login
    pub const ACTION_LOGIN: &str = "LOGIN";

    /// Account creation through registration
    pub const ACTION_REGISTER: &str = "REGISTER";

    /// Session termination
    pub const ACTION_LOGOUT: &str = "LOGOUT";

    /// Refresh token rotation
    pub const ACTION_TOKEN_REFRESH: &str = "TOKEN_REFRESH";

    /// Password change
    pub const ACTION_PASSWORD_CHANGE: &str = "PASSWORD_CHANGE";
}

/// Service identity used in logs
pub mod service_names {
    /// Service name for structured logging
    pub const SUBLOW_AUTH: &str = "sublow-auth";
}

/// Invalid-credential message shared by every path that must not leak account existence
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";
