// ABOUTME: Authentication outcome taxonomy surfaced to callers of the identity core
// ABOUTME: Maps every auth failure onto a distinct AppError code
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

use sublow_core::constants::INVALID_CREDENTIALS_MESSAGE;
use sublow_core::errors::{AppError, ErrorCode};
use thiserror::Error;

/// Why an authentication operation was refused
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Unknown email, wrong password, or an account without a password
    ///
    /// The causes are deliberately indistinguishable to prevent account
    /// enumeration.
    #[error("{INVALID_CREDENTIALS_MESSAGE}")]
    InvalidCredentials,

    /// Too many failed attempts; password login is suspended
    #[error("Account is locked. Try again in {remaining_minutes} minutes")]
    AccountLocked {
        /// Whole minutes until the lock lifts, rounded up
        remaining_minutes: i64,
    },

    /// Refresh token does not match the stored generation
    #[error("Access denied")]
    AccessDenied,

    /// Email already registered
    #[error("An account with this email already exists")]
    Conflict,

    /// Federated subject already linked to a different account
    #[error("This sign-in is already linked to another account")]
    IdentityConflict,

    /// Access token was revoked by logout
    #[error("Token has been revoked")]
    Revoked,

    /// Token is past its expiry
    #[error("Token has expired")]
    Expired,

    /// Token signature, format or type is wrong
    #[error("Token is malformed or invalid")]
    Malformed,

    /// Request data failed validation
    #[error("{0}")]
    InvalidInput(String),

    /// Store, cache or hashing failure
    #[error(transparent)]
    Internal(#[from] AppError),
}

/// Result alias for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Error code for this outcome
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidCredentials => ErrorCode::AuthInvalid,
            Self::AccountLocked { .. } => ErrorCode::ResourceLocked,
            Self::AccessDenied => ErrorCode::PermissionDenied,
            Self::Conflict | Self::IdentityConflict => ErrorCode::ResourceAlreadyExists,
            Self::Revoked => ErrorCode::AuthRevoked,
            Self::Expired => ErrorCode::AuthExpired,
            Self::Malformed => ErrorCode::AuthMalformed,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::Internal(e) => e.code,
        }
    }
}

impl From<AuthError> for AppError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Internal(e) => e,
            other => {
                let details = match other {
                    AuthError::AccountLocked { remaining_minutes } => {
                        serde_json::json!({ "remaining_minutes": remaining_minutes })
                    }
                    _ => serde_json::Value::Null,
                };
                Self::new(other.code(), other.to_string()).with_details(details)
            }
        }
    }
}
