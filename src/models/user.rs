// ABOUTME: User models for the identity core
// ABOUTME: User, UserRole, AuthProvider, NewUser and partial UserUpdate definitions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sublow_core::errors::AppError;
use uuid::Uuid;

/// Privilege tier carried in every token
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Regular group member
    #[default]
    User,
    /// Platform administrator
    Admin,
    /// Operator account with full access
    SystemOwner,
}

impl UserRole {
    /// Convert to string for database storage and claims
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
            Self::SystemOwner => "SYSTEM_OWNER",
        }
    }

    /// Whether the role has administrative privileges
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Admin | Self::SystemOwner)
    }
}

impl Display for UserRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Self::User),
            "ADMIN" => Ok(Self::Admin),
            "SYSTEM_OWNER" => Ok(Self::SystemOwner),
            _ => Err(AppError::invalid_input(format!("Invalid user role: {s}"))),
        }
    }
}

/// How the account was first created
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthProvider {
    /// Email and password registration
    #[default]
    Local,
    /// Google sign-in
    Google,
    /// Sign in with Apple
    Apple,
}

impl AuthProvider {
    /// Convert to string for database storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Google => "GOOGLE",
            Self::Apple => "APPLE",
        }
    }
}

impl Display for AuthProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOCAL" => Ok(Self::Local),
            "GOOGLE" => Ok(Self::Google),
            "APPLE" => Ok(Self::Apple),
            _ => Err(AppError::invalid_input(format!("Invalid auth provider: {s}"))),
        }
    }
}

/// A user account as seen by the identity core
///
/// Business fields owned by other subsystems (groups, subscriptions, payments)
/// live elsewhere; this struct only carries what authentication reads or mutates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Unique user identifier
    pub id: Uuid,
    /// Email address, stored lowercased
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Argon2 PHC string; absent for federated-only accounts
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// Privilege tier
    pub role: UserRole,
    /// Provider used when the account was created
    pub auth_provider: AuthProvider,
    /// Whether the email address has been verified
    pub is_email_verified: bool,
    /// Consecutive failed password attempts
    pub failed_login_attempts: u32,
    /// Password login is refused until this instant
    pub locked_until: Option<DateTime<Utc>>,
    /// Last successful authentication
    pub last_login_at: Option<DateTime<Utc>>,
    /// Last failed password attempt
    pub last_failed_login_at: Option<DateTime<Utc>>,
    /// Fingerprint of the single live refresh token
    #[serde(skip_serializing)]
    pub hashed_refresh_token: Option<String>,
    /// Google account subject
    pub google_id: Option<String>,
    /// Apple account subject
    pub apple_id: Option<String>,
    /// Contact phone number
    pub phone: Option<String>,
    /// Date of birth
    pub date_of_birth: Option<NaiveDate>,
    /// Referral code supplied at registration
    pub referral_code: Option<String>,
    /// When the account was created
    pub created_at: DateTime<Utc>,
    /// Last modification
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a user record from creation input
    #[must_use]
    pub fn from_new(new_user: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(&new_user.email),
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            password_hash: new_user.password_hash,
            role: new_user.role,
            auth_provider: new_user.auth_provider,
            is_email_verified: new_user.is_email_verified,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            last_failed_login_at: None,
            hashed_refresh_token: None,
            google_id: new_user.google_id,
            apple_id: new_user.apple_id,
            phone: new_user.phone,
            date_of_birth: new_user.date_of_birth,
            referral_code: new_user.referral_code,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active lock expiry, if the account is locked at `now`
    #[must_use]
    pub fn active_lock(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.locked_until.filter(|until| *until > now)
    }

    /// Whether password login is refused at `now`
    #[must_use]
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.active_lock(now).is_some()
    }

    /// Provider subject stored for the given provider
    #[must_use]
    pub fn provider_id(&self, provider: AuthProvider) -> Option<&str> {
        match provider {
            AuthProvider::Google => self.google_id.as_deref(),
            AuthProvider::Apple => self.apple_id.as_deref(),
            AuthProvider::Local => None,
        }
    }

    /// Copy with every credential secret removed
    #[must_use]
    pub fn into_sanitized(mut self) -> Self {
        self.password_hash = None;
        self.hashed_refresh_token = None;
        self
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, update: UserUpdate, now: DateTime<Utc>) {
        if let Some(first_name) = update.first_name {
            self.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            self.last_name = last_name;
        }
        if let Some(password_hash) = update.password_hash {
            self.password_hash = password_hash;
        }
        if let Some(hashed_refresh_token) = update.hashed_refresh_token {
            self.hashed_refresh_token = hashed_refresh_token;
        }
        if let Some(google_id) = update.google_id {
            self.google_id = Some(google_id);
        }
        if let Some(apple_id) = update.apple_id {
            self.apple_id = Some(apple_id);
        }
        if let Some(verified) = update.is_email_verified {
            self.is_email_verified = verified;
        }
        self.updated_at = now;
    }
}

/// Input for creating a user
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    /// Email address (normalized on insert)
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Argon2 PHC string
    pub password_hash: Option<String>,
    /// Privilege tier
    pub role: UserRole,
    /// Provider used for creation
    pub auth_provider: AuthProvider,
    /// Whether the email address is already verified
    pub is_email_verified: bool,
    /// Google account subject
    pub google_id: Option<String>,
    /// Apple account subject
    pub apple_id: Option<String>,
    /// Contact phone number
    pub phone: Option<String>,
    /// Date of birth
    pub date_of_birth: Option<NaiveDate>,
    /// Referral code
    pub referral_code: Option<String>,
}

/// Partial update of a user record
///
/// Outer `None` leaves a field untouched. For nullable columns the inner
/// `Option` is the new value, so `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    /// New given name
    pub first_name: Option<String>,
    /// New family name
    pub last_name: Option<String>,
    /// New password hash
    pub password_hash: Option<Option<String>>,
    /// New refresh token fingerprint
    pub hashed_refresh_token: Option<Option<String>>,
    /// Link a Google subject
    pub google_id: Option<String>,
    /// Link an Apple subject
    pub apple_id: Option<String>,
    /// New verification flag
    pub is_email_verified: Option<bool>,
}

impl UserUpdate {
    /// Replace the stored refresh token fingerprint
    #[must_use]
    pub fn refresh_token_hash(hash: Option<String>) -> Self {
        Self {
            hashed_refresh_token: Some(hash),
            ..Self::default()
        }
    }

    /// Whether the update changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Lowercase and trim an email for storage and lookup
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
