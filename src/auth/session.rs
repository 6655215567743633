// ABOUTME: Session orchestration for login, registration, logout, refresh and federated callbacks
// ABOUTME: Composes credentials, tokens and identity linking; emits one audit event per flow
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

//! # Session Orchestrator
//!
//! Collaborators are passed in explicitly so tests can substitute fakes for
//! the record store, revocation cache, clock, hasher and audit sink. Every
//! operation takes its token or identity as an argument; nothing is read from
//! ambient request state.
//!
//! Side effects are not rolled back if the caller disappears mid-flow. A
//! client that times out after a rotation has to log in again.

use super::credentials::CredentialValidator;
use super::errors::{AuthError, AuthResult};
use super::identity::{FederatedProfile, IdentityLinker, IdentityProvider};
use super::tokens::{Claims, TokenPair, TokenService};
use crate::audit::{AuditAction, AuditEvent, AuditRecorder, RequestMetadata};
use crate::cache::RevocationStore;
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::crypto::PasswordHasher;
use crate::database_plugins::UserStore;
use crate::models::{normalize_email, AuthProvider, NewUser, User, UserRole, UserUpdate};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::{Arc, OnceLock};
use sublow_core::constants::validation::{MAX_EMAIL_LENGTH, MIN_PASSWORD_LENGTH};
use sublow_core::errors::{AppError, ErrorCode};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Identity attached to a verified access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// User id
    pub user_id: Uuid,
    /// User email
    pub email: String,
    /// Privilege tier
    pub role: UserRole,
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// Registration input
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Email address
    pub email: String,
    /// Plaintext password
    pub password: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Contact phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// Date of birth
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    /// Referral code
    #[serde(default)]
    pub referral_code: Option<String>,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish_non_exhaustive()
    }
}

impl RegisterRequest {
    fn validate(&self) -> AuthResult<()> {
        if self.first_name.trim().is_empty() {
            return Err(AuthError::InvalidInput("First name is required".into()));
        }
        if self.last_name.trim().is_empty() {
            return Err(AuthError::InvalidInput("Last name is required".into()));
        }
        if !is_valid_email(&self.email) {
            return Err(AuthError::InvalidInput("Invalid email address".into()));
        }
        validate_password(&self.password)
    }
}

/// Compiled email pattern, `None` only if the literal fails to compile
fn email_regex() -> Option<&'static Regex> {
    static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_REGEX
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    email.len() <= MAX_EMAIL_LENGTH && email_regex().is_some_and(|re| re.is_match(email))
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::InvalidInput(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Entry point for every authentication flow
#[derive(Clone)]
pub struct SessionOrchestrator {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditRecorder>,
    credentials: CredentialValidator,
    tokens: TokenService,
    identity: IdentityLinker,
}

impl fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl SessionOrchestrator {
    /// Wire the orchestrator from its collaborators
    #[must_use]
    pub fn new(
        store: Arc<dyn UserStore>,
        revocation: RevocationStore,
        clock: Arc<dyn Clock>,
        hasher: Arc<dyn PasswordHasher>,
        audit: Arc<dyn AuditRecorder>,
        config: &AuthConfig,
    ) -> Self {
        let credentials = CredentialValidator::new(
            Arc::clone(&store),
            Arc::clone(&hasher),
            Arc::clone(&clock),
            config.lockout,
        );
        let tokens = TokenService::new(config, Arc::clone(&store), revocation, Arc::clone(&clock));
        let identity = IdentityLinker::new(Arc::clone(&store), Arc::clone(&clock));

        Self {
            store,
            hasher,
            clock,
            audit,
            credentials,
            tokens,
            identity,
        }
    }

    /// Token service used by the flows
    #[must_use]
    pub const fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Password login
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials`, `AccountLocked`, or an internal error
    #[instrument(skip_all, fields(flow = "login"))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        metadata: &RequestMetadata,
    ) -> AuthResult<TokenPair> {
        let user = self
            .credentials
            .validate(email, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let pair = self.tokens.issue(user.id, &user.email, user.role).await?;
        self.audit(user.id, AuditAction::Login, json!({ "method": "password" }), metadata)
            .await;
        info!(user_id = %user.id, "User logged in");
        Ok(pair)
    }

    /// Create an account and start a session
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for bad fields, `Conflict` if the email is
    /// taken, or an internal error
    #[instrument(skip_all, fields(flow = "register"))]
    pub async fn register(
        &self,
        request: RegisterRequest,
        metadata: &RequestMetadata,
    ) -> AuthResult<TokenPair> {
        request.validate()?;
        let email = normalize_email(&request.email);

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict);
        }

        let password_hash = self.hasher.hash(&request.password).await?;
        let user = self
            .store
            .create_user(
                NewUser {
                    email,
                    first_name: request.first_name.trim().to_owned(),
                    last_name: request.last_name.trim().to_owned(),
                    password_hash: Some(password_hash),
                    role: UserRole::User,
                    auth_provider: AuthProvider::Local,
                    is_email_verified: false,
                    google_id: None,
                    apple_id: None,
                    phone: request.phone,
                    date_of_birth: request.date_of_birth,
                    referral_code: request.referral_code,
                },
                self.clock.now(),
            )
            .await
            .map_err(conflict_or_internal)?;

        let pair = self.tokens.issue(user.id, &user.email, user.role).await?;
        self.audit(
            user.id,
            AuditAction::Register,
            json!({ "email": user.email, "auth_provider": user.auth_provider }),
            metadata,
        )
        .await;
        info!(user_id = %user.id, "User registered");
        Ok(pair)
    }

    /// End the session
    ///
    /// Clears the refresh generation so no rotation can succeed, then
    /// revokes the presented access token if any.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the store or revocation write fails
    #[instrument(skip_all, fields(flow = "logout", user_id = %user_id))]
    pub async fn logout(
        &self,
        user_id: Uuid,
        access_token: Option<&str>,
        metadata: &RequestMetadata,
    ) -> AuthResult<()> {
        self.store
            .update_user(user_id, UserUpdate::refresh_token_hash(None), self.clock.now())
            .await?;

        if let Some(token) = access_token {
            self.tokens.revoke(token).await?;
        }

        self.audit(
            user_id,
            AuditAction::Logout,
            json!({ "access_token_revoked": access_token.is_some() }),
            metadata,
        )
        .await;
        info!(user_id = %user_id, "User logged out");
        Ok(())
    }

    /// Exchange a refresh token for a new pair
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` for any refresh token that is not the user's
    /// current one, or an internal error
    #[instrument(skip_all, fields(flow = "refresh"))]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        metadata: &RequestMetadata,
    ) -> AuthResult<TokenPair> {
        let claims = self.tokens.verify_refresh(refresh_token).map_err(|e| {
            warn!(reason = %e, "Refresh token rejected");
            AuthError::AccessDenied
        })?;

        let pair = self.tokens.rotate(claims.sub, refresh_token).await?;
        self.audit(claims.sub, AuditAction::TokenRefresh, json!({}), metadata)
            .await;
        Ok(pair)
    }

    /// Complete a federated login
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a profile without email, or an internal error
    #[instrument(skip_all, fields(flow = "oauth_callback", provider = %provider))]
    pub async fn oauth_callback(
        &self,
        provider: IdentityProvider,
        profile: &FederatedProfile,
        metadata: &RequestMetadata,
    ) -> AuthResult<TokenPair> {
        let user = self.identity.resolve(provider, profile).await?;
        let pair = self.tokens.issue(user.id, &user.email, user.role).await?;
        self.audit(
            user.id,
            AuditAction::Login,
            json!({ "method": "oauth", "provider": provider }),
            metadata,
        )
        .await;
        info!(user_id = %user.id, %provider, "User logged in via federated identity");
        Ok(pair)
    }

    /// Complete a federated login from the provider's raw profile payload
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the payload cannot be normalized, or any
    /// error of [`Self::oauth_callback`]
    pub async fn oauth_callback_raw(
        &self,
        provider: IdentityProvider,
        payload: serde_json::Value,
        metadata: &RequestMetadata,
    ) -> AuthResult<TokenPair> {
        let profile = provider.normalize_profile(payload)?;
        self.oauth_callback(provider, &profile, metadata).await
    }

    /// Verify the bearer token of a protected call
    ///
    /// # Errors
    ///
    /// Returns `Malformed`, `Expired` or `Revoked`
    pub async fn authenticate(&self, access_token: &str) -> AuthResult<AuthenticatedUser> {
        self.tokens
            .verify_access(access_token)
            .await
            .map(AuthenticatedUser::from)
    }

    /// Replace a password after verifying the current one
    ///
    /// Existing sessions stay valid.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` if the current password is wrong or the
    /// account has none, `InvalidInput` if the new one is too short, or an
    /// internal error
    #[instrument(skip_all, fields(flow = "change_password", user_id = %user_id))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        metadata: &RequestMetadata,
    ) -> AuthResult<()> {
        validate_password(new_password)?;

        let user = self.require_user(user_id).await?;
        let Some(stored_hash) = user.password_hash.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };
        if !self.hasher.verify(current_password, stored_hash).await? {
            warn!(user_id = %user_id, "Password change with wrong current password");
            return Err(AuthError::InvalidCredentials);
        }

        let new_hash = self.hasher.hash(new_password).await?;
        self.store
            .update_user(
                user_id,
                UserUpdate {
                    password_hash: Some(Some(new_hash)),
                    ..UserUpdate::default()
                },
                self.clock.now(),
            )
            .await?;

        self.audit(
            user_id,
            AuditAction::PasswordChange,
            json!({ "password": "changed" }),
            metadata,
        )
        .await;
        info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Current user without credential secrets
    ///
    /// # Errors
    ///
    /// Returns an internal not-found error if the user does not exist
    pub async fn profile(&self, user_id: Uuid) -> AuthResult<User> {
        self.require_user(user_id).await.map(User::into_sanitized)
    }

    async fn require_user(&self, user_id: Uuid) -> AuthResult<User> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::Internal(AppError::not_found(format!("User {user_id}"))))
    }

    async fn audit(
        &self,
        user_id: Uuid,
        action: AuditAction,
        changes: serde_json::Value,
        metadata: &RequestMetadata,
    ) {
        let event = AuditEvent::for_user(user_id, action, changes, metadata, self.clock.now());
        if let Err(e) = self.audit.record(event).await {
            warn!(user_id = %user_id, %action, error = %e, "Failed to record audit event");
        }
    }
}

fn conflict_or_internal(e: AppError) -> AuthError {
    if e.code == ErrorCode::ResourceAlreadyExists {
        AuthError::Conflict
    } else {
        AuthError::Internal(e)
    }
}
