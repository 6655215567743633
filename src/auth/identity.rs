// ABOUTME: Federated identity normalization and account linking
// ABOUTME: Maps Google and Apple profiles onto users correlated solely by email
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

use super::errors::{AuthError, AuthResult};
use crate::clock::Clock;
use crate::database_plugins::{is_provider_id_conflict, UserStore};
use crate::models::{normalize_email, AuthProvider, NewUser, User, UserUpdate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use sublow_core::constants::identity::{PLACEHOLDER_FIRST_NAME, PLACEHOLDER_LAST_NAME};
use sublow_core::errors::ErrorCode;
use tracing::{debug, info, warn};

/// Supported external identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityProvider {
    /// Google sign-in
    Google,
    /// Sign in with Apple
    Apple,
}

impl fmt::Display for IdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Google => "google",
            Self::Apple => "apple",
        })
    }
}

impl From<IdentityProvider> for AuthProvider {
    fn from(provider: IdentityProvider) -> Self {
        match provider {
            IdentityProvider::Google => Self::Google,
            IdentityProvider::Apple => Self::Apple,
        }
    }
}

/// Provider-agnostic profile produced by a federated callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedProfile {
    /// Email asserted by the provider
    pub email: String,
    /// Given name, when the provider sent one
    pub first_name: Option<String>,
    /// Family name, when the provider sent one
    pub last_name: Option<String>,
    /// Provider subject identifier
    pub external_id: String,
}

/// Google profile as delivered by the OAuth callback
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    /// Google account subject
    pub id: String,
    /// Addresses on the account, primary first
    #[serde(default)]
    pub emails: Vec<GoogleEmail>,
    /// Structured name
    #[serde(default)]
    pub name: Option<GoogleName>,
}

/// One address on a Google account
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleEmail {
    /// The address
    pub value: String,
    /// Whether Google verified it
    #[serde(default)]
    pub verified: Option<bool>,
}

/// Google structured name
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleName {
    /// Given name
    #[serde(default)]
    pub given_name: Option<String>,
    /// Family name
    #[serde(default)]
    pub family_name: Option<String>,
}

/// Apple profile as delivered by the OAuth callback
///
/// Apple sends `name` only on the first authorization of the app.
#[derive(Debug, Clone, Deserialize)]
pub struct AppleProfile {
    /// Apple account subject
    #[serde(alias = "id")]
    pub sub: String,
    /// Relay or real address
    #[serde(default)]
    pub email: Option<String>,
    /// Structured name, first authorization only
    #[serde(default)]
    pub name: Option<AppleName>,
}

/// Apple structured name
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleName {
    /// Given name
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name
    #[serde(default)]
    pub last_name: Option<String>,
}

impl IdentityProvider {
    /// Convert a raw callback payload for this provider into a profile
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the payload does not match the provider's
    /// shape or carries no email
    pub fn normalize_profile(&self, payload: serde_json::Value) -> AuthResult<FederatedProfile> {
        let profile = match self {
            Self::Google => {
                let raw: GoogleProfile = serde_json::from_value(payload).map_err(|e| {
                    AuthError::InvalidInput(format!("Invalid Google profile: {e}"))
                })?;
                raw.into_profile()
            }
            Self::Apple => {
                let raw: AppleProfile = serde_json::from_value(payload).map_err(|e| {
                    AuthError::InvalidInput(format!("Invalid Apple profile: {e}"))
                })?;
                raw.into_profile()
            }
        };
        profile.ok_or_else(|| AuthError::InvalidInput(format!("{self} profile has no email")))
    }
}

impl GoogleProfile {
    fn into_profile(self) -> Option<FederatedProfile> {
        // Prefer a verified address, falling back to the first listed
        let email = self
            .emails
            .iter()
            .find(|e| e.verified.unwrap_or(true))
            .or_else(|| self.emails.first())
            .map(|e| e.value.clone())
            .and_then(non_blank)?;
        let (first_name, last_name) = self
            .name
            .map_or((None, None), |n| (n.given_name, n.family_name));
        Some(FederatedProfile {
            email,
            first_name: first_name.and_then(non_blank),
            last_name: last_name.and_then(non_blank),
            external_id: self.id,
        })
    }
}

impl AppleProfile {
    fn into_profile(self) -> Option<FederatedProfile> {
        let email = self.email.and_then(non_blank)?;
        let (first_name, last_name) = self
            .name
            .map_or((None, None), |n| (n.first_name, n.last_name));
        Some(FederatedProfile {
            email,
            first_name: first_name.and_then(non_blank),
            last_name: last_name.and_then(non_blank),
            external_id: self.sub,
        })
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_owned())
    }
}

/// Resolves federated logins to local users
#[derive(Clone)]
pub struct IdentityLinker {
    store: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
}

impl IdentityLinker {
    /// Create a linker
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Find or provision the user for a federated profile
    ///
    /// Idempotent: repeating the call with the same profile returns the same
    /// user and creates nothing new.
    ///
    /// # Errors
    ///
    /// Returns `IdentityConflict` if the provider subject is already linked
    /// to a user with a different email, or an internal error if the store
    /// fails
    pub async fn resolve(
        &self,
        provider: IdentityProvider,
        profile: &FederatedProfile,
    ) -> AuthResult<User> {
        let email = normalize_email(&profile.email);
        if email.is_empty() {
            return Err(AuthError::InvalidInput("Federated profile has no email".into()));
        }

        if let Some(existing) = self.store.find_user_by_email(&email).await? {
            return self.link_existing(provider, profile, existing).await;
        }

        match self.provision(provider, profile, email.clone()).await {
            Ok(user) => Ok(user),
            Err(AuthError::Internal(e)) if is_provider_id_conflict(&e) => {
                warn!(%provider, "Federated subject already linked to another email; refusing to provision");
                Err(AuthError::IdentityConflict)
            }
            // A concurrent callback for the same email created the user first
            Err(AuthError::Internal(e)) if e.code == ErrorCode::ResourceAlreadyExists => {
                debug!(%provider, "Lost provisioning race; linking existing user");
                let existing = self
                    .store
                    .find_user_by_email(&email)
                    .await?
                    .ok_or(AuthError::Internal(e))?;
                self.link_existing(provider, profile, existing).await
            }
            Err(e) => Err(e),
        }
    }

    async fn provision(
        &self,
        provider: IdentityProvider,
        profile: &FederatedProfile,
        email: String,
    ) -> AuthResult<User> {
        let (google_id, apple_id) = match provider {
            IdentityProvider::Google => (Some(profile.external_id.clone()), None),
            IdentityProvider::Apple => (None, Some(profile.external_id.clone())),
        };

        let user = self
            .store
            .create_user(
                NewUser {
                    email,
                    first_name: profile
                        .first_name
                        .clone()
                        .unwrap_or_else(|| PLACEHOLDER_FIRST_NAME.to_owned()),
                    last_name: profile
                        .last_name
                        .clone()
                        .unwrap_or_else(|| PLACEHOLDER_LAST_NAME.to_owned()),
                    password_hash: None,
                    auth_provider: provider.into(),
                    is_email_verified: true,
                    google_id,
                    apple_id,
                    ..NewUser::default()
                },
                self.clock.now(),
            )
            .await?;

        info!(user_id = %user.id, %provider, "Provisioned user from federated login");
        Ok(user.into_sanitized())
    }

    async fn link_existing(
        &self,
        provider: IdentityProvider,
        profile: &FederatedProfile,
        user: User,
    ) -> AuthResult<User> {
        let mut update = UserUpdate::default();

        match user.provider_id(provider.into()) {
            None => match provider {
                IdentityProvider::Google => update.google_id = Some(profile.external_id.clone()),
                IdentityProvider::Apple => update.apple_id = Some(profile.external_id.clone()),
            },
            Some(existing) if existing != profile.external_id => {
                warn!(user_id = %user.id, %provider, "Federated subject differs from the linked one; keeping the original");
            }
            Some(_) => {}
        }

        // Replace placeholders with a real name once one arrives, never the reverse
        if let Some(first_name) = &profile.first_name {
            if is_placeholder(&user.first_name, PLACEHOLDER_FIRST_NAME) {
                update.first_name = Some(first_name.clone());
            }
        }
        if let Some(last_name) = &profile.last_name {
            if is_placeholder(&user.last_name, PLACEHOLDER_LAST_NAME) {
                update.last_name = Some(last_name.clone());
            }
        }

        if update.is_empty() {
            return Ok(user.into_sanitized());
        }

        let updated = match self.store.update_user(user.id, update, self.clock.now()).await {
            Ok(updated) => updated,
            Err(e) if is_provider_id_conflict(&e) => {
                warn!(user_id = %user.id, %provider, "Federated subject already linked to another user");
                return Err(AuthError::IdentityConflict);
            }
            Err(e) => return Err(e.into()),
        };
        info!(user_id = %updated.id, %provider, "Linked federated identity to existing user");
        Ok(updated.into_sanitized())
    }
}

fn is_placeholder(current: &str, placeholder: &str) -> bool {
    current.trim().is_empty() || current == placeholder
}
