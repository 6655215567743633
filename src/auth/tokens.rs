// ABOUTME: Access/refresh token issuance, verification, rotation and revocation
// ABOUTME: HS256 pairs signed with independent secrets, refresh generations tracked by fingerprint
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

//! # Token Service
//!
//! Every login mints an access token (minutes) and a refresh token (days),
//! each signed with its own secret. Only the fingerprint of the latest
//! refresh token is stored on the user, so minting a new pair implicitly
//! retires the previous refresh token.
//!
//! Access tokens are self-verifying; logout revokes one by writing its
//! fingerprint into the revocation store until its natural expiry.

use super::errors::{AuthError, AuthResult};
use crate::cache::RevocationStore;
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::crypto::fingerprint;
use crate::database_plugins::UserStore;
use crate::models::{UserRole, UserUpdate};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use sublow_core::constants::tokens::{ACCESS_TOKEN_TYPE, REFRESH_TOKEN_TYPE};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which half of a pair a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived bearer credential
    Access,
    /// Long-lived credential that only mints new pairs
    Refresh,
}

impl TokenType {
    /// Wire name of the type
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Access => ACCESS_TOKEN_TYPE,
            Self::Refresh => REFRESH_TOKEN_TYPE,
        }
    }
}

/// Claims carried by both halves of a pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    /// User email
    pub email: String,
    /// Privilege tier
    pub role: UserRole,
    /// Expiry, Unix seconds
    pub exp: i64,
    /// Issued at, Unix seconds
    pub iat: i64,
    /// Unique token id
    pub jti: Uuid,
    /// Access or refresh
    pub typ: TokenType,
}

impl Claims {
    /// Expiry as a timestamp
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Access and refresh token returned to the client
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Bearer token for protected calls
    pub access_token: String,
    /// Token accepted only by the refresh flow
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    typ: TokenType,
}

impl SigningKeys {
    fn new(secret: &str, ttl: Duration, typ: TokenType) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            typ,
        }
    }
}

/// Issues, verifies, rotates and revokes token pairs
#[derive(Clone)]
pub struct TokenService {
    access: Arc<SigningKeys>,
    refresh: Arc<SigningKeys>,
    store: Arc<dyn UserStore>,
    revocation: RevocationStore,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access.ttl)
            .field("refresh_ttl", &self.refresh.ttl)
            .field("revocation", &self.revocation)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a token service
    #[must_use]
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn UserStore>,
        revocation: RevocationStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            access: Arc::new(SigningKeys::new(
                config.jwt_secret.expose(),
                config.access_token_ttl,
                TokenType::Access,
            )),
            refresh: Arc::new(SigningKeys::new(
                config.jwt_refresh_secret.expose(),
                config.refresh_token_ttl,
                TokenType::Refresh,
            )),
            store,
            revocation,
            clock,
        }
    }

    /// Sign a fresh pair without touching the store
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails
    pub fn mint(&self, user_id: Uuid, email: &str, role: UserRole) -> AuthResult<TokenPair> {
        let now = self.clock.now();
        Ok(TokenPair {
            access_token: Self::sign(&self.access, user_id, email, role, now)?,
            refresh_token: Self::sign(&self.refresh, user_id, email, role, now)?,
        })
    }

    /// Sign a fresh pair and record its refresh fingerprint on the user
    ///
    /// Overwrites any previous fingerprint, retiring the earlier refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails or the user cannot be updated
    pub async fn issue(&self, user_id: Uuid, email: &str, role: UserRole) -> AuthResult<TokenPair> {
        let pair = self.mint(user_id, email, role)?;
        self.store
            .update_user(
                user_id,
                UserUpdate::refresh_token_hash(Some(fingerprint(&pair.refresh_token))),
                self.clock.now(),
            )
            .await?;
        debug!(user_id = %user_id, "Issued token pair");
        Ok(pair)
    }

    /// Exchange the current refresh token for a brand-new pair
    ///
    /// Expired, forged, already-rotated and logged-out tokens all fail with
    /// the same `AccessDenied`.
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` if the token is not the user's current refresh
    /// token, or an internal error if the store fails
    pub async fn rotate(&self, user_id: Uuid, presented_refresh: &str) -> AuthResult<TokenPair> {
        let claims = self.verify_refresh(presented_refresh).map_err(|e| {
            warn!(user_id = %user_id, reason = %e, "Refresh token rejected");
            AuthError::AccessDenied
        })?;
        if claims.sub != user_id {
            warn!(user_id = %user_id, "Refresh token subject mismatch");
            return Err(AuthError::AccessDenied);
        }

        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            warn!(user_id = %user_id, "Refresh for unknown user");
            return Err(AuthError::AccessDenied);
        };
        if user.hashed_refresh_token.is_none() {
            warn!(user_id = %user_id, "Refresh attempted with no active session");
            return Err(AuthError::AccessDenied);
        }

        // Role and email come from the record so privilege changes apply on refresh
        let pair = self.mint(user.id, &user.email, user.role)?;
        let swapped = self
            .store
            .swap_refresh_token_hash(
                user.id,
                &fingerprint(presented_refresh),
                Some(fingerprint(&pair.refresh_token)),
                self.clock.now(),
            )
            .await?;
        if !swapped {
            warn!(user_id = %user_id, "Refresh token replay or stale generation");
            return Err(AuthError::AccessDenied);
        }

        info!(user_id = %user_id, "Rotated refresh token");
        Ok(pair)
    }

    /// Check an access token for a protected call
    ///
    /// Signature and expiry are checked first, then the revocation list.
    ///
    /// # Errors
    ///
    /// Returns `Malformed`, `Expired` or `Revoked`
    pub async fn verify_access(&self, token: &str) -> AuthResult<Claims> {
        let claims = self.verify_with(&self.access, token)?;
        if self.revocation.is_revoked(&Self::revocation_key(token)).await {
            warn!(user_id = %claims.sub, "Revoked access token presented");
            return Err(AuthError::Revoked);
        }
        Ok(claims)
    }

    /// Decode and check a refresh token's signature, type and expiry
    ///
    /// Does not consult the stored fingerprint; see [`Self::rotate`].
    ///
    /// # Errors
    ///
    /// Returns `Malformed` or `Expired`
    pub fn verify_refresh(&self, token: &str) -> AuthResult<Claims> {
        self.verify_with(&self.refresh, token)
    }

    /// Revoke an access token until its natural expiry
    ///
    /// The signature must verify, but expiry is not required. Undecodable,
    /// forged and already-expired tokens are a no-op.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the revocation write fails
    pub async fn revoke(&self, access_token: &str) -> AuthResult<()> {
        let claims = match Self::decode_claims(&self.access, access_token) {
            Ok(claims) if claims.typ == TokenType::Access => claims,
            Ok(_) | Err(_) => {
                debug!("Revoke called with a token that is not a valid access token; ignoring");
                return Ok(());
            }
        };

        let remaining_secs = claims.exp - self.clock.now().timestamp();
        let Ok(remaining_secs) = u64::try_from(remaining_secs) else {
            debug!(user_id = %claims.sub, "Access token already expired; nothing to revoke");
            return Ok(());
        };

        self.revocation
            .revoke(
                &Self::revocation_key(access_token),
                std::time::Duration::from_secs(remaining_secs),
            )
            .await?;
        info!(user_id = %claims.sub, ttl_secs = remaining_secs, "Access token revoked");
        Ok(())
    }

    /// Key under which an access token's revocation is stored
    #[must_use]
    pub fn revocation_key(token: &str) -> String {
        fingerprint(token)
    }

    /// Access token lifetime
    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access.ttl
    }

    fn sign(
        keys: &SigningKeys,
        user_id: Uuid,
        email: &str,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> AuthResult<String> {
        let claims = Claims {
            sub: user_id,
            email: email.to_owned(),
            role,
            exp: (now + keys.ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4(),
            typ: keys.typ,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).map_err(|e| {
            AuthError::Internal(sublow_core::errors::AppError::internal(format!(
                "Failed to sign {} token: {e}",
                keys.typ.as_str()
            )))
        })
    }

    fn verify_with(&self, keys: &SigningKeys, token: &str) -> AuthResult<Claims> {
        let claims = Self::decode_claims(keys, token)?;
        if claims.typ != keys.typ {
            warn!(
                expected = keys.typ.as_str(),
                actual = claims.typ.as_str(),
                "Token presented as the wrong type"
            );
            return Err(AuthError::Malformed);
        }
        if claims.exp <= self.clock.now().timestamp() {
            debug!(user_id = %claims.sub, "Token expired");
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    /// Verify signature and shape; expiry is checked against the injected clock
    fn decode_claims(keys: &SigningKeys, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(token, &keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| Self::convert_jwt_error(&e))
    }

    fn convert_jwt_error(e: &jsonwebtoken::errors::Error) -> AuthError {
        match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => {
                warn!("Token signature verification failed");
                AuthError::Malformed
            }
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => {
                debug!("Token format is invalid: {e}");
                AuthError::Malformed
            }
            _ => {
                warn!("Token validation failed: {e}");
                AuthError::Malformed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::CacheConfig;
    use crate::database_plugins::InMemoryUserStore;
    use crate::models::NewUser;

    const ACCESS: &str = "unit-access-secret-unit-access-secret-0001";
    const REFRESH: &str = "unit-refresh-secret-unit-refresh-secret-02";

    fn service(clock: &ManualClock) -> (TokenService, Arc<InMemoryUserStore>) {
        let config = AuthConfig::new(ACCESS, REFRESH).unwrap();
        let store = Arc::new(InMemoryUserStore::new());
        let tokens = TokenService::new(
            &config,
            store.clone(),
            RevocationStore::memory(&CacheConfig::memory()),
            Arc::new(clock.clone()),
        );
        (tokens, store)
    }

    #[tokio::test]
    async fn test_pair_halves_are_not_interchangeable() {
        let clock = ManualClock::default();
        let (tokens, _) = service(&clock);
        let pair = tokens.mint(Uuid::new_v4(), "a@x.com", UserRole::User).unwrap();

        assert!(tokens.verify_access(&pair.access_token).await.is_ok());
        assert!(matches!(
            tokens.verify_access(&pair.refresh_token).await,
            Err(AuthError::Malformed)
        ));
        assert!(matches!(
            tokens.verify_refresh(&pair.access_token),
            Err(AuthError::Malformed)
        ));
    }

    #[tokio::test]
    async fn test_access_token_expires_on_clock() {
        let clock = ManualClock::default();
        let (tokens, _) = service(&clock);
        let pair = tokens.mint(Uuid::new_v4(), "a@x.com", UserRole::Admin).unwrap();

        clock.advance(Duration::minutes(15));
        assert!(matches!(
            tokens.verify_access(&pair.access_token).await,
            Err(AuthError::Expired)
        ));
        assert!(tokens.verify_refresh(&pair.refresh_token).is_ok());
    }

    #[tokio::test]
    async fn test_same_second_pairs_are_distinct() {
        let clock = ManualClock::default();
        let (tokens, _) = service(&clock);
        let id = Uuid::new_v4();
        let first = tokens.mint(id, "a@x.com", UserRole::User).unwrap();
        let second = tokens.mint(id, "a@x.com", UserRole::User).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[tokio::test]
    async fn test_rotation_is_single_use() {
        let clock = ManualClock::default();
        let (tokens, store) = service(&clock);
        let user = store
            .create_user(
                NewUser {
                    email: "rot@x.com".into(),
                    ..NewUser::default()
                },
                clock.now(),
            )
            .await
            .unwrap();

        let original = tokens.issue(user.id, &user.email, user.role).await.unwrap();
        let rotated = tokens.rotate(user.id, &original.refresh_token).await.unwrap();
        assert!(matches!(
            tokens.rotate(user.id, &original.refresh_token).await,
            Err(AuthError::AccessDenied)
        ));
        assert!(tokens.rotate(user.id, &rotated.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_ignores_forged_tokens() {
        let clock = ManualClock::default();
        let (tokens, _) = service(&clock);
        tokens.revoke("not.a.token").await.unwrap();

        let config = AuthConfig::new(
            "some-other-secret-some-other-secret-0001",
            "some-other-refresh-some-other-refresh-02",
        )
        .unwrap();
        let forger = TokenService::new(
            &config,
            Arc::new(InMemoryUserStore::new()),
            RevocationStore::Disabled,
            Arc::new(clock.clone()),
        );
        let forged = forger.mint(Uuid::new_v4(), "f@x.com", UserRole::User).unwrap();
        tokens.revoke(&forged.access_token).await.unwrap();
        assert!(matches!(
            tokens.verify_access(&forged.access_token).await,
            Err(AuthError::Malformed)
        ));
    }
}
