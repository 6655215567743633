// ABOUTME: Integration tests for the session orchestrator flows
// ABOUTME: Covers register, login, logout, refresh, federated callbacks, lockout and auditing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use async_trait::async_trait;
use chrono::Duration;
use common::{create_test_harness, fast_hasher, metadata, register_request, test_config};
use serde_json::json;
use std::sync::Arc;
use sublow_auth::{
    audit::{AuditAction, AuditEvent, AuditRecorder},
    auth::{AuthError, FederatedProfile, IdentityProvider, SessionOrchestrator},
    cache::RevocationStore,
    clock::{Clock, ManualClock},
    database_plugins::{InMemoryUserStore, UserStore},
    errors::{AppError, AppResult},
    models::AuthProvider,
};

fn profile(
    email: &str,
    first: Option<&str>,
    last: Option<&str>,
    external_id: &str,
) -> FederatedProfile {
    FederatedProfile {
        email: email.into(),
        first_name: first.map(Into::into),
        last_name: last.map(Into::into),
        external_id: external_id.into(),
    }
}

#[tokio::test]
async fn test_register_then_logout_revokes_access_token() {
    let h = create_test_harness();

    let pair = h
        .sessions
        .register(register_request("a@x.com", "Password123"), &metadata())
        .await
        .unwrap();
    let me = h.sessions.authenticate(&pair.access_token).await.unwrap();
    assert_eq!(me.email, "a@x.com");

    h.sessions
        .logout(me.user_id, Some(&pair.access_token), &metadata())
        .await
        .unwrap();

    assert!(matches!(
        h.sessions.authenticate(&pair.access_token).await,
        Err(AuthError::Revoked)
    ));
    assert!(matches!(
        h.sessions.refresh(&pair.refresh_token, &metadata()).await,
        Err(AuthError::AccessDenied)
    ));
    assert_eq!(
        h.audit.actions().await,
        vec![AuditAction::Register, AuditAction::Logout]
    );
}

#[tokio::test]
async fn test_fifth_failure_locks_and_correct_password_stays_locked() {
    let h = create_test_harness();
    h.sessions
        .register(register_request("lock@x.com", "Password123"), &metadata())
        .await
        .unwrap();

    for _ in 0..4 {
        assert!(matches!(
            h.sessions.login("lock@x.com", "wrong-password", &metadata()).await,
            Err(AuthError::InvalidCredentials)
        ));
    }
    assert!(matches!(
        h.sessions.login("lock@x.com", "wrong-password", &metadata()).await,
        Err(AuthError::AccountLocked { .. })
    ));

    match h.sessions.login("lock@x.com", "Password123", &metadata()).await {
        Err(AuthError::AccountLocked { remaining_minutes }) => assert!(remaining_minutes > 0),
        other => panic!("expected AccountLocked, got {other:?}"),
    }

    h.clock.advance(Duration::minutes(30));
    h.sessions
        .login("lock@x.com", "Password123", &metadata())
        .await
        .unwrap();

    let user = h.store.find_user_by_email("lock@x.com").await.unwrap().unwrap();
    assert_eq!(user.failed_login_attempts, 0);
    assert!(user.locked_until.is_none());
}

#[tokio::test]
async fn test_success_resets_failed_counter() {
    let h = create_test_harness();
    h.sessions
        .register(register_request("reset@x.com", "Password123"), &metadata())
        .await
        .unwrap();

    for _ in 0..3 {
        let _ = h.sessions.login("reset@x.com", "nope-nope", &metadata()).await;
    }
    let before = h.store.find_user_by_email("reset@x.com").await.unwrap().unwrap();
    assert_eq!(before.failed_login_attempts, 3);

    h.sessions
        .login("reset@x.com", "Password123", &metadata())
        .await
        .unwrap();
    let after = h.store.find_user_by_email("reset@x.com").await.unwrap().unwrap();
    assert_eq!(after.failed_login_attempts, 0);
    assert_eq!(after.last_login_at, Some(h.clock.now()));
}

#[tokio::test]
async fn test_unknown_email_and_wrong_password_are_indistinguishable() {
    let h = create_test_harness();
    h.sessions
        .register(register_request("known@x.com", "Password123"), &metadata())
        .await
        .unwrap();

    let unknown = h
        .sessions
        .login("ghost@x.com", "Password123", &metadata())
        .await
        .unwrap_err();
    let wrong = h
        .sessions
        .login("known@x.com", "Password999", &metadata())
        .await
        .unwrap_err();

    assert!(matches!(unknown, AuthError::InvalidCredentials));
    assert!(matches!(wrong, AuthError::InvalidCredentials));
    assert_eq!(unknown.to_string(), wrong.to_string());
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let h = create_test_harness();
    let original = h
        .sessions
        .register(register_request("rot@x.com", "Password123"), &metadata())
        .await
        .unwrap();

    let rotated = h
        .sessions
        .refresh(&original.refresh_token, &metadata())
        .await
        .unwrap();
    assert_ne!(rotated.refresh_token, original.refresh_token);

    assert!(matches!(
        h.sessions.refresh(&original.refresh_token, &metadata()).await,
        Err(AuthError::AccessDenied)
    ));

    let again = h
        .sessions
        .refresh(&rotated.refresh_token, &metadata())
        .await
        .unwrap();
    h.sessions.authenticate(&again.access_token).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_refresh_succeeds_once() {
    let h = create_test_harness();
    let pair = h
        .sessions
        .register(register_request("race@x.com", "Password123"), &metadata())
        .await
        .unwrap();

    let meta = metadata();
    let (first, second) = tokio::join!(
        h.sessions.refresh(&pair.refresh_token, &meta),
        h.sessions.refresh(&pair.refresh_token, &meta)
    );
    assert_eq!(
        usize::from(first.is_ok()) + usize::from(second.is_ok()),
        1,
        "exactly one rotation may win"
    );
}

#[tokio::test]
async fn test_access_token_cannot_refresh() {
    let h = create_test_harness();
    let pair = h
        .sessions
        .register(register_request("typ@x.com", "Password123"), &metadata())
        .await
        .unwrap();

    assert!(matches!(
        h.sessions.refresh(&pair.access_token, &metadata()).await,
        Err(AuthError::AccessDenied)
    ));
    assert!(matches!(
        h.sessions.authenticate(&pair.refresh_token).await,
        Err(AuthError::Malformed)
    ));
}

#[tokio::test]
async fn test_tokens_expire_on_the_injected_clock() {
    let h = create_test_harness();
    let pair = h
        .sessions
        .register(register_request("exp@x.com", "Password123"), &metadata())
        .await
        .unwrap();

    h.clock.advance(h.config.access_token_ttl);
    assert!(matches!(
        h.sessions.authenticate(&pair.access_token).await,
        Err(AuthError::Expired)
    ));

    h.clock.advance(h.config.refresh_token_ttl);
    assert!(matches!(
        h.sessions.refresh(&pair.refresh_token, &metadata()).await,
        Err(AuthError::AccessDenied)
    ));
}

#[tokio::test]
async fn test_duplicate_registration_conflicts_case_insensitively() {
    let h = create_test_harness();
    h.sessions
        .register(register_request("dup@x.com", "Password123"), &metadata())
        .await
        .unwrap();

    assert!(matches!(
        h.sessions
            .register(register_request("DUP@X.com", "Password456"), &metadata())
            .await,
        Err(AuthError::Conflict)
    ));
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn test_register_rejects_invalid_input() {
    let h = create_test_harness();
    assert!(matches!(
        h.sessions
            .register(register_request("not-an-email", "Password123"), &metadata())
            .await,
        Err(AuthError::InvalidInput(_))
    ));
    assert!(matches!(
        h.sessions
            .register(register_request("short@x.com", "abc"), &metadata())
            .await,
        Err(AuthError::InvalidInput(_))
    ));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_federated_login_preserves_first_captured_name() {
    let h = create_test_harness();

    h.sessions
        .oauth_callback(
            IdentityProvider::Apple,
            &profile("b@y.com", Some("Bea"), Some("Yu"), "apple-001"),
            &metadata(),
        )
        .await
        .unwrap();

    let user = h.store.find_user_by_email("b@y.com").await.unwrap().unwrap();
    assert!(user.is_email_verified);
    assert!(user.password_hash.is_none());
    assert_eq!(user.auth_provider, AuthProvider::Apple);
    assert_eq!(user.apple_id.as_deref(), Some("apple-001"));

    h.sessions
        .oauth_callback(
            IdentityProvider::Apple,
            &profile("b@y.com", None, None, "apple-001"),
            &metadata(),
        )
        .await
        .unwrap();

    let user = h.store.find_user_by_email("b@y.com").await.unwrap().unwrap();
    assert_eq!(user.first_name, "Bea");
    assert_eq!(user.last_name, "Yu");
    assert_eq!(h.store.len(), 1);

    assert!(matches!(
        h.sessions.login("b@y.com", "anything-at-all", &metadata()).await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_federated_login_links_existing_password_account() {
    let h = create_test_harness();
    h.sessions
        .register(register_request("a@x.com", "Password123"), &metadata())
        .await
        .unwrap();

    let pair = h
        .sessions
        .oauth_callback_raw(
            IdentityProvider::Google,
            json!({
                "id": "google-42",
                "emails": [{ "value": "A@x.com", "verified": true }],
                "name": { "givenName": "Other", "familyName": "Name" }
            }),
            &metadata(),
        )
        .await
        .unwrap();

    let me = h.sessions.authenticate(&pair.access_token).await.unwrap();
    let user = h.store.find_user_by_id(me.user_id).await.unwrap().unwrap();
    assert_eq!(user.google_id.as_deref(), Some("google-42"));
    assert_eq!(user.first_name, "Ada");
    assert_eq!(user.auth_provider, AuthProvider::Local);
    assert_eq!(h.store.len(), 1);

    h.sessions
        .login("a@x.com", "Password123", &metadata())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_change_password_requires_current_password() {
    let h = create_test_harness();
    let pair = h
        .sessions
        .register(register_request("pw@x.com", "Password123"), &metadata())
        .await
        .unwrap();
    let me = h.sessions.authenticate(&pair.access_token).await.unwrap();

    assert!(matches!(
        h.sessions
            .change_password(me.user_id, "not-it", "NewPassword1", &metadata())
            .await,
        Err(AuthError::InvalidCredentials)
    ));

    h.sessions
        .change_password(me.user_id, "Password123", "NewPassword1", &metadata())
        .await
        .unwrap();

    assert!(matches!(
        h.sessions.login("pw@x.com", "Password123", &metadata()).await,
        Err(AuthError::InvalidCredentials)
    ));
    h.sessions
        .login("pw@x.com", "NewPassword1", &metadata())
        .await
        .unwrap();

    // Existing sessions survive a password change
    h.sessions.authenticate(&pair.access_token).await.unwrap();
    assert!(h
        .audit
        .actions()
        .await
        .contains(&AuditAction::PasswordChange));
}

#[tokio::test]
async fn test_profile_is_sanitized() {
    let h = create_test_harness();
    let pair = h
        .sessions
        .register(register_request("me@x.com", "Password123"), &metadata())
        .await
        .unwrap();
    let me = h.sessions.authenticate(&pair.access_token).await.unwrap();

    let profile = h.sessions.profile(me.user_id).await.unwrap();
    assert!(profile.password_hash.is_none());
    assert!(profile.hashed_refresh_token.is_none());
}

#[tokio::test]
async fn test_audit_events_carry_request_metadata() {
    let h = create_test_harness();
    h.sessions
        .register(register_request("meta@x.com", "Password123"), &metadata())
        .await
        .unwrap();
    h.sessions
        .login("meta@x.com", "Password123", &metadata())
        .await
        .unwrap();

    let events = h.audit.events().await;
    assert_eq!(events.len(), 2);
    let login = &events[1];
    assert_eq!(login.action, AuditAction::Login);
    assert_eq!(login.ip.as_deref(), Some("198.51.100.7"));
    assert_eq!(login.user_agent.as_deref(), Some("sublow-tests/1.0"));
    assert!(!login.changes.to_string().contains("Password123"));
}

struct RejectingRecorder;

#[async_trait]
impl AuditRecorder for RejectingRecorder {
    async fn record(&self, _event: AuditEvent) -> AppResult<()> {
        Err(AppError::internal("audit sink offline"))
    }
}

fn orchestrator_with(
    revocation: RevocationStore,
    audit: Arc<dyn AuditRecorder>,
) -> SessionOrchestrator {
    common::init_test_logging();
    SessionOrchestrator::new(
        Arc::new(InMemoryUserStore::new()),
        revocation,
        Arc::new(ManualClock::new(common::test_start())),
        fast_hasher(),
        audit,
        &test_config(),
    )
}

#[tokio::test]
async fn test_audit_failure_does_not_fail_the_flow() {
    let sessions = orchestrator_with(RevocationStore::Disabled, Arc::new(RejectingRecorder));
    sessions
        .register(register_request("quiet@x.com", "Password123"), &metadata())
        .await
        .unwrap();
    sessions
        .login("quiet@x.com", "Password123", &metadata())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_disabled_revocation_leaves_access_token_valid() {
    let sessions = orchestrator_with(
        RevocationStore::Disabled,
        Arc::new(sublow_auth::audit::InMemoryAuditRecorder::new()),
    );
    let pair = sessions
        .register(register_request("norev@x.com", "Password123"), &metadata())
        .await
        .unwrap();
    let me = sessions.authenticate(&pair.access_token).await.unwrap();

    sessions
        .logout(me.user_id, Some(&pair.access_token), &metadata())
        .await
        .unwrap();

    // Without a revocation backend the access token lives out its lifetime,
    // but the refresh generation is still cleared
    sessions.authenticate(&pair.access_token).await.unwrap();
    assert!(matches!(
        sessions.refresh(&pair.refresh_token, &metadata()).await,
        Err(AuthError::AccessDenied)
    ));
}
