// ABOUTME: Audit events emitted by the session flows
// ABOUTME: Fire-and-forget recorder trait with tracing and in-memory sinks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

//! # Audit Trail
//!
//! Every successful session flow emits exactly one [`AuditEvent`]. Recording
//! is fire-and-forget: callers log a failed write and carry on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use sublow_core::constants::audit;
use sublow_core::errors::AppResult;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Action tag of an audit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Password login or federated callback
    Login,
    /// Account registration
    Register,
    /// Session ended
    Logout,
    /// Refresh token rotated
    TokenRefresh,
    /// Password replaced
    PasswordChange,
}

impl AuditAction {
    /// Wire tag
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Login => audit::ACTION_LOGIN,
            Self::Register => audit::ACTION_REGISTER,
            Self::Logout => audit::ACTION_LOGOUT,
            Self::TokenRefresh => audit::ACTION_TOKEN_REFRESH,
            Self::PasswordChange => audit::ACTION_PASSWORD_CHANGE,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller context supplied by the transport layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Client address
    pub ip: Option<String>,
    /// Client user agent
    pub user_agent: Option<String>,
}

impl RequestMetadata {
    /// Metadata with both fields set
    #[must_use]
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            user_agent: Some(user_agent.into()),
        }
    }
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event identifier
    pub event_id: Uuid,
    /// When the flow completed
    pub timestamp: DateTime<Utc>,
    /// User who performed the action
    pub actor_user_id: Uuid,
    /// What happened
    pub action: AuditAction,
    /// Kind of entity affected
    pub entity_type: String,
    /// Affected entity
    pub entity_id: String,
    /// Minimal change summary, never containing secrets
    pub changes: serde_json::Value,
    /// Client address
    pub ip: Option<String>,
    /// Client user agent
    pub user_agent: Option<String>,
}

impl AuditEvent {
    /// Event for an action a user performed on their own account
    #[must_use]
    pub fn for_user(
        user_id: Uuid,
        action: AuditAction,
        changes: serde_json::Value,
        metadata: &RequestMetadata,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp,
            actor_user_id: user_id,
            action,
            entity_type: audit::ENTITY_USER.to_owned(),
            entity_id: user_id.to_string(),
            changes,
            ip: metadata.ip.clone(),
            user_agent: metadata.user_agent.clone(),
        }
    }
}

/// Sink for audit events
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    /// Persist or forward one event
    ///
    /// # Errors
    ///
    /// Returns an error if the sink rejects the event
    async fn record(&self, event: AuditEvent) -> AppResult<()>;
}

/// Writes audit events as structured `tracing` records on target `audit`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditRecorder;

#[async_trait]
impl AuditRecorder for TracingAuditRecorder {
    async fn record(&self, event: AuditEvent) -> AppResult<()> {
        tracing::info!(
            target: "audit",
            event_id = %event.event_id,
            actor_user_id = %event.actor_user_id,
            action = %event.action,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            changes = %event.changes,
            ip = ?event.ip,
            user_agent = ?event.user_agent,
            "Audit event"
        );
        Ok(())
    }
}

/// Keeps audit events in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditRecorder {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditRecorder {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events, oldest first
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    /// Recorded actions, oldest first
    pub async fn actions(&self) -> Vec<AuditAction> {
        self.events.lock().await.iter().map(|e| e.action).collect()
    }
}

#[async_trait]
impl AuditRecorder for InMemoryAuditRecorder {
    async fn record(&self, event: AuditEvent) -> AppResult<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}
