// ABOUTME: Main library entry point for the Sublow identity and session core
// ABOUTME: Password and federated login, token rotation, lockout and access token revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

#![deny(unsafe_code)]

//! # Sublow Auth
//!
//! Identity and session-security core of the Sublow group-payment platform.
//! Transport is left to the caller: every flow takes its tokens and request
//! metadata as explicit arguments and returns typed results.
//!
//! ## Features
//!
//! - **Password login** with a per-account brute-force lockout
//! - **Token pairs**: short-lived access and long-lived refresh tokens signed
//!   with independent secrets, single-use refresh rotation
//! - **Revocation**: logged-out access tokens are listed in Redis (or an
//!   in-process LRU) until they would have expired anyway
//! - **Federated identity**: Google and Apple profiles linked by email
//! - **Audit trail**: one event per completed flow
//!
//! ## Architecture
//!
//! - **Models**: user records and the lockout state machine
//! - **Database plugins**: the `UserStore` seam with in-memory and `SQLite` backends
//! - **Cache**: the revocation store with in-memory and Redis backends
//! - **Auth**: credential validation, tokens, identity linking and the
//!   session orchestrator that composes them
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sublow_auth::audit::{RequestMetadata, TracingAuditRecorder};
//! use sublow_auth::auth::SessionOrchestrator;
//! use sublow_auth::cache::RevocationStore;
//! use sublow_auth::clock::SystemClock;
//! use sublow_auth::config::AuthConfig;
//! use sublow_auth::crypto::Argon2Hasher;
//! use sublow_auth::database_plugins::InMemoryUserStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AuthConfig::from_env()?;
//!     let sessions = SessionOrchestrator::new(
//!         Arc::new(InMemoryUserStore::new()),
//!         RevocationStore::from_config(&config.cache).await?,
//!         Arc::new(SystemClock),
//!         Arc::new(Argon2Hasher::default()),
//!         Arc::new(TracingAuditRecorder),
//!         &config,
//!     );
//!
//!     let pair = sessions
//!         .login("a@x.com", "Password123", &RequestMetadata::default())
//!         .await?;
//!     println!("access token expires in {:?}", sessions.tokens().access_ttl());
//!     drop(pair);
//!     Ok(())
//! }
//! ```

/// Audit events emitted by the session flows
pub mod audit;

/// Authentication flows
pub mod auth;

/// Revocation store backends
pub mod cache;

/// Injectable time source
pub mod clock;

/// Environment-driven configuration
pub mod config;

/// Password hashing and fingerprints
pub mod crypto;

/// User record stores
pub mod database_plugins;

/// Structured logging setup
pub mod logging;

/// User records and lockout transitions
pub mod models;

pub use sublow_core::errors;
pub use sublow_core::constants;
