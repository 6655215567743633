// ABOUTME: Configuration module for the identity core
// ABOUTME: Auth secrets and policy plus revocation cache settings, loaded from the environment
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

//! Configuration module
//!
//! - **Environment**: signing secrets, token lifetimes, lockout policy, store URL
//! - **Cache**: revocation cache backend and Redis connection settings

/// Revocation cache configuration
pub mod cache;
/// Environment and auth configuration
pub mod environment;

pub use cache::{CacheBackend, CacheConfig, RedisConnectionConfig};
pub use environment::{AuthConfig, SecretString, DEFAULT_DATABASE_URL};
