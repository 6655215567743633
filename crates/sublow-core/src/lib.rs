// ABOUTME: Core types and constants for the Sublow identity and session core
// ABOUTME: Foundation crate with error handling and security policy constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

#![deny(unsafe_code)]

//! # Sublow Core
//!
//! Foundation crate shared by the auth core. It is designed to change
//! infrequently so the rest of the workspace compiles incrementally.
//!
//! ## Modules
//!
//! - **errors**: Unified error handling with `AppError` and `ErrorCode`
//! - **constants**: Token lifetimes, lockout policy, cache and audit vocabulary

/// Unified error handling system with standard error codes and HTTP statuses
pub mod errors;

/// Application constants organized by domain
pub mod constants;
