// ABOUTME: Data models for the identity core
// ABOUTME: Re-exports user records, partial updates and the lockout state machine
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

//! # Data Models
//!
//! - `User`: the account record authentication reads and mutates
//! - `NewUser` / `UserUpdate`: creation input and partial updates for the record store
//! - `LockoutPolicy` / `LockoutOutcome`: failed-login lockout transitions

/// Failed-login lockout state machine
pub mod lockout;
/// User account records
pub mod user;

pub use lockout::{remaining_minutes, LockoutOutcome, LockoutPolicy};
pub use user::{normalize_email, AuthProvider, NewUser, User, UserRole, UserUpdate};
