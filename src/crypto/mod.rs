// ABOUTME: Cryptography module for password hashing and token fingerprints
// ABOUTME: Centralizes the one-way transforms used by the identity core
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

//! Cryptographic utilities for the identity core

/// Argon2id hashing and token fingerprints
pub mod password;

pub use password::{constant_time_eq, fingerprint, Argon2Hasher, PasswordHasher};
