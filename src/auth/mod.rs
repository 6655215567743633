// ABOUTME: Authentication flows for the identity core
// ABOUTME: Credential checks, token lifecycle, federated linking and session orchestration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

//! # Authentication
//!
//! - [`CredentialValidator`]: password checks with the brute-force lockout
//! - [`TokenService`]: access/refresh pairs, rotation and revocation
//! - [`IdentityLinker`]: Google and Apple profiles mapped onto users by email
//! - [`SessionOrchestrator`]: the login, register, logout, refresh and
//!   callback flows built from the above

/// Password validation and lockout
pub mod credentials;
/// Authentication error taxonomy
pub mod errors;
/// Federated identity linking
pub mod identity;
/// Session flows
pub mod session;
/// Token pairs
pub mod tokens;

pub use credentials::CredentialValidator;
pub use errors::{AuthError, AuthResult};
pub use identity::{FederatedProfile, IdentityLinker, IdentityProvider};
pub use session::{AuthenticatedUser, RegisterRequest, SessionOrchestrator};
pub use tokens::{Claims, TokenPair, TokenService, TokenType};
