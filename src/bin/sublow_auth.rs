// ABOUTME: Operator command-line tool for the Sublow identity core
// ABOUTME: Hashes passwords, mints and inspects tokens, migrates the schema and checks configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Sublow

//! Usage:
//! ```bash
//! # Hash a password with the production Argon2id parameters
//! cargo run --bin sublow-auth -- hash-password --password 'Password123'
//!
//! # Check a password against a stored hash
//! cargo run --bin sublow-auth -- verify-password --password 'Password123' --hash '$argon2id$...'
//!
//! # Mint a token pair for a user (reads JWT_SECRET and JWT_REFRESH_SECRET)
//! cargo run --bin sublow-auth -- issue-tokens --user-id <uuid> --email a@x.com --role ADMIN
//!
//! # Decode and verify a token
//! cargo run --bin sublow-auth -- verify-token --token <jwt> [--refresh]
//!
//! # Create the users table
//! cargo run --bin sublow-auth -- migrate --database-url sqlite:./data/users.db
//!
//! # Validate configuration and probe the revocation backend
//! cargo run --bin sublow-auth -- check-config
//! ```

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use sublow_auth::{
    auth::{TokenService, TokenType},
    cache::RevocationStore,
    clock::SystemClock,
    config::AuthConfig,
    crypto::{Argon2Hasher, PasswordHasher},
    database_plugins::{InMemoryUserStore, SqliteUserStore},
    logging::LoggingConfig,
    models::UserRole,
};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "sublow-auth",
    about = "Sublow identity core operator tool",
    long_about = "Operator utilities for the Sublow identity core: password hashing, token inspection, schema setup and configuration checks."
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Hash a password with Argon2id
    HashPassword {
        /// Plaintext password
        #[arg(long)]
        password: String,
    },

    /// Verify a password against an Argon2 PHC string
    VerifyPassword {
        /// Plaintext password
        #[arg(long)]
        password: String,

        /// Stored hash
        #[arg(long)]
        hash: String,
    },

    /// Mint a token pair without touching any store
    IssueTokens {
        /// User id placed in `sub`
        #[arg(long)]
        user_id: Uuid,

        /// User email
        #[arg(long)]
        email: String,

        /// Role (USER, ADMIN, `SYSTEM_OWNER`)
        #[arg(long, default_value = "USER")]
        role: String,
    },

    /// Verify a token's signature, type and expiry
    VerifyToken {
        /// Encoded token
        #[arg(long)]
        token: String,

        /// Verify as a refresh token instead of an access token
        #[arg(long)]
        refresh: bool,
    },

    /// Create the users table
    Migrate {
        /// Database URL override
        #[arg(long)]
        database_url: Option<String>,
    },

    /// Validate configuration and probe the revocation backend
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::from_env();
    if args.verbose {
        "debug".clone_into(&mut logging.level);
    }
    logging.init()?;

    match args.command {
        Command::HashPassword { password } => {
            let hash = Argon2Hasher::default().hash(&password).await?;
            println!("{hash}");
        }
        Command::VerifyPassword { password, hash } => {
            let matches = Argon2Hasher::default().verify(&password, &hash).await?;
            println!("{}", if matches { "valid" } else { "invalid" });
            if !matches {
                std::process::exit(1);
            }
        }
        Command::IssueTokens {
            user_id,
            email,
            role,
        } => {
            let role: UserRole = role.parse()?;
            let pair = offline_token_service()?.mint(user_id, &email, role)?;
            println!("access_token: {}", pair.access_token);
            println!("refresh_token: {}", pair.refresh_token);
        }
        Command::VerifyToken { token, refresh } => {
            let service = offline_token_service()?;
            let claims = if refresh {
                service.verify_refresh(&token)?
            } else {
                service.verify_access(&token).await?
            };
            let expected = if refresh {
                TokenType::Refresh
            } else {
                TokenType::Access
            };
            info!(user_id = %claims.sub, typ = expected.as_str(), "Token verified");
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        Command::Migrate { database_url } => {
            let database_url = match database_url {
                Some(url) => url,
                None => AuthConfig::from_env()?.database_url,
            };
            info!("Running migrations against {database_url}");
            // Connecting creates the schema
            SqliteUserStore::connect(&database_url).await?;
            info!("Migrations complete");
        }
        Command::CheckConfig => check_config().await?,
    }

    Ok(())
}

/// Token service backed by throwaway stores, for signing and decoding only
fn offline_token_service() -> Result<TokenService> {
    let config = AuthConfig::from_env()?;
    Ok(TokenService::new(
        &config,
        Arc::new(InMemoryUserStore::new()),
        RevocationStore::Disabled,
        Arc::new(SystemClock),
    ))
}

async fn check_config() -> Result<()> {
    let config = AuthConfig::from_env()?;
    info!(
        access_ttl_minutes = config.access_token_ttl.num_minutes(),
        refresh_ttl_days = config.refresh_token_ttl.num_days(),
        max_failed_attempts = config.lockout.max_failed_attempts,
        lockout_minutes = config.lockout.lockout_duration.num_minutes(),
        revocation_backend = %config.cache.backend,
        "Auth configuration is valid"
    );

    let revocation = RevocationStore::from_config(&config.cache).await?;
    if revocation.is_enabled() {
        revocation
            .health_check()
            .await
            .map_err(|e| anyhow!("Revocation backend unhealthy: {e}"))?;
        info!("Revocation backend reachable");
    } else {
        warn!("Revocation is disabled; logged-out access tokens stay valid until expiry");
    }

    SqliteUserStore::connect(&config.database_url).await?;
    info!("Database reachable");
    Ok(())
}
