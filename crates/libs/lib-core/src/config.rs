//! # Application Configuration
//!
//! This module manages application configuration loaded from environment variables.
//! All configuration is validated on startup to fail fast if misconfigured.
//!
//! The config is built once by the server and handed to handlers through axum
//! state (`FromRef`), so tests can construct their own without touching the
//! process environment.

use lib_utils::{get_env, get_env_opt, get_env_or, get_env_parse_or};

/// Default upper bound for a message body, in characters.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 10_000;

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct Config {
    /// SQLite database connection URL
    pub database_url: String,

    /// Secret key used to verify participant credentials (HS256)
    ///
    /// **Must be at least 32 characters long** for security.
    pub jwt_secret: String,

    /// Maximum message content length in characters
    pub max_message_length: usize,

    /// Base URL of the listing catalog service.
    ///
    /// When unset, listing summaries are read from the local `listings` table.
    pub listing_catalog_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let database_url = get_env_or("DATABASE_URL", "sqlite:data/realty_chat.db");

        let jwt_secret = get_env("JWT_SECRET").map_err(|e| e.to_string())?;

        let max_message_length = get_env_parse_or("MAX_MESSAGE_LENGTH", DEFAULT_MAX_MESSAGE_LENGTH)
            .map_err(|e| e.to_string())?;

        let listing_catalog_url = get_env_opt("LISTING_CATALOG_URL")
            .map(|url| url.trim_end_matches('/').to_string());

        Ok(Self {
            database_url,
            jwt_secret,
            max_message_length,
            listing_catalog_url,
        })
    }

    /// Validate configuration values against security and business rules.
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.len() < 32 {
            return Err("JWT_SECRET must be at least 32 characters long".to_string());
        }

        if self.max_message_length == 0 || self.max_message_length > 100_000 {
            return Err("MAX_MESSAGE_LENGTH must be between 1 and 100000".to_string());
        }

        if let Some(url) = &self.listing_catalog_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err("LISTING_CATALOG_URL must be an http(s) URL".to_string());
            }
        }

        Ok(())
    }
}
