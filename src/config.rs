//! Application configuration module
//! Handles runtime parameters for the blog service

use crate::constants::{
    DEFAULT_HOST, DEFAULT_MAIL_SENDER, DEFAULT_MAIL_SUBJECT_PREFIX, DEFAULT_PORT,
    DEFAULT_SESSION_TTL_SECS, DEFAULT_TOKEN_TTL_SECS,
};
use crate::error::{BlogError, Result};
use std::env;
use std::time::Duration;

/// Application configuration parameters
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Secret used to sign claim and session tokens.
    /// Rotating it invalidates every outstanding token.
    pub secret_key: String,
    /// Address that is granted the Administrator role on registration
    pub admin_email: Option<String>,
    /// Lifetime of confirm, reset and change-email tokens
    pub token_ttl: Duration,
    /// Lifetime of login session tokens
    pub session_ttl: Duration,
    pub mail_subject_prefix: String,
    pub mail_sender: String,
}

impl AppConfig {
    /// Create a test configuration - DANGEROUS: Only for testing!
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            secret_key: "unit-tests-only-signing-key-0123456789-never-deploy".to_string(),
            admin_email: Some("admin@bobsbytes.example".to_string()),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            mail_subject_prefix: DEFAULT_MAIL_SUBJECT_PREFIX.to_string(),
            mail_sender: DEFAULT_MAIL_SENDER.to_string(),
        }
    }

    /// Validate that a secret meets security requirements
    fn validate_secret(secret: &str) -> Result<()> {
        if secret.len() < 32 {
            return Err(BlogError::ConfigError(
                "BLOG_SECRET_KEY must be at least 32 characters long".to_string(),
            ));
        }

        // Check for insecure default or example values
        let insecure_patterns = [
            "your-secret-key",
            "change-this",
            "changeme",
            "test-secret",
            "default",
            "secret",
            "password",
            "12345",
        ];

        for pattern in &insecure_patterns {
            if secret.to_lowercase().contains(pattern) {
                return Err(BlogError::ConfigError(format!(
                    "BLOG_SECRET_KEY contains insecure pattern '{}'. Please use a secure random value generated with: openssl rand -base64 32",
                    pattern
                )));
            }
        }

        if secret.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(BlogError::ConfigError(
                "BLOG_SECRET_KEY should contain mixed characters (letters, numbers, symbols)"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("BLOG_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = lookup("BLOG_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let secret_key = lookup("BLOG_SECRET_KEY")
            .or_else(|| lookup("SECRET_KEY"))
            .ok_or_else(|| {
                BlogError::ConfigError(
                    "BLOG_SECRET_KEY environment variable is required for token signing. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                )
            })?;
        Self::validate_secret(&secret_key)?;

        let admin_email = lookup("BLOG_ADMIN")
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        let token_ttl_secs = lookup("BLOG_TOKEN_TTL_SECS")
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        let session_ttl_secs = lookup("BLOG_SESSION_TTL_SECS")
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        if token_ttl_secs == 0 || session_ttl_secs == 0 {
            return Err(BlogError::ConfigError(
                "Token lifetimes must be greater than zero".to_string(),
            ));
        }

        let mail_subject_prefix = lookup("BLOG_MAIL_SUBJECT_PREFIX")
            .unwrap_or(DEFAULT_MAIL_SUBJECT_PREFIX.to_string());
        let mail_sender = lookup("BLOG_MAIL_SENDER").unwrap_or(DEFAULT_MAIL_SENDER.to_string());

        Ok(Self {
            host,
            port,
            secret_key,
            admin_email,
            token_ttl: Duration::from_secs(token_ttl_secs),
            session_ttl: Duration::from_secs(session_ttl_secs),
            mail_subject_prefix,
            mail_sender,
        })
    }
}
