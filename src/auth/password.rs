//! One-way password storage
//!
//! A [`PasswordDigest`] can be created from plaintext and checked against
//! plaintext. The stored hash has no accessor.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use std::fmt;

use crate::constants::MIN_PASSWORD_LENGTH;
use crate::error::{BlogError, Result};

#[derive(Clone)]
pub struct PasswordDigest {
    phc: String,
}

impl PasswordDigest {
    /// Hash a plaintext password with a fresh random salt
    pub fn new(plaintext: &str) -> Result<Self> {
        validate_password(plaintext)?;

        let salt = SaltString::generate(&mut rand::thread_rng());
        let phc = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| BlogError::SystemError(format!("Failed to hash password: {}", e)))?
            .to_string();

        Ok(Self { phc })
    }

    /// Compare a submitted plaintext against the stored hash
    pub fn verify(&self, plaintext: &str) -> bool {
        match PasswordHash::new(&self.phc) {
            Ok(parsed) => Argon2::default()
                .verify_password(plaintext.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                log::error!("Stored password hash is unreadable: {}", e);
                false
            }
        }
    }
}

impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordDigest(<redacted>)")
    }
}

pub fn validate_password(plaintext: &str) -> Result<()> {
    if plaintext.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(BlogError::ValidationError(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        )));
    }
    if plaintext.len() > 1024 {
        return Err(BlogError::ValidationError("Password is too long".to_string()));
    }
    Ok(())
}
