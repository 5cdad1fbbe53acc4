use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::auth::password::PasswordDigest;
use crate::auth::permission::RoleId;
use crate::constants::{GRAVATAR_SECURE_URL, GRAVATAR_URL};

/// Storage identifier of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a registered account
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user identifier, assigned by storage
    pub id: UserId,
    /// Canonical email; changed only through `set_email`
    email: String,
    pub username: String,
    password: PasswordDigest,
    pub confirmed: bool,
    /// Assigned role, resolved through storage on demand
    pub role_id: Option<RoleId>,
    avatar_hash: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl User {
    /// Creates an unsaved, unconfirmed user without a role
    pub fn new(email: impl Into<String>, username: impl Into<String>, password: PasswordDigest) -> Self {
        let email = normalize_email(&email.into());
        let now = Utc::now();
        Self {
            id: UserId(0),
            avatar_hash: avatar_hash_for(&email),
            email,
            username: username.into(),
            password,
            confirmed: false,
            role_id: None,
            name: None,
            location: None,
            about_me: None,
            member_since: now,
            last_seen: now,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Replace the email and refresh the cached avatar hash
    pub fn set_email(&mut self, email: &str) {
        self.email = normalize_email(email);
        self.avatar_hash = avatar_hash_for(&self.email);
    }

    /// Install an already hashed password
    pub fn replace_password(&mut self, digest: PasswordDigest) {
        self.password = digest;
    }

    pub fn verify_password(&self, plaintext: &str) -> bool {
        self.password.verify(plaintext)
    }

    pub fn avatar_hash(&self) -> &str {
        &self.avatar_hash
    }

    /// Update last seen timestamp
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    /// Gravatar lookup URL for this user's avatar
    pub fn gravatar(&self, secure: bool, size: u32, default: &str, rating: &str) -> String {
        let base = if secure { GRAVATAR_SECURE_URL } else { GRAVATAR_URL };
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("s", &size.to_string())
            .append_pair("d", default)
            .append_pair("r", rating)
            .finish();
        format!("{}/{}?{}", base, self.avatar_hash, query)
    }

    /// Public view of the account; never includes email or password
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            name: self.name.clone(),
            location: self.location.clone(),
            about_me: self.about_me.clone(),
            member_since: self.member_since,
            last_seen: self.last_seen,
            avatar_url: self.gravatar(true, 180, "identicon", "g"),
        }
    }
}

/// Serializable public profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub avatar_url: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Non-secret fingerprint of an email, used only for avatar lookup
pub fn avatar_hash_for(email: &str) -> String {
    format!("{:x}", Sha256::digest(normalize_email(email).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        User::new(email, "tester", PasswordDigest::new("password-123").unwrap())
    }

    #[test]
    fn test_new_user_defaults() {
        let u = user("  Tester@Example.COM ");
        assert_eq!(u.email(), "tester@example.com");
        assert!(!u.confirmed);
        assert_eq!(u.role_id, None);
        assert_eq!(u.avatar_hash(), avatar_hash_for("tester@example.com"));
    }

    #[test]
    fn test_set_email_refreshes_avatar_hash() {
        let mut u = user("old@example.com");
        let before = u.avatar_hash().to_string();
        u.set_email("new@example.com");
        assert_ne!(u.avatar_hash(), before);
        assert_eq!(u.avatar_hash(), avatar_hash_for("new@example.com"));
    }

    #[test]
    fn test_password_roundtrip_through_user() {
        let mut u = user("a@example.com");
        assert!(u.verify_password("password-123"));
        u.replace_password(PasswordDigest::new("another-password").unwrap());
        assert!(!u.verify_password("password-123"));
        assert!(u.verify_password("another-password"));
    }

    #[test]
    fn test_gravatar_url() {
        let u = user("a@example.com");
        let url = u.gravatar(true, 64, "identicon", "g");
        assert!(url.starts_with(GRAVATAR_SECURE_URL));
        assert!(url.contains(u.avatar_hash()));
        assert!(url.ends_with("?s=64&d=identicon&r=g"));
        assert!(u.gravatar(false, 64, "mm", "pg").starts_with(GRAVATAR_URL));
    }

    #[test]
    fn test_profile_hides_email() {
        let u = user("private@example.com");
        let json = serde_json::to_string(&u.to_profile()).unwrap();
        assert!(!json.contains("private@example.com"));
        assert!(json.contains("tester"));
    }
}
