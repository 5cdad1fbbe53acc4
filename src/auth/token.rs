//! Signed, self-expiring claim tokens
//!
//! A token binds one claim kind to one subject, e.g. `{"confirm": 42}`,
//! plus an optional payload and `iat`/`exp` timestamps. Tokens are HS256
//! JWTs: URL-safe, tamper-evident and verifiable without server-side
//! storage. Rotating the signing secret invalidates every outstanding
//! token; individual tokens cannot be revoked.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::user::UserId;
use crate::clock::{Clock, SystemClock};
use crate::constants::{DEFAULT_SESSION_TTL_SECS, DEFAULT_TOKEN_TTL_SECS, MAX_TOKEN_LENGTH};
use crate::error::{BlogError, Result, TokenError};

/// The action a token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    /// Confirm account ownership of the registered email
    Confirm,
    /// Set a new password without knowing the old one
    Reset,
    /// Move the account to the email carried in the payload
    ChangeEmail,
    /// Bearer session issued at login
    Session,
}

impl ClaimKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimKind::Confirm => "confirm",
            ClaimKind::Reset => "reset",
            ClaimKind::ChangeEmail => "change_email",
            ClaimKind::Session => "session",
        }
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{claim_kind: subject}` entry of the token body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Binding {
    Confirm(UserId),
    Reset(UserId),
    ChangeEmail(UserId),
    Session(UserId),
}

impl Binding {
    fn new(kind: ClaimKind, subject: UserId) -> Self {
        match kind {
            ClaimKind::Confirm => Binding::Confirm(subject),
            ClaimKind::Reset => Binding::Reset(subject),
            ClaimKind::ChangeEmail => Binding::ChangeEmail(subject),
            ClaimKind::Session => Binding::Session(subject),
        }
    }

    fn kind(&self) -> ClaimKind {
        match self {
            Binding::Confirm(_) => ClaimKind::Confirm,
            Binding::Reset(_) => ClaimKind::Reset,
            Binding::ChangeEmail(_) => ClaimKind::ChangeEmail,
            Binding::Session(_) => ClaimKind::Session,
        }
    }

    fn subject(&self) -> UserId {
        match self {
            Binding::Confirm(id)
            | Binding::Reset(id)
            | Binding::ChangeEmail(id)
            | Binding::Session(id) => *id,
        }
    }
}

/// Extra data carried by a token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimPayload {
    /// Proposed address of a `change_email` claim
    pub new_email: Option<String>,
}

impl ClaimPayload {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_new_email(email: impl Into<String>) -> Self {
        Self {
            new_email: Some(email.into()),
        }
    }
}

/// JWT body
#[derive(Debug, Serialize, Deserialize)]
struct ClaimSet {
    #[serde(flatten)]
    binding: Binding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_email: Option<String>,
    /// Issued at (as UTC timestamp)
    iat: i64,
    /// Expiration time (as UTC timestamp)
    exp: i64,
}

/// Issues and verifies claim tokens
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
    token_ttl: Duration,
    session_ttl: Duration,
}

impl TokenService {
    /// Creates a token service using the wall clock
    pub fn new(secret: &str) -> Self {
        Self::with_clock(secret, Arc::new(SystemClock))
    }

    pub fn with_clock(secret: &str, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against our own clock, without leeway
        validation.validate_exp = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            clock,
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }

    pub fn with_ttls(mut self, token_ttl: Duration, session_ttl: Duration) -> Self {
        self.token_ttl = token_ttl;
        self.session_ttl = session_ttl;
        self
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Sign a claim binding `kind` to `subject`, valid for `ttl`
    pub fn issue(
        &self,
        kind: ClaimKind,
        subject: UserId,
        payload: ClaimPayload,
        ttl: Duration,
    ) -> Result<String> {
        if kind == ClaimKind::ChangeEmail && payload.new_email.is_none() {
            return Err(BlogError::ValidationError(
                "change_email tokens require a new email".to_string(),
            ));
        }

        let now = self.clock.now().timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs())
            .map_err(|_| BlogError::ValidationError("Token lifetime too large".to_string()))?;

        let claims = ClaimSet {
            binding: Binding::new(kind, subject),
            new_email: payload.new_email,
            iat: now,
            exp: now.saturating_add(ttl_secs),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| BlogError::SystemError(format!("Failed to generate token: {}", e)))
    }

    /// Check a token for `expected_kind` and `expected_subject`.
    ///
    /// Signature and structure are checked first, then expiry, then the
    /// binding. The payload is returned only when all checks pass.
    pub fn verify(
        &self,
        token: &str,
        expected_kind: ClaimKind,
        expected_subject: UserId,
    ) -> std::result::Result<ClaimPayload, TokenError> {
        let claims = self.decode_claims(token)?;

        if claims.binding.kind() != expected_kind || claims.binding.subject() != expected_subject {
            return Err(TokenError::Mismatch);
        }

        if expected_kind == ClaimKind::ChangeEmail && claims.new_email.is_none() {
            return Err(TokenError::Invalid);
        }

        Ok(ClaimPayload {
            new_email: claims.new_email,
        })
    }

    /// Resolve the subject of a session token
    pub fn verify_session(&self, token: &str) -> std::result::Result<UserId, TokenError> {
        let claims = self.decode_claims(token)?;
        match claims.binding {
            Binding::Session(subject) => Ok(subject),
            _ => Err(TokenError::Mismatch),
        }
    }

    pub fn generate_confirmation_token(&self, user_id: UserId) -> Result<String> {
        self.issue(ClaimKind::Confirm, user_id, ClaimPayload::empty(), self.token_ttl)
    }

    pub fn generate_reset_token(&self, user_id: UserId) -> Result<String> {
        self.issue(ClaimKind::Reset, user_id, ClaimPayload::empty(), self.token_ttl)
    }

    pub fn generate_email_change_token(&self, user_id: UserId, new_email: &str) -> Result<String> {
        self.issue(
            ClaimKind::ChangeEmail,
            user_id,
            ClaimPayload::with_new_email(new_email),
            self.token_ttl,
        )
    }

    pub fn generate_session_token(&self, user_id: UserId) -> Result<String> {
        self.issue(ClaimKind::Session, user_id, ClaimPayload::empty(), self.session_ttl)
    }

    fn decode_claims(&self, token: &str) -> std::result::Result<ClaimSet, TokenError> {
        if token.is_empty() || token.len() > MAX_TOKEN_LENGTH || token.chars().any(|c| c.is_control()) {
            return Err(TokenError::Invalid);
        }

        let claims = decode::<ClaimSet>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                log::debug!("Token rejected: {}", e);
                TokenError::Invalid
            })?
            .claims;

        if self.clock.now().timestamp() > claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

/// Extracts bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<String> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const SECRET: &str = "token-unit-tests-signing-key-9f8e7d6c5b4a";

    fn service() -> (TokenService, ManualClock) {
        let clock = ManualClock::starting_now();
        (TokenService::with_clock(SECRET, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_body_binds_kind_to_subject() {
        let (tokens, _) = service();
        let token = tokens
            .issue(
                ClaimKind::ChangeEmail,
                UserId(7),
                ClaimPayload::with_new_email("new@example.com"),
                Duration::from_secs(60),
            )
            .unwrap();

        let claims = tokens.decode_claims(&token).unwrap();
        let body = serde_json::to_value(&claims).unwrap();
        assert_eq!(body["change_email"], 7);
        assert_eq!(body["new_email"], "new@example.com");
        assert_eq!(body["exp"].as_i64().unwrap() - body["iat"].as_i64().unwrap(), 60);
    }

    #[test]
    fn test_token_is_url_safe() {
        let (tokens, _) = service();
        let token = tokens.generate_confirmation_token(UserId(1)).unwrap();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'));
    }

    #[test]
    fn test_expiry_boundary() {
        let (tokens, clock) = service();
        let token = tokens
            .issue(ClaimKind::Reset, UserId(3), ClaimPayload::empty(), Duration::from_secs(10))
            .unwrap();

        clock.advance_secs(10);
        assert!(tokens.verify(&token, ClaimKind::Reset, UserId(3)).is_ok());

        clock.advance_secs(1);
        assert_eq!(
            tokens.verify(&token, ClaimKind::Reset, UserId(3)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_change_email_requires_payload() {
        let (tokens, _) = service();
        let result = tokens.issue(
            ClaimKind::ChangeEmail,
            UserId(1),
            ClaimPayload::empty(),
            Duration::from_secs(60),
        );
        assert!(matches!(result, Err(BlogError::ValidationError(_))));
    }

    #[test]
    fn test_session_tokens() {
        let (tokens, _) = service();
        let session = tokens.generate_session_token(UserId(5)).unwrap();
        assert_eq!(tokens.verify_session(&session), Ok(UserId(5)));

        let confirm = tokens.generate_confirmation_token(UserId(5)).unwrap();
        assert_eq!(tokens.verify_session(&confirm), Err(TokenError::Mismatch));
    }

    #[test]
    fn test_oversized_and_control_tokens_rejected() {
        let (tokens, _) = service();
        let huge = "a".repeat(MAX_TOKEN_LENGTH + 1);
        assert_eq!(tokens.verify_session(&huge), Err(TokenError::Invalid));
        assert_eq!(tokens.verify_session("abc\n.def"), Err(TokenError::Invalid));
        assert_eq!(tokens.verify_session(""), Err(TokenError::Invalid));
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc.def"), Some("abc.def".to_string()));
        assert_eq!(extract_bearer_token("Basic abc"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
    }
}
