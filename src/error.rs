use std::error::Error;
use std::fmt;

/// Reasons a claim token was refused.
///
/// The variants stay distinct for logging, but callers facing the acting
/// user should only ever show [`TokenError::public_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Bad signature, malformed structure or unexpected algorithm
    Invalid,
    /// The embedded expiration is in the past
    Expired,
    /// Valid token, but for another claim kind or another subject
    Mismatch,
}

impl TokenError {
    /// Message shown to the acting user, identical for every failure
    pub fn public_message(&self) -> &'static str {
        "The link is invalid or has expired."
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::Mismatch => "mismatch",
        }
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "Token is malformed or its signature does not match"),
            Self::Expired => write!(f, "Token has expired"),
            Self::Mismatch => write!(f, "Token was issued for another claim or subject"),
        }
    }
}

impl Error for TokenError {}

#[derive(Debug)]
pub enum BlogError {
    // Token errors
    Token(TokenError),

    // Account errors
    EmailConflict,
    UsernameTaken,
    InvalidCredentials,

    // Access errors
    Unauthorized,
    Forbidden,
    MustConfirmFirst,

    // Lookup errors
    NotFound(String),

    // Validation errors
    ValidationError(String),

    // Collaborator errors
    StorageError(String),
    MailError(String),

    // System errors
    SystemError(String),

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for BlogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(err) => write!(f, "Token error: {}", err),
            Self::EmailConflict => write!(f, "Email address is already registered"),
            Self::UsernameTaken => write!(f, "Username is already in use"),
            Self::InvalidCredentials => write!(f, "Invalid email or password"),
            Self::Unauthorized => write!(f, "Authentication required"),
            Self::Forbidden => write!(f, "Forbidden: insufficient permissions"),
            Self::MustConfirmFirst => write!(f, "Account must be confirmed first"),
            Self::NotFound(what) => write!(f, "Not found: {}", what),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Self::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Self::MailError(msg) => write!(f, "Mail error: {}", msg),
            Self::SystemError(msg) => write!(f, "System error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for BlogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Token(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TokenError> for BlogError {
    fn from(err: TokenError) -> Self {
        BlogError::Token(err)
    }
}

// Generic result type for the blog service
pub type Result<T> = std::result::Result<T, BlogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_failures_share_public_message() {
        let messages: Vec<_> = [TokenError::Invalid, TokenError::Expired, TokenError::Mismatch]
            .iter()
            .map(|e| e.public_message())
            .collect();
        assert!(messages.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_token_error_converts() {
        let err: BlogError = TokenError::Expired.into();
        assert!(matches!(err, BlogError::Token(TokenError::Expired)));
        assert!(err.source().is_some());
    }
}
