// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

// Token lifetimes
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 86400;
pub const MAX_TOKEN_LENGTH: usize = 2048;

// Mail defaults
pub const DEFAULT_MAIL_SUBJECT_PREFIX: &str = "[Bob's Bytes]";
pub const DEFAULT_MAIL_SENDER: &str = "Bob's Bytes Admin <noreply@bobsbytes.example>";

// Role catalog names
pub const ROLE_USER: &str = "User";
pub const ROLE_MODERATOR: &str = "Moderator";
pub const ROLE_ADMINISTRATOR: &str = "Administrator";

// Avatar lookup
pub const GRAVATAR_URL: &str = "http://www.gravatar.com/avatar";
pub const GRAVATAR_SECURE_URL: &str = "https://secure.gravatar.com/avatar";

// Field limits (column sizes)
pub const MAX_EMAIL_LENGTH: usize = 64;
pub const MAX_USERNAME_LENGTH: usize = 64;
pub const MIN_PASSWORD_LENGTH: usize = 8;
