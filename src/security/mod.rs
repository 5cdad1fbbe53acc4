//! Security utilities and middleware

pub mod headers;
pub mod timing;
pub mod xss;

pub use headers::with_api_security_headers;
pub use timing::AuthTimer;
pub use xss::{contains_xss_patterns, render_comment_markdown, render_markdown};
