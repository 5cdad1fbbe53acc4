//! Bob's Bytes - identity core and HTTP service of a small blogging platform
//!
//! This library provides the permission model, signed claim tokens, the
//! identity guard and the account and content workflows built on them.

pub mod auth;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod security;
pub mod security_logger;
pub mod services;
pub mod storage;

// Re-export main components
pub use config::*;
pub use constants::*;
pub use error::{BlogError, Result, TokenError};
