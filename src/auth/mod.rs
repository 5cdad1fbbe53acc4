//! Authentication and authorization module

pub mod guard;
pub mod password;
pub mod permission;
pub mod token;
pub mod user;

// Re-export main components
pub use guard::{Actor, GuardConfig, IdentityGuard};
pub use password::PasswordDigest;
pub use permission::{can_role, Permission, Role, RoleId, RoleSpec, ROLE_CATALOG};
pub use token::{ClaimKind, ClaimPayload, TokenService};
pub use user::{User, UserId, UserProfile};
