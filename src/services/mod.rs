//! Application workflows built on the auth core and storage

pub mod accounts;
pub mod content;

pub use accounts::{AccountService, ConfirmOutcome, RoleOverride, SeedReport, Session};
pub use content::ContentService;

use crate::auth::guard::{Actor, IdentityGuard};
use crate::auth::permission::Permission;
use crate::error::{BlogError, Result};
use crate::security_logger::{SecurityEvent, SecurityLogger};

/// Run the guard for `endpoint` and record any denial
pub(crate) async fn authorize_logged(
    guard: &IdentityGuard,
    security: &SecurityLogger,
    actor: &Actor,
    endpoint: &str,
    permission: Permission,
) -> Result<()> {
    let result = guard.authorize(actor, endpoint, permission);
    if let Err(ref err) = result {
        let user_id = actor.user().map(|u| u.id);
        match (err, user_id) {
            (BlogError::MustConfirmFirst, Some(user_id)) => {
                security
                    .log_event(SecurityEvent::UnconfirmedAccess {
                        user_id,
                        endpoint: endpoint.to_string(),
                    })
                    .await;
            }
            _ => {
                security
                    .log_event(SecurityEvent::PermissionDenied {
                        user_id,
                        action: endpoint.to_string(),
                        required: permission,
                    })
                    .await;
            }
        }
    }
    result
}

/// Anonymous callers pass; an authenticated caller must be confirmed
pub(crate) async fn require_confirmed_logged(
    guard: &IdentityGuard,
    security: &SecurityLogger,
    actor: &Actor,
    endpoint: &str,
) -> Result<()> {
    let user = match actor.user() {
        Some(user) => user,
        None => return Ok(()),
    };
    let result = guard.require_confirmed(user, endpoint);
    if result.is_err() {
        security
            .log_event(SecurityEvent::UnconfirmedAccess {
                user_id: user.id,
                endpoint: endpoint.to_string(),
            })
            .await;
    }
    result
}
