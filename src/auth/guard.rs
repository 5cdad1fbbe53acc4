//! Access gate combining role permissions with account state

use crate::auth::permission::{can_role, Permission, Role};
use crate::auth::user::User;
use crate::error::{BlogError, Result};

/// Policy values for the guard, supplied at construction
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Permissions granted to callers without a session
    pub anonymous_permissions: Permission,
    /// Endpoint prefixes reachable by unconfirmed accounts
    pub unconfirmed_exempt_prefixes: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            anonymous_permissions: Permission::NONE,
            unconfirmed_exempt_prefixes: vec!["auth.".to_string(), "static".to_string()],
        }
    }
}

/// Identity performing an operation
#[derive(Debug, Clone)]
pub enum Actor {
    Anonymous,
    Authenticated { user: User, role: Option<Role> },
}

impl Actor {
    pub fn authenticated(user: User, role: Option<Role>) -> Self {
        Actor::Authenticated { user, role }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Actor::Authenticated { user, .. } => Some(user),
            Actor::Anonymous => None,
        }
    }

    pub fn role(&self) -> Option<&Role> {
        match self {
            Actor::Authenticated { role, .. } => role.as_ref(),
            Actor::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Actor::Authenticated { .. })
    }

    pub fn is_administrator(&self) -> bool {
        self.role().map_or(false, Role::is_administrator)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentityGuard {
    config: GuardConfig,
}

impl IdentityGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Permission check for any actor. Anonymous callers get the configured
    /// anonymous policy; an empty policy denies everything.
    pub fn can(&self, actor: &Actor, permission: Permission) -> bool {
        match actor {
            Actor::Anonymous => {
                let granted = self.config.anonymous_permissions;
                !granted.is_empty() && granted.contains(permission)
            }
            Actor::Authenticated { role, .. } => can_role(role.as_ref(), permission),
        }
    }

    pub fn require_permission(&self, role: Option<&Role>, permission: Permission) -> Result<()> {
        if can_role(role, permission) {
            Ok(())
        } else {
            Err(BlogError::Forbidden)
        }
    }

    pub fn require_admin(&self, role: Option<&Role>) -> Result<()> {
        self.require_permission(role, Permission::ADMINISTER)
    }

    pub fn is_exempt(&self, endpoint: &str) -> bool {
        self.config
            .unconfirmed_exempt_prefixes
            .iter()
            .any(|prefix| endpoint.starts_with(prefix.as_str()))
    }

    /// Unconfirmed accounts may only reach exempt endpoints
    pub fn require_confirmed(&self, user: &User, endpoint: &str) -> Result<()> {
        if user.confirmed || self.is_exempt(endpoint) {
            Ok(())
        } else {
            Err(BlogError::MustConfirmFirst)
        }
    }

    pub fn require_authenticated<'a>(&self, actor: &'a Actor) -> Result<&'a User> {
        actor.user().ok_or(BlogError::Unauthorized)
    }

    /// Full gate for `endpoint`: session, confirmation state, then permission
    pub fn authorize(&self, actor: &Actor, endpoint: &str, permission: Permission) -> Result<()> {
        match actor {
            Actor::Anonymous => {
                if self.can(actor, permission) {
                    Ok(())
                } else {
                    Err(BlogError::Unauthorized)
                }
            }
            Actor::Authenticated { user, role } => {
                self.require_confirmed(user, endpoint)?;
                self.require_permission(role.as_ref(), permission)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::PasswordDigest;
    use crate::auth::permission::RoleId;

    fn user(confirmed: bool) -> User {
        let mut u = User::new("g@example.com", "guarded", PasswordDigest::new("guard-pass-1").unwrap());
        u.confirmed = confirmed;
        u
    }

    fn writer() -> Role {
        Role::new(
            RoleId(1),
            "User",
            Permission::FOLLOW | Permission::COMMENT | Permission::WRITE_ARTICLES,
            true,
        )
    }

    #[test]
    fn test_require_permission() {
        let guard = IdentityGuard::default();
        assert!(guard.require_permission(Some(&writer()), Permission::COMMENT).is_ok());
        assert!(matches!(
            guard.require_permission(Some(&writer()), Permission::MODERATE_COMMENTS),
            Err(BlogError::Forbidden)
        ));
        assert!(matches!(
            guard.require_permission(None, Permission::FOLLOW),
            Err(BlogError::Forbidden)
        ));
        assert!(guard.require_admin(Some(&writer())).is_err());
    }

    #[test]
    fn test_unconfirmed_only_reaches_exempt_endpoints() {
        let guard = IdentityGuard::default();
        let pending = user(false);
        assert!(guard.require_confirmed(&pending, "auth.confirm").is_ok());
        assert!(guard.require_confirmed(&pending, "static").is_ok());
        assert!(matches!(
            guard.require_confirmed(&pending, "api.create_post"),
            Err(BlogError::MustConfirmFirst)
        ));
        assert!(guard.require_confirmed(&user(true), "api.create_post").is_ok());
    }

    #[test]
    fn test_authorize_orders_checks() {
        let guard = IdentityGuard::default();

        let pending = Actor::authenticated(user(false), Some(writer()));
        assert!(matches!(
            guard.authorize(&pending, "api.create_post", Permission::WRITE_ARTICLES),
            Err(BlogError::MustConfirmFirst)
        ));

        let active = Actor::authenticated(user(true), Some(writer()));
        assert!(guard
            .authorize(&active, "api.create_post", Permission::WRITE_ARTICLES)
            .is_ok());
        assert!(matches!(
            guard.authorize(&active, "api.moderate", Permission::MODERATE_COMMENTS),
            Err(BlogError::Forbidden)
        ));

        assert!(matches!(
            guard.authorize(&Actor::Anonymous, "api.create_post", Permission::WRITE_ARTICLES),
            Err(BlogError::Unauthorized)
        ));
    }

    #[test]
    fn test_anonymous_policy_is_configurable() {
        let strict = IdentityGuard::default();
        assert!(!strict.can(&Actor::Anonymous, Permission::FOLLOW));
        assert!(!strict.can(&Actor::Anonymous, Permission::NONE));

        let open = IdentityGuard::new(GuardConfig {
            anonymous_permissions: Permission::FOLLOW,
            ..GuardConfig::default()
        });
        assert!(open.can(&Actor::Anonymous, Permission::FOLLOW));
        assert!(!open.can(&Actor::Anonymous, Permission::COMMENT));
    }

    #[test]
    fn test_roleless_user_is_denied() {
        let guard = IdentityGuard::default();
        let actor = Actor::authenticated(user(true), None);
        assert!(!guard.can(&actor, Permission::FOLLOW));
        assert!(!actor.is_administrator());
    }
}
