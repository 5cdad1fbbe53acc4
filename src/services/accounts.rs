//! Account lifecycle: roles, registration, login and the token-driven flows

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::guard::Actor;
use crate::auth::password::PasswordDigest;
use crate::auth::permission::{Permission, Role, RoleId, ROLE_CATALOG};
use crate::auth::token::{ClaimKind, ClaimPayload, TokenService};
use crate::auth::user::{normalize_email, User, UserId};
use crate::config::AppConfig;
use crate::constants::{MAX_EMAIL_LENGTH, MAX_USERNAME_LENGTH, ROLE_ADMINISTRATOR};
use crate::error::{BlogError, Result, TokenError};
use crate::mail::{MailComposer, Mailer};
use crate::security::AuthTimer;
use crate::security_logger::{SecurityEvent, SecurityLogger};
use crate::storage::StorageProvider;

/// Stored role whose permissions or default flag were replaced by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleOverride {
    pub role: String,
    pub stored: Permission,
    pub catalog: Permission,
}

/// Outcome of seeding the role catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub created: Vec<String>,
    pub unchanged: Vec<String>,
    pub overridden: Vec<RoleOverride>,
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    AlreadyConfirmed,
}

pub struct AccountService {
    storage: Arc<dyn StorageProvider>,
    tokens: Arc<TokenService>,
    mailer: Arc<dyn Mailer>,
    composer: MailComposer,
    security: Arc<SecurityLogger>,
    admin_email: Option<String>,
    login_floor: Duration,
}

impl AccountService {
    pub fn new(
        config: &AppConfig,
        storage: Arc<dyn StorageProvider>,
        tokens: Arc<TokenService>,
        mailer: Arc<dyn Mailer>,
        security: Arc<SecurityLogger>,
    ) -> Self {
        Self {
            storage,
            tokens,
            mailer,
            composer: MailComposer::new(config.mail_sender.clone(), config.mail_subject_prefix.clone()),
            security,
            admin_email: config.admin_email.as_deref().map(normalize_email),
            login_floor: Duration::from_millis(100),
        }
    }

    /// Override the minimum duration of a failed login
    pub fn with_login_floor(mut self, floor: Duration) -> Self {
        self.login_floor = floor;
        self
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Make the stored roles match the built-in catalog.
    ///
    /// Existing roles are matched by name and updated in place; operator
    /// edits to a catalog role are overwritten and reported.
    pub async fn insert_roles(&self) -> Result<SeedReport> {
        let roles = self.storage.role_storage();
        let mut report = SeedReport::default();

        for spec in ROLE_CATALOG.iter() {
            match roles.get_role_by_name(spec.name).await? {
                None => {
                    roles
                        .create_role(Role::new(RoleId(0), spec.name, spec.permissions, spec.default))
                        .await?;
                    log::info!("Created role {}", spec.name);
                    report.created.push(spec.name.to_string());
                }
                Some(existing) if existing.permissions == spec.permissions && existing.default == spec.default => {
                    report.unchanged.push(spec.name.to_string());
                }
                Some(mut existing) => {
                    log::warn!(
                        "Role {} differs from catalog ({} -> {}), overwriting",
                        spec.name,
                        existing.permissions,
                        spec.permissions
                    );
                    self.security
                        .log_event(SecurityEvent::RoleCatalogOverride {
                            role: spec.name.to_string(),
                            stored: existing.permissions,
                            catalog: spec.permissions,
                        })
                        .await;
                    report.overridden.push(RoleOverride {
                        role: spec.name.to_string(),
                        stored: existing.permissions,
                        catalog: spec.permissions,
                    });

                    existing.permissions = spec.permissions;
                    existing.default = spec.default;
                    roles.update_role(existing).await?;
                }
            }
        }

        Ok(report)
    }

    /// Create an unconfirmed account and mail its confirmation token
    pub async fn register(&self, email: &str, username: &str, password: &str) -> Result<User> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_username(username)?;
        let digest = PasswordDigest::new(password)?;

        let users = self.storage.user_storage();
        if users.get_user_by_email(&email).await?.is_some() {
            return Err(BlogError::EmailConflict);
        }
        if users.get_user_by_username(username).await?.is_some() {
            return Err(BlogError::UsernameTaken);
        }

        let mut user = User::new(email.as_str(), username, digest);
        user.role_id = self.role_for_new_user(&email).await?.map(|r| r.id);
        if user.role_id.is_none() {
            log::warn!("No role available for new user {}; run role seeding", username);
        }

        user.id = users.create_user(user.clone()).await?;
        log::info!("Registered user {} ({})", user.username, user.id);

        let token = self.tokens.generate_confirmation_token(user.id)?;
        self.mailer
            .send(self.composer.confirm_account(user.email(), &user.username, &token))
            .await?;

        if let Some(admin) = &self.admin_email {
            if let Err(e) = self.mailer.send(self.composer.new_user_notice(admin, &user.username)).await {
                log::warn!("Failed to notify administrator of new user: {}", e);
            }
        }

        Ok(user)
    }

    async fn role_for_new_user(&self, email: &str) -> Result<Option<Role>> {
        let roles = self.storage.role_storage();
        if self.admin_email.as_deref() == Some(email) {
            if let Some(admin) = roles.get_role_by_name(ROLE_ADMINISTRATOR).await? {
                return Ok(Some(admin));
            }
        }
        roles.get_default_role().await
    }

    /// Check credentials and issue a session token.
    ///
    /// Unknown accounts and wrong passwords fail the same way and take at
    /// least the login floor.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let timer = AuthTimer::new(self.login_floor);

        let user = match self.storage.user_storage().get_user_by_email(email).await? {
            Some(user) if user.verify_password(password) => user,
            found => {
                timer.wait().await;
                self.security
                    .log_event(SecurityEvent::AuthenticationFailed {
                        user_id: found.map(|u| u.id),
                        reason: "invalid credentials".to_string(),
                    })
                    .await;
                return Err(BlogError::InvalidCredentials);
            }
        };

        let token = self.tokens.generate_session_token(user.id)?;
        self.ping(user.id).await?;
        self.security
            .log_event(SecurityEvent::AuthenticationSuccess { user_id: user.id })
            .await;

        Ok(Session { token, user })
    }

    /// Turn a bearer session token into an acting identity
    pub async fn resolve_session(&self, token: &str) -> Result<Actor> {
        let user_id = match self.tokens.verify_session(token) {
            Ok(id) => id,
            Err(reason) => {
                self.security
                    .log_event(SecurityEvent::TokenValidationFailed {
                        kind: ClaimKind::Session,
                        user_id: None,
                        reason,
                    })
                    .await;
                return Err(BlogError::Unauthorized);
            }
        };

        let mut user = self
            .storage
            .user_storage()
            .get_user(user_id)
            .await?
            .ok_or(BlogError::Unauthorized)?;

        self.ping(user.id).await?;
        user.touch();

        let role = self.role_of(&user).await?;
        Ok(Actor::authenticated(user, role))
    }

    pub async fn role_of(&self, user: &User) -> Result<Option<Role>> {
        match user.role_id {
            Some(id) => self.storage.role_storage().get_role(id).await,
            None => Ok(None),
        }
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<User> {
        self.storage
            .user_storage()
            .get_user(user_id)
            .await?
            .ok_or_else(|| BlogError::NotFound(format!("User {} not found", user_id)))
    }

    /// Refresh the last-seen timestamp
    pub async fn ping(&self, user_id: UserId) -> Result<()> {
        self.storage.user_storage().update_last_seen(user_id, Utc::now()).await
    }

    /// Confirm the account of `user_id`. Repeating a confirmation with a
    /// valid token succeeds without changing anything.
    pub async fn confirm(&self, user_id: UserId, token: &str) -> Result<ConfirmOutcome> {
        self.check_token(token, ClaimKind::Confirm, user_id).await?;

        if !self.storage.user_storage().set_confirmed(user_id).await? {
            return Ok(ConfirmOutcome::AlreadyConfirmed);
        }
        log::info!("User {} confirmed", user_id);
        Ok(ConfirmOutcome::Confirmed)
    }

    /// Send a fresh confirmation token; returns false if already confirmed
    pub async fn resend_confirmation(&self, user_id: UserId) -> Result<bool> {
        let user = self.get_user(user_id).await?;
        if user.confirmed {
            return Ok(false);
        }

        let token = self.tokens.generate_confirmation_token(user.id)?;
        self.mailer
            .send(self.composer.confirm_account(user.email(), &user.username, &token))
            .await?;
        Ok(true)
    }

    pub async fn change_password(&self, user_id: UserId, old_password: &str, new_password: &str) -> Result<()> {
        let user = self.get_user(user_id).await?;
        if !user.verify_password(old_password) {
            self.security
                .log_event(SecurityEvent::AuthenticationFailed {
                    user_id: Some(user_id),
                    reason: "wrong password on password change".to_string(),
                })
                .await;
            return Err(BlogError::InvalidCredentials);
        }

        let digest = PasswordDigest::new(new_password)?;
        self.storage.user_storage().set_password(user_id, digest).await?;
        self.security
            .log_event(SecurityEvent::PasswordChanged { user_id, via_reset: false })
            .await;
        Ok(())
    }

    /// Mail a reset token if an account uses `email`. The outcome is the
    /// same whether or not the account exists.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        match self.storage.user_storage().get_user_by_email(email).await? {
            Some(user) => {
                let token = self.tokens.generate_reset_token(user.id)?;
                self.mailer
                    .send(self.composer.reset_password(user.email(), &user.username, &token))
                    .await
            }
            None => {
                log::debug!("Password reset requested for unknown address");
                Ok(())
            }
        }
    }

    /// Set a new password using a reset token issued to the account of `email`
    pub async fn reset_password(&self, email: &str, token: &str, new_password: &str) -> Result<()> {
        let user_id = match self.storage.user_storage().get_user_by_email(email).await? {
            Some(user) => user.id,
            // Unknown address looks the same as a token for another account
            None => return Err(BlogError::Token(TokenError::Mismatch)),
        };

        self.check_token(token, ClaimKind::Reset, user_id).await?;

        let digest = PasswordDigest::new(new_password)?;
        self.storage.user_storage().set_password(user_id, digest).await?;
        self.security
            .log_event(SecurityEvent::PasswordChanged { user_id, via_reset: true })
            .await;
        Ok(())
    }

    /// Mail a change-email token to the proposed address
    pub async fn request_email_change(&self, user_id: UserId, new_email: &str, password: &str) -> Result<()> {
        let user = self.get_user(user_id).await?;
        if !user.verify_password(password) {
            self.security
                .log_event(SecurityEvent::AuthenticationFailed {
                    user_id: Some(user_id),
                    reason: "wrong password on email change".to_string(),
                })
                .await;
            return Err(BlogError::InvalidCredentials);
        }

        let new_email = normalize_email(new_email);
        validate_email(&new_email)?;
        if self.storage.user_storage().get_user_by_email(&new_email).await?.is_some() {
            return Err(BlogError::EmailConflict);
        }

        let token = self.tokens.generate_email_change_token(user.id, &new_email)?;
        self.mailer
            .send(self.composer.change_email(&new_email, &user.username, &token))
            .await
    }

    /// Apply a change-email token and return the new address.
    ///
    /// Uniqueness is checked again here and enforced by storage inside the
    /// write; on conflict the account keeps its old address.
    pub async fn change_email(&self, user_id: UserId, token: &str) -> Result<String> {
        let payload = self.check_token(token, ClaimKind::ChangeEmail, user_id).await?;
        let new_email = payload
            .new_email
            .ok_or(BlogError::Token(TokenError::Invalid))?;

        let users = self.storage.user_storage();
        let new_email = normalize_email(&new_email);

        match users.get_user_by_email(&new_email).await? {
            Some(owner) if owner.id == user_id => return Ok(new_email),
            Some(_) => return self.email_conflict(user_id).await,
            None => {}
        }

        match users.set_email(user_id, &new_email).await {
            Ok(()) => {
                self.security.log_event(SecurityEvent::EmailChanged { user_id }).await;
                Ok(new_email)
            }
            Err(BlogError::EmailConflict) => self.email_conflict(user_id).await,
            Err(e) => Err(e),
        }
    }

    async fn email_conflict<T>(&self, user_id: UserId) -> Result<T> {
        self.security.log_event(SecurityEvent::EmailConflict { user_id }).await;
        Err(BlogError::EmailConflict)
    }

    /// Move a user to another role; administrators only
    pub async fn assign_role(&self, actor: &Actor, username: &str, role_name: &str) -> Result<()> {
        if !actor.is_administrator() {
            self.security
                .log_event(SecurityEvent::PermissionDenied {
                    user_id: actor.user().map(|u| u.id),
                    action: "admin.assign_role".to_string(),
                    required: Permission::ADMINISTER,
                })
                .await;
            return Err(if actor.is_authenticated() {
                BlogError::Forbidden
            } else {
                BlogError::Unauthorized
            });
        }

        let role = self
            .storage
            .role_storage()
            .get_role_by_name(role_name)
            .await?
            .ok_or_else(|| BlogError::NotFound(format!("Role {} not found", role_name)))?;
        let user = self
            .storage
            .user_storage()
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| BlogError::NotFound(format!("User {} not found", username)))?;

        self.storage.user_storage().set_role(user.id, role.id).await?;
        log::info!("User {} moved to role {}", username, role.name);
        Ok(())
    }

    async fn check_token(
        &self,
        token: &str,
        kind: ClaimKind,
        user_id: UserId,
    ) -> Result<ClaimPayload> {
        match self.tokens.verify(token, kind, user_id) {
            Ok(payload) => Ok(payload),
            Err(reason) => {
                self.security
                    .log_event(SecurityEvent::TokenValidationFailed {
                        kind,
                        user_id: Some(user_id),
                        reason,
                    })
                    .await;
                Err(BlogError::Token(reason))
            }
        }
    }
}

/// Minimal shape check: one `@` with text on both sides and a dotted domain
pub fn validate_email(email: &str) -> Result<()> {
    let invalid = || BlogError::ValidationError("Invalid email address".to_string());

    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(invalid());
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        return Err(invalid());
    }
    Ok(())
}

/// Usernames start with a letter and contain only letters, digits, dots or underscores
pub fn validate_username(username: &str) -> Result<()> {
    let mut chars = username.chars();
    let starts_with_letter = chars.next().map_or(false, |c| c.is_ascii_alphabetic());
    if !starts_with_letter
        || username.len() > MAX_USERNAME_LENGTH
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
    {
        return Err(BlogError::ValidationError(
            "Usernames must have only letters, numbers, dots or underscores".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::constants::{ROLE_MODERATOR, ROLE_USER};
    use crate::mail::{token_from_body, MemoryMailer};
    use crate::storage::MemoryStorageProvider;

    struct Fixture {
        accounts: AccountService,
        storage: Arc<MemoryStorageProvider>,
        mailer: MemoryMailer,
        clock: ManualClock,
    }

    async fn fixture() -> Fixture {
        let config = AppConfig::for_testing();
        let clock = ManualClock::starting_now();
        let storage = Arc::new(MemoryStorageProvider::new());
        let mailer = MemoryMailer::new();
        let tokens = Arc::new(TokenService::with_clock(&config.secret_key, Arc::new(clock.clone())));
        let accounts = AccountService::new(
            &config,
            storage.clone(),
            tokens,
            Arc::new(mailer.clone()),
            Arc::new(SecurityLogger::new()),
        )
        .with_login_floor(Duration::from_millis(5));
        accounts.insert_roles().await.unwrap();
        Fixture {
            accounts,
            storage,
            mailer,
            clock,
        }
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@b.io").is_ok());
        assert!(validate_email("no-at-sign.io").is_err());
        assert!(validate_email("a@@b.io").is_err());
        assert!(validate_email("a@localhost").is_err());
        assert!(validate_email("a b@c.io").is_err());
        assert!(validate_email(&format!("{}@b.io", "x".repeat(MAX_EMAIL_LENGTH))).is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("john.doe_2").is_ok());
        assert!(validate_username("2john").is_err());
        assert!(validate_username("john doe").is_err());
        assert!(validate_username("").is_err());
    }

    #[tokio::test]
    async fn test_seeding_is_stable_and_reports_overrides() {
        let f = fixture().await;

        let again = f.accounts.insert_roles().await.unwrap();
        assert!(again.created.is_empty());
        assert!(again.overridden.is_empty());
        assert_eq!(again.unchanged.len(), 3);

        let roles = f.storage.role_storage();
        let mut moderator = roles.get_role_by_name(ROLE_MODERATOR).await.unwrap().unwrap();
        moderator.permissions = Permission::FOLLOW;
        roles.update_role(moderator).await.unwrap();

        let report = f.accounts.insert_roles().await.unwrap();
        assert_eq!(report.overridden.len(), 1);
        assert_eq!(report.overridden[0].stored, Permission::FOLLOW);
        let restored = roles.get_role_by_name(ROLE_MODERATOR).await.unwrap().unwrap();
        assert!(restored.can(Permission::MODERATE_COMMENTS));
        assert!(!restored.default);
    }

    #[tokio::test]
    async fn test_register_assigns_roles() {
        let f = fixture().await;

        let user = f.accounts.register("u@example.com", "plain", "plain-pass-1").await.unwrap();
        let role = f.accounts.role_of(&user).await.unwrap().unwrap();
        assert_eq!(role.name, ROLE_USER);
        assert!(!user.confirmed);

        let admin = f
            .accounts
            .register("Admin@BobsBytes.example", "boss", "boss-pass-1")
            .await
            .unwrap();
        let role = f.accounts.role_of(&admin).await.unwrap().unwrap();
        assert!(role.is_administrator());

        let notices: Vec<_> = f
            .mailer
            .sent()
            .await
            .into_iter()
            .filter(|m| m.to == "admin@bobsbytes.example" && m.subject.ends_with("New User"))
            .collect();
        assert_eq!(notices.len(), 2);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let f = fixture().await;
        f.accounts.register("dup@example.com", "first", "pass-word-1").await.unwrap();

        assert!(matches!(
            f.accounts.register("DUP@example.com", "second", "pass-word-1").await,
            Err(BlogError::EmailConflict)
        ));
        assert!(matches!(
            f.accounts.register("other@example.com", "first", "pass-word-1").await,
            Err(BlogError::UsernameTaken)
        ));
    }

    #[tokio::test]
    async fn test_login_failures_look_alike() {
        let f = fixture().await;
        f.accounts.register("l@example.com", "logger", "right-pass-1").await.unwrap();

        let wrong = f.accounts.login("l@example.com", "wrong-pass-1").await;
        let unknown = f.accounts.login("nobody@example.com", "right-pass-1").await;
        assert!(matches!(wrong, Err(BlogError::InvalidCredentials)));
        assert!(matches!(unknown, Err(BlogError::InvalidCredentials)));

        let session = f.accounts.login("l@example.com", "right-pass-1").await.unwrap();
        let actor = f.accounts.resolve_session(&session.token).await.unwrap();
        assert_eq!(actor.user().unwrap().username, "logger");
    }

    #[tokio::test]
    async fn test_confirm_then_expiry() {
        let f = fixture().await;
        let user = f.accounts.register("c@example.com", "confirmer", "conf-pass-1").await.unwrap();
        let mail = f.mailer.last_to("c@example.com").await.unwrap();
        let token = token_from_body(&mail.body, "/auth/confirm/").unwrap();

        assert_eq!(f.accounts.confirm(user.id, &token).await.unwrap(), ConfirmOutcome::Confirmed);
        assert_eq!(
            f.accounts.confirm(user.id, &token).await.unwrap(),
            ConfirmOutcome::AlreadyConfirmed
        );

        f.clock.advance_secs(3601);
        assert!(matches!(
            f.accounts.confirm(user.id, &token).await,
            Err(BlogError::Token(TokenError::Expired))
        ));
    }

    #[tokio::test]
    async fn test_reset_password_for_unknown_email_is_token_failure() {
        let f = fixture().await;
        f.accounts.request_password_reset("ghost@example.com").await.unwrap();
        assert!(f.mailer.sent().await.is_empty());

        let result = f.accounts.reset_password("ghost@example.com", "x.y.z", "new-pass-1").await;
        assert!(matches!(result, Err(BlogError::Token(_))));
    }
}
