//! Outgoing mail collaborator
//!
//! Delivery is out of scope for this crate: the service hands finished
//! messages to a [`Mailer`] and surfaces its failures without retrying.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// Mailer that only records a log line per message
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        // Bodies carry tokens, never log them
        log::info!("Mail queued to {} with subject {:?}", email.to, email.subject);
        Ok(())
    }
}

/// Mailer that keeps every message in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    outbox: Arc<RwLock<Vec<OutgoingEmail>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.outbox.read().await.clone()
    }

    /// Most recent message sent to `to`
    pub async fn last_to(&self, to: &str) -> Option<OutgoingEmail> {
        self.outbox
            .read()
            .await
            .iter()
            .rev()
            .find(|m| m.to == to)
            .cloned()
    }

    /// Most recent message sent to `to` whose body contains `marker`
    pub async fn last_to_containing(&self, to: &str, marker: &str) -> Option<OutgoingEmail> {
        self.outbox
            .read()
            .await
            .iter()
            .rev()
            .find(|m| m.to == to && m.body.contains(marker))
            .cloned()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        self.outbox.write().await.push(email);
        Ok(())
    }
}

/// Builds messages with the configured sender and subject prefix
#[derive(Debug, Clone)]
pub struct MailComposer {
    sender: String,
    subject_prefix: String,
}

impl MailComposer {
    pub fn new(sender: impl Into<String>, subject_prefix: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            subject_prefix: subject_prefix.into(),
        }
    }

    pub fn compose(&self, to: &str, subject: &str, body: String) -> OutgoingEmail {
        OutgoingEmail {
            from: self.sender.clone(),
            to: to.to_string(),
            subject: format!("{} {}", self.subject_prefix, subject),
            body,
        }
    }

    pub fn confirm_account(&self, to: &str, username: &str, token: &str) -> OutgoingEmail {
        self.compose(
            to,
            "Confirm Your Account",
            format!(
                "Dear {},\n\nTo confirm your account please use this code:\n\n/auth/confirm/{}\n",
                username, token
            ),
        )
    }

    pub fn reset_password(&self, to: &str, username: &str, token: &str) -> OutgoingEmail {
        self.compose(
            to,
            "Reset Your Password",
            format!(
                "Dear {},\n\nTo reset your password use this code:\n\n/auth/reset/{}\n\nIf you did not request a reset, ignore this message.\n",
                username, token
            ),
        )
    }

    pub fn change_email(&self, to: &str, username: &str, token: &str) -> OutgoingEmail {
        self.compose(
            to,
            "Confirm your email address",
            format!(
                "Dear {},\n\nTo confirm your new email address use this code:\n\n/auth/change-email/{}\n",
                username, token
            ),
        )
    }

    pub fn new_user_notice(&self, to: &str, username: &str) -> OutgoingEmail {
        self.compose(to, "New User", format!("User {} has joined.\n", username))
    }
}

/// Extract the token that follows `marker` in a message body
pub fn token_from_body(body: &str, marker: &str) -> Option<String> {
    let start = body.find(marker)? + marker.len();
    body[start..]
        .split_whitespace()
        .next()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_prefix_and_token_link() {
        let composer = MailComposer::new("noreply@example.com", "[Blog]");
        let email = composer.confirm_account("a@example.com", "alice", "abc.def.ghi");
        assert_eq!(email.subject, "[Blog] Confirm Your Account");
        assert_eq!(
            token_from_body(&email.body, "/auth/confirm/").as_deref(),
            Some("abc.def.ghi")
        );
    }

    #[tokio::test]
    async fn test_memory_mailer_records() {
        let mailer = MemoryMailer::new();
        let composer = MailComposer::new("noreply@example.com", "[Blog]");
        mailer.send(composer.new_user_notice("admin@example.com", "bob")).await.unwrap();
        assert_eq!(mailer.sent().await.len(), 1);
        assert!(mailer.last_to("admin@example.com").await.is_some());
        assert!(mailer.last_to("nobody@example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_by_marker_skips_later_notices() {
        let mailer = MemoryMailer::new();
        let composer = MailComposer::new("noreply@example.com", "[Blog]");
        mailer
            .send(composer.confirm_account("admin@example.com", "admin", "tok.en.one"))
            .await
            .unwrap();
        mailer.send(composer.new_user_notice("admin@example.com", "admin")).await.unwrap();

        let last = mailer.last_to("admin@example.com").await.unwrap();
        assert!(token_from_body(&last.body, "/auth/confirm/").is_none());

        let confirm = mailer
            .last_to_containing("admin@example.com", "/auth/confirm/")
            .await
            .unwrap();
        assert_eq!(
            token_from_body(&confirm.body, "/auth/confirm/").as_deref(),
            Some("tok.en.one")
        );
    }
}
