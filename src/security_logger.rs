//! Security-focused logging module to track security events

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::auth::permission::Permission;
use crate::auth::token::ClaimKind;
use crate::auth::user::UserId;
use crate::error::TokenError;

/// Types of security events to track
#[derive(Debug, Clone)]
pub enum SecurityEvent {
    // Authentication events
    AuthenticationFailed { user_id: Option<UserId>, reason: String },
    AuthenticationSuccess { user_id: UserId },
    TokenValidationFailed { kind: ClaimKind, user_id: Option<UserId>, reason: TokenError },

    // Authorization events
    PermissionDenied { user_id: Option<UserId>, action: String, required: Permission },
    UnconfirmedAccess { user_id: UserId, endpoint: String },

    // Account changes
    PasswordChanged { user_id: UserId, via_reset: bool },
    EmailChanged { user_id: UserId },
    EmailConflict { user_id: UserId },

    // System security
    RoleCatalogOverride { role: String, stored: Permission, catalog: Permission },
    ConfigurationError { component: String, error: String },
}

/// Security event with timestamp
#[derive(Debug, Clone)]
struct TimestampedEvent {
    event: SecurityEvent,
    timestamp: Instant,
}

/// Security logger for tracking and alerting on security events
pub struct SecurityLogger {
    events: Arc<RwLock<Vec<TimestampedEvent>>>,
    event_counts: Arc<RwLock<HashMap<String, usize>>>,
    max_events: usize,
    alert_thresholds: HashMap<String, usize>,
}

impl SecurityLogger {
    /// Create a new security logger
    pub fn new() -> Self {
        let mut alert_thresholds = HashMap::new();
        // Authentication
        alert_thresholds.insert("auth_failed".to_string(), 5);
        alert_thresholds.insert("token_validation_failed".to_string(), 10);

        // Authorization
        alert_thresholds.insert("permission_denied".to_string(), 20);
        alert_thresholds.insert("unconfirmed_access".to_string(), 20);

        // Account changes
        alert_thresholds.insert("email_conflict".to_string(), 3);

        // System security
        alert_thresholds.insert("config_error".to_string(), 1);

        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            event_counts: Arc::new(RwLock::new(HashMap::new())),
            max_events: 10000,
            alert_thresholds,
        }
    }

    /// Log a security event
    pub async fn log_event(&self, event: SecurityEvent) {
        let event_key = Self::event_key(&event);
        let timestamped_event = TimestampedEvent {
            event: event.clone(),
            timestamp: Instant::now(),
        };

        // Add to events list
        {
            let mut events = self.events.write().await;
            events.push(timestamped_event);

            // Limit memory usage
            if events.len() > self.max_events {
                let events_to_remove = events.len() - self.max_events;
                events.drain(0..events_to_remove);
            }
        }

        // Update counters and check for alerts
        {
            let mut counts = self.event_counts.write().await;
            let count = counts.entry(event_key.to_string()).or_insert(0);
            *count += 1;

            if let Some(&threshold) = self.alert_thresholds.get(event_key) {
                if *count % threshold == 0 {
                    self.trigger_alert(event_key, *count, &event);
                }
            }
        }

        match event {
            SecurityEvent::AuthenticationFailed { user_id, reason } => {
                log::warn!("SECURITY: Authentication failed - User: {:?}, Reason: {}", user_id, reason);
            }
            SecurityEvent::AuthenticationSuccess { user_id } => {
                log::info!("SECURITY: Authentication success - User: {}", user_id);
            }
            SecurityEvent::TokenValidationFailed { kind, user_id, reason } => {
                log::warn!(
                    "SECURITY: Token validation failed - Kind: {}, User: {:?}, Reason: {}",
                    kind,
                    user_id,
                    reason.as_str()
                );
            }
            SecurityEvent::PermissionDenied { user_id, action, required } => {
                log::warn!(
                    "SECURITY: Permission denied - User: {:?}, Action: {}, Required: {}",
                    user_id,
                    action,
                    required
                );
            }
            SecurityEvent::UnconfirmedAccess { user_id, endpoint } => {
                log::info!("SECURITY: Unconfirmed account blocked - User: {}, Endpoint: {}", user_id, endpoint);
            }
            SecurityEvent::PasswordChanged { user_id, via_reset } => {
                log::info!("SECURITY: Password changed - User: {}, Via reset: {}", user_id, via_reset);
            }
            SecurityEvent::EmailChanged { user_id } => {
                log::info!("SECURITY: Email changed - User: {}", user_id);
            }
            SecurityEvent::EmailConflict { user_id } => {
                log::warn!("SECURITY: Email change refused, address taken - User: {}", user_id);
            }
            SecurityEvent::RoleCatalogOverride { role, stored, catalog } => {
                log::warn!(
                    "SECURITY: Role '{}' permissions reset from {} to catalog value {}",
                    role,
                    stored,
                    catalog
                );
            }
            SecurityEvent::ConfigurationError { component, error } => {
                log::error!("SECURITY: Configuration error - Component: {}, Error: {}", component, error);
            }
        }
    }

    /// Get event key for tracking
    fn event_key(event: &SecurityEvent) -> &'static str {
        match event {
            SecurityEvent::AuthenticationFailed { .. } => "auth_failed",
            SecurityEvent::AuthenticationSuccess { .. } => "auth_success",
            SecurityEvent::TokenValidationFailed { .. } => "token_validation_failed",
            SecurityEvent::PermissionDenied { .. } => "permission_denied",
            SecurityEvent::UnconfirmedAccess { .. } => "unconfirmed_access",
            SecurityEvent::PasswordChanged { .. } => "password_changed",
            SecurityEvent::EmailChanged { .. } => "email_changed",
            SecurityEvent::EmailConflict { .. } => "email_conflict",
            SecurityEvent::RoleCatalogOverride { .. } => "role_catalog_override",
            SecurityEvent::ConfigurationError { .. } => "config_error",
        }
    }

    /// Trigger security alert
    fn trigger_alert(&self, event_type: &str, count: usize, sample_event: &SecurityEvent) {
        log::error!("SECURITY ALERT: {} events of type '{}' detected", count, event_type);
        log::error!("Sample event: {:?}", sample_event);
    }

    /// Get recent security events
    pub async fn get_recent_events(&self, duration: Duration) -> Vec<SecurityEvent> {
        let events = self.events.read().await;
        let now = Instant::now();

        events
            .iter()
            .filter(|event| now.duration_since(event.timestamp) <= duration)
            .map(|event| event.event.clone())
            .collect()
    }

    /// Number of events recorded under `key`
    pub async fn event_count(&self, key: &str) -> usize {
        self.event_counts.read().await.get(key).copied().unwrap_or(0)
    }

    /// Clean up old events
    pub async fn cleanup_old_events(&self, max_age: Duration) {
        let mut events = self.events.write().await;
        let now = Instant::now();

        events.retain(|event| now.duration_since(event.timestamp) <= max_age);
    }

    /// Start periodic cleanup task
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300)); // Every 5 minutes
            loop {
                interval.tick().await;
                self.cleanup_old_events(Duration::from_secs(3600 * 24)).await; // Keep 24 hours
            }
        });
    }
}

impl Default for SecurityLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_by_event_type() {
        let logger = SecurityLogger::new();
        logger
            .log_event(SecurityEvent::TokenValidationFailed {
                kind: ClaimKind::Reset,
                user_id: Some(UserId(1)),
                reason: TokenError::Expired,
            })
            .await;
        logger
            .log_event(SecurityEvent::AuthenticationSuccess { user_id: UserId(1) })
            .await;

        assert_eq!(logger.event_count("token_validation_failed").await, 1);
        assert_eq!(logger.event_count("auth_success").await, 1);
        assert_eq!(logger.event_count("auth_failed").await, 0);
        assert_eq!(logger.get_recent_events(Duration::from_secs(60)).await.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_drops_old_events() {
        let logger = SecurityLogger::new();
        logger
            .log_event(SecurityEvent::EmailChanged { user_id: UserId(2) })
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        logger.cleanup_old_events(Duration::from_millis(5)).await;
        assert!(logger.get_recent_events(Duration::from_secs(60)).await.is_empty());
        // Counters survive cleanup
        assert_eq!(logger.event_count("email_changed").await, 1);
    }
}
