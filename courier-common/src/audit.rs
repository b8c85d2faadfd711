//! Audit logging for notification delivery
//!
//! Structured events describing each step of a transactional notification's
//! attempt sequence:
//!
//! - `NotificationAttempt`: a send handed to an outbound server
//! - `NotificationSent`: an outbound server or the fallback accepted the message
//! - `NotificationFallback`: rotation gave up and the local transport is used
//! - `NotificationExhausted`: every attempt, fallback included, failed
//!
//! Recipient addresses can be redacted through [`AuditConfig`].

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Emit audit events at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Replace the local part of recipient addresses with `[REDACTED]`
    #[serde(default)]
    pub redact_recipients: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_recipients: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

static AUDIT_CONFIG: OnceLock<Arc<AuditConfig>> = OnceLock::new();

/// Install the audit configuration. Only the first call has any effect.
pub fn init(config: AuditConfig) {
    AUDIT_CONFIG.get_or_init(|| Arc::new(config));
}

/// Get the current audit configuration
#[must_use]
pub fn config() -> Arc<AuditConfig> {
    AUDIT_CONFIG
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::new(AuditConfig::default()))
}

/// Redact email address if redaction is enabled
///
/// Accepts a bare address or a `Name <user@host>` mailbox; only the domain of
/// the address itself survives redaction.
#[must_use]
pub fn redact_email(email: &str, redact: bool) -> String {
    if !redact {
        return email.to_string();
    }

    bare_address(email)
        .rsplit_once('@')
        .map_or_else(|| "[REDACTED]".to_string(), |(_, domain)| format!("[REDACTED]@{domain}"))
}

/// The `user@host` part of a mailbox, without display name or brackets
fn bare_address(mailbox: &str) -> &str {
    let mailbox = mailbox.trim();
    mailbox
        .rsplit_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map_or(mailbox, |(address, _)| address.trim())
}

/// Log an attempt against a rotating outbound server
///
/// `attempt` is 1-based.
pub fn log_attempt(recipient: &str, server: &str, attempt: usize) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "NotificationAttempt",
        recipient = %redact_email(recipient, config.redact_recipients),
        server = %server,
        attempt = attempt,
        "Audit: Notification attempt"
    );
}

/// Log a successful delivery, either by a rotating server or the fallback
///
/// `message_id` is only known for deliveries through an outbound server.
pub fn log_sent(
    message_id: Option<&str>,
    recipient: &str,
    via: &str,
    attempt: usize,
    duration_ms: u128,
) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "NotificationSent",
        message_id = message_id.unwrap_or("-"),
        recipient = %redact_email(recipient, config.redact_recipients),
        via = %via,
        attempt = attempt,
        duration_ms = duration_ms,
        "Audit: Notification sent"
    );
}

/// Log the switch to the local fallback transport
pub fn log_fallback(recipient: &str, sender: &str, rotating_attempts: usize) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::WARN,
        event = "NotificationFallback",
        recipient = %redact_email(recipient, config.redact_recipients),
        sender = %sender,
        rotating_attempts = rotating_attempts,
        "Audit: Falling back to local transport"
    );
}

/// Log a notification that could not be delivered by any means
pub fn log_exhausted(recipient: &str, attempts: usize) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::WARN,
        event = "NotificationExhausted",
        recipient = %redact_email(recipient, config.redact_recipients),
        attempts = attempts,
        "Audit: Notification delivery exhausted"
    );
}
