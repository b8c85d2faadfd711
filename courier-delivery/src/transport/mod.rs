//! Concrete mail transports
//!
//! - [`SmtpServer`]: an [`OutboundServer`](crate::OutboundServer) relaying through SMTP
//! - [`SendmailTransport`]: the [`LocalTransport`] used as last resort

use async_trait::async_trait;

use crate::notification::NotificationRequest;

pub mod message;
pub mod sendmail;
pub mod smtp;

pub use sendmail::{SendmailConfig, SendmailTransport};
pub use smtp::{Security, SmtpServer, SmtpServerConfig};

/// Last-resort delivery that does not depend on any configured server
#[async_trait]
pub trait LocalTransport: Send + Sync {
    /// Returns `true` if the local agent accepted the message.
    async fn send(&self, request: &NotificationRequest) -> bool;
}
