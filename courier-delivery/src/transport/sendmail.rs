//! Local mail agent used as the last resort

use std::time::Duration;

use async_trait::async_trait;
use courier_common::{fallback, host::DEFAULT_HOST};
use lettre::{AsyncSendmailTransport, AsyncTransport, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::TransportError,
    notification::NotificationRequest,
    transport::{LocalTransport, message},
    types::{MessageId, TransportKind},
};

/// Settings for the local mail agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendmailConfig {
    /// Path of the sendmail-compatible binary
    #[serde(default = "default_command")]
    pub command: String,

    /// How long to wait for the agent to exit
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SendmailConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_command() -> String {
    "/usr/sbin/sendmail".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

/// [`LocalTransport`] piping messages into a sendmail-compatible binary
pub struct SendmailTransport {
    command: String,
    timeout: Duration,
    inner: AsyncSendmailTransport<Tokio1Executor>,
}

impl SendmailTransport {
    #[must_use]
    pub fn new(config: &SendmailConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            inner: AsyncSendmailTransport::<Tokio1Executor>::new_with_command(config.command.as_str()),
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    async fn deliver(&self, request: &NotificationRequest) -> Result<MessageId, TransportError> {
        let host = request
            .from
            .as_ref()
            .map_or(DEFAULT_HOST, |from| from.email.domain());
        let message_id = MessageId::generate(host);
        let message = message::build(request, &message_id)?;

        fallback!(level = DEBUG, message_id = %message_id, command = %self.command, "Piping message to local agent");

        match tokio::time::timeout(self.timeout, self.inner.send(message)).await {
            Ok(Ok(())) => Ok(message_id),
            Ok(Err(e)) => Err(TransportError::LocalAgent(e.to_string())),
            Err(_) => Err(TransportError::Timeout(format!(
                "{} did not finish within {}s",
                self.command,
                self.timeout.as_secs()
            ))),
        }
    }
}

impl std::fmt::Debug for SendmailTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendmailTransport")
            .field("command", &self.command)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LocalTransport for SendmailTransport {
    async fn send(&self, request: &NotificationRequest) -> bool {
        if request.transport != Some(TransportKind::Sendmail) {
            warn!(
                transport = ?request.transport,
                "Local transport used without the sendmail override"
            );
        }

        match self.deliver(request).await {
            Ok(message_id) => {
                tracing::info!(message_id = %message_id, command = %self.command, "Local agent accepted message");
                true
            }
            Err(e) => {
                warn!(command = %self.command, error = %e, "Local agent failed");
                false
            }
        }
    }
}
