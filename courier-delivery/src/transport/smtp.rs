//! Outbound server relaying through SMTP

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use courier_common::outbound;
use lettre::{
    Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    transport::smtp::{self, authentication::Credentials},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    circuit_breaker::CircuitBreaker,
    error::{ServerConfigError, TransportError},
    notification::NotificationRequest,
    server::OutboundServer,
    transport::message,
    types::{AttemptOutcome, MessageId, ServerCapabilities, ServerId, TransportKind},
    usage::UsageTracker,
};

/// How the connection to the relay is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// Implicit TLS (usually port 465)
    Tls,
    /// Plain connection upgraded with STARTTLS (usually port 587)
    #[default]
    StartTls,
    /// No encryption at all
    None,
}

/// Definition of one SMTP outbound server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpServerConfig {
    pub id: String,
    pub host: String,

    /// Port override; the security mode's usual port is used otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default)]
    pub security: Security,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Sending identity for mail through this server
    pub from_address: String,

    /// Relative selection weight for weighted selection
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Maximum sends within a rolling hour; unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_quota: Option<u32>,

    #[serde(default)]
    pub can_embed_images: bool,

    /// Timeout for each SMTP command
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_weight() -> u32 {
    1
}

const fn default_timeout_secs() -> u64 {
    30
}

/// An [`OutboundServer`] backed by a `lettre` SMTP transport
///
/// Reports every attempt to the shared [`CircuitBreaker`] and records
/// successful sends in the shared [`UsageTracker`].
pub struct SmtpServer {
    id: ServerId,
    from_address: Address,
    capabilities: ServerCapabilities,
    weight: u32,
    hourly_quota: Option<u32>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    usage: Arc<UsageTracker>,
    breaker: Arc<CircuitBreaker>,
}

impl SmtpServer {
    /// Build a server handle from its definition
    ///
    /// # Errors
    ///
    /// If the from address is invalid, the weight is zero, only one of
    /// username and password is set, or the relay cannot be set up for the
    /// requested security mode.
    pub fn from_config(
        config: &SmtpServerConfig,
        usage: Arc<UsageTracker>,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ServerConfigError> {
        let from_address = config.from_address.trim().parse::<Address>().map_err(|source| {
            ServerConfigError::InvalidFromAddress {
                server: config.id.clone(),
                address: config.from_address.clone(),
                source,
            }
        })?;

        if config.weight == 0 {
            return Err(ServerConfigError::Invalid {
                server: config.id.clone(),
                field: "weight",
                reason: "must be at least 1".to_string(),
            });
        }

        let relay = |source: smtp::Error| ServerConfigError::Relay {
            server: config.id.clone(),
            source,
        };

        let mut builder = match config.security {
            Security::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host).map_err(relay)?,
            Security::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(relay)?
            }
            Security::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };

        if let Some(port) = config.port {
            builder = builder.port(port);
        }

        match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
            (None, None) => {}
            (Some(_), None) => return Err(half_credentials(config, "password", "username")),
            (None, Some(_)) => return Err(half_credentials(config, "username", "password")),
        }

        let transport = builder
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self {
            id: ServerId::from(config.id.as_str()),
            from_address,
            capabilities: ServerCapabilities {
                can_embed_images: config.can_embed_images,
                transport: TransportKind::Smtp,
            },
            weight: config.weight,
            hourly_quota: config.hourly_quota,
            transport,
            usage,
            breaker,
        })
    }

    #[must_use]
    pub const fn weight(&self) -> u32 {
        self.weight
    }

    #[must_use]
    pub const fn hourly_quota(&self) -> Option<u32> {
        self.hourly_quota
    }
}

impl std::fmt::Debug for SmtpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpServer")
            .field("id", &self.id)
            .field("from_address", &self.from_address)
            .field("weight", &self.weight)
            .field("hourly_quota", &self.hourly_quota)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OutboundServer for SmtpServer {
    fn id(&self) -> &ServerId {
        &self.id
    }

    fn from_address(&self) -> &Address {
        &self.from_address
    }

    fn capabilities(&self) -> ServerCapabilities {
        self.capabilities
    }

    async fn send(&self, request: &NotificationRequest) -> AttemptOutcome {
        let message_id = MessageId::generate(self.from_address.domain());
        let message = match message::build(request, &message_id) {
            Ok(message) => message,
            Err(e) => return AttemptOutcome::Failed(e),
        };

        outbound!(level = DEBUG, message_id = %message_id, server = %self.id, "Handing message to relay");

        let outcome = match self.transport.send(message).await {
            Ok(response) => {
                debug!(server = %self.id, response = ?response, "Relay accepted message");
                AttemptOutcome::Sent(message_id)
            }
            Err(e) => AttemptOutcome::Failed(classify(&e)),
        };

        match &outcome {
            AttemptOutcome::Sent(_) => {
                self.breaker.record_success(&self.id);
            }
            AttemptOutcome::Failed(e) if e.is_temporary() => {
                self.breaker.record_failure(&self.id);
            }
            AttemptOutcome::Failed(_) => {}
        }

        outcome
    }

    fn log_usage(&self) {
        self.usage.record(&self.id);
    }
}

fn half_credentials(config: &SmtpServerConfig, missing: &'static str, present: &str) -> ServerConfigError {
    ServerConfigError::Invalid {
        server: config.id.clone(),
        field: missing,
        reason: format!("required when {present} is set"),
    }
}

/// Map a `lettre` SMTP error onto our attempt failure kinds
fn classify(error: &smtp::Error) -> TransportError {
    let message = error.to_string();

    if error.is_timeout() {
        return TransportError::Timeout(message);
    }

    if let Some(code) = error.status() {
        let code = code.to_string();
        // 530 auth required, 534 mechanism too weak, 535 credentials invalid
        if matches!(code.as_str(), "530" | "534" | "535") {
            return TransportError::Authentication(message);
        }
    }

    if error.is_permanent() {
        TransportError::Rejected {
            permanent: true,
            message,
        }
    } else if error.is_transient() {
        TransportError::Rejected {
            permanent: false,
            message,
        }
    } else {
        TransportError::Connection(message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> SmtpServerConfig {
        SmtpServerConfig {
            id: "primary".to_string(),
            host: "localhost".to_string(),
            port: Some(2525),
            security: Security::None,
            username: None,
            password: None,
            from_address: "mailer@example.com".to_string(),
            weight: 2,
            hourly_quota: Some(100),
            can_embed_images: true,
            timeout_secs: 5,
        }
    }

    fn build(config: &SmtpServerConfig) -> Result<SmtpServer, ServerConfigError> {
        SmtpServer::from_config(
            config,
            Arc::new(UsageTracker::new()),
            Arc::new(CircuitBreaker::default()),
        )
    }

    #[test]
    fn test_from_config() {
        let server = build(&config()).unwrap();

        assert_eq!(server.id().as_str(), "primary");
        assert_eq!(server.from_address().to_string(), "mailer@example.com");
        assert_eq!(server.weight(), 2);
        assert_eq!(server.hourly_quota(), Some(100));
        assert_eq!(
            server.capabilities(),
            ServerCapabilities {
                can_embed_images: true,
                transport: TransportKind::Smtp,
            }
        );
    }

    #[test]
    fn test_every_security_mode_builds_without_runtime() {
        for security in [Security::Tls, Security::StartTls, Security::None] {
            let mut config = config();
            config.host = "smtp.example.com".to_string();
            config.security = security;

            let server = build(&config).unwrap();
            drop(server);
        }
    }

    #[test]
    fn test_half_set_credentials_rejected() {
        let mut config = config();
        config.username = Some("user".to_string());
        assert!(matches!(
            build(&config),
            Err(ServerConfigError::Invalid { field: "password", .. })
        ));

        config.username = None;
        config.password = Some("secret".to_string());
        assert!(matches!(
            build(&config),
            Err(ServerConfigError::Invalid { field: "username", .. })
        ));

        config.username = Some("user".to_string());
        assert!(build(&config).is_ok());
    }

    #[test]
    fn test_invalid_from_address() {
        let mut config = config();
        config.from_address = "not-an-address".to_string();

        assert!(matches!(
            build(&config),
            Err(ServerConfigError::InvalidFromAddress { .. })
        ));
    }

    #[test]
    fn test_zero_weight_rejected() {
        let mut config = config();
        config.weight = 0;

        assert!(matches!(
            build(&config),
            Err(ServerConfigError::Invalid { field: "weight", .. })
        ));
    }

    #[test]
    fn test_log_usage_records() {
        let usage = Arc::new(UsageTracker::new());
        let server =
            SmtpServer::from_config(&config(), Arc::clone(&usage), Arc::new(CircuitBreaker::default()))
                .unwrap();

        server.log_usage();
        server.log_usage();
        assert_eq!(usage.usage_in_window(server.id()), 2);
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_and_trips_breaker() {
        // Port 9 on localhost is expected to refuse connections
        let mut config = config();
        config.port = Some(9);
        config.timeout_secs = 2;

        let breaker = Arc::new(CircuitBreaker::new(crate::CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        }));
        let server =
            SmtpServer::from_config(&config, Arc::new(UsageTracker::new()), Arc::clone(&breaker))
                .unwrap();

        let mut request = NotificationRequest::new("jane@example.com", "Hi", "Body");
        request.from = Some(lettre::message::Mailbox::new(None, server.from_address().clone()));

        let outcome = server.send(&request).await;
        assert!(matches!(outcome, AttemptOutcome::Failed(ref e) if e.is_temporary()));
        assert!(!breaker.should_allow_delivery(server.id()));
    }
}
