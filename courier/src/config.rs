//! TOML configuration for the courier binary
//!
//! ```toml
//! [site]
//! name = "Example"
//! host = "example.com"
//!
//! [selection]
//! policy = "round-robin"
//!
//! [[servers]]
//! id = "primary"
//! host = "smtp.example.com"
//! from_address = "mailer@example.com"
//!
//! [sendmail]
//! command = "/usr/sbin/sendmail"
//! ```

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use courier_common::audit::AuditConfig;
use courier_delivery::{
    CircuitBreaker, CircuitBreakerConfig, DeliveryAttemptCoordinator, SelectionPolicy,
    SendmailConfig, SendmailTransport, ServerConfigError, SmtpServerConfig, StaticServerRegistry,
    StaticSite, UsageTracker,
};
use lettre::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "courier.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Server(#[from] ServerConfigError),
}

/// Site identity used for sending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSection {
    /// Display name on every sending identity
    #[serde(default = "default_site_name")]
    pub name: String,

    /// Host used for the fallback `noreply@` address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            host: None,
        }
    }
}

fn default_site_name() -> String {
    "courier".to_string()
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SelectionSection {
    #[serde(default)]
    pub policy: SelectionPolicy,
}

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteSection,

    #[serde(default)]
    pub selection: SelectionSection,

    #[serde(default)]
    pub servers: Vec<SmtpServerConfig>,

    #[serde(default)]
    pub sendmail: SendmailConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

impl Config {
    /// Read, parse and validate the file at `path`
    ///
    /// # Errors
    ///
    /// If the file cannot be read, is not valid TOML for this layout, or
    /// fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::parse(&text)?;
        tracing::debug!(path = %path.display(), servers = config.servers.len(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration text
    ///
    /// # Errors
    ///
    /// If the text is not valid TOML for this layout or fails validation.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the parts serde cannot
    ///
    /// # Errors
    ///
    /// On duplicate or empty server ids, empty server hosts, zero weights,
    /// a username without a password (or the reverse), invalid from
    /// addresses, or an empty sendmail command.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for server in &self.servers {
            if server.id.trim().is_empty() {
                return Err(ConfigError::Invalid("server id must not be empty".to_string()));
            }

            if !seen.insert(server.id.as_str()) {
                return Err(ServerConfigError::DuplicateId(server.id.clone()).into());
            }

            if server.host.trim().is_empty() {
                return Err(ServerConfigError::Invalid {
                    server: server.id.clone(),
                    field: "host",
                    reason: "must not be empty".to_string(),
                }
                .into());
            }

            if server.weight == 0 {
                return Err(ServerConfigError::Invalid {
                    server: server.id.clone(),
                    field: "weight",
                    reason: "must be at least 1".to_string(),
                }
                .into());
            }

            if server.username.is_some() != server.password.is_some() {
                let missing = if server.username.is_some() { "password" } else { "username" };
                return Err(ServerConfigError::Invalid {
                    server: server.id.clone(),
                    field: missing,
                    reason: "username and password must be set together".to_string(),
                }
                .into());
            }

            if let Err(source) = server.from_address.trim().parse::<Address>() {
                return Err(ServerConfigError::InvalidFromAddress {
                    server: server.id.clone(),
                    address: server.from_address.clone(),
                    source,
                }
                .into());
            }
        }

        if self.sendmail.command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "sendmail command must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// The collaborators built from a [`Config`]
#[derive(Clone)]
pub struct Courier {
    pub coordinator: DeliveryAttemptCoordinator,
    pub registry: Arc<StaticServerRegistry>,
    pub sendmail: Arc<SendmailTransport>,
}

impl Courier {
    /// Wire up the registry, fallback transport and coordinator
    ///
    /// `host` overrides the configured site host for the fallback sender.
    ///
    /// # Errors
    ///
    /// If a server definition cannot be turned into a live server.
    pub fn from_config(config: &Config, host: Option<String>) -> Result<Self, ConfigError> {
        let usage = Arc::new(UsageTracker::new());
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        let registry = Arc::new(StaticServerRegistry::from_configs(
            &config.servers,
            config.selection.policy,
            usage,
            breaker,
        )?);
        let sendmail = Arc::new(SendmailTransport::new(&config.sendmail));
        let site = Arc::new(StaticSite::new(
            config.site.name.clone(),
            host.or_else(|| config.site.host.clone()),
        ));

        let coordinator = DeliveryAttemptCoordinator::new(
            Arc::clone(&registry) as _,
            Arc::clone(&sendmail) as _,
            Arc::clone(&site) as _,
            site,
        );

        Ok(Self {
            coordinator,
            registry,
            sendmail,
        })
    }
}
