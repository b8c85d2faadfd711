//! Typed errors for notification delivery.
//!
//! Two families with very different handling:
//! - [`TransportError`] describes why a single attempt failed. It never leaves
//!   the coordinator; it only drives rotation, logging and circuit-breaker
//!   accounting.
//! - [`NotificationError`] is a contract violation by the caller (a request
//!   that cannot be sent anywhere). It is returned before any attempt is made.

use thiserror::Error;

/// Why one delivery attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Could not reach the server (refused, reset, DNS, TLS handshake).
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The server did not answer in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The server answered with a rejection.
    #[error("Rejected by server (permanent: {permanent}): {message}")]
    Rejected { permanent: bool, message: String },

    /// Credentials were refused.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The message could not be built for this transport.
    #[error("Message could not be built: {0}")]
    Message(String),

    /// The local mail agent failed or exited unsuccessfully.
    #[error("Local mail agent failed: {0}")]
    LocalAgent(String),
}

impl TransportError {
    /// Returns `true` when the same server might accept the message later.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) | Self::LocalAgent(_) => true,
            Self::Rejected { permanent, .. } => !*permanent,
            Self::Authentication(_) | Self::Message(_) => false,
        }
    }
}

/// A request that violates the coordinator's contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotificationError {
    /// The request has no recipient.
    #[error("Notification has no recipient")]
    MissingRecipient,

    /// An address on the request is not a valid mailbox.
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Both subject and body are empty.
    #[error("Notification has neither subject nor body")]
    EmptyMessage,
}

/// A server definition that cannot be turned into a working handle.
#[derive(Debug, Error)]
pub enum ServerConfigError {
    /// The configured sending address is not a valid mailbox address.
    #[error("Server {server}: invalid from address '{address}': {source}")]
    InvalidFromAddress {
        server: String,
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    /// The SMTP relay could not be set up (bad host name, TLS setup).
    #[error("Server {server}: {source}")]
    Relay {
        server: String,
        #[source]
        source: lettre::transport::smtp::Error,
    },

    /// A field holds a value the registry cannot work with.
    #[error("Server {server}: invalid {field}: {reason}")]
    Invalid {
        server: String,
        field: &'static str,
        reason: String,
    },

    /// Two servers share an identifier.
    #[error("Duplicate server id: {0}")]
    DuplicateId(String),
}
