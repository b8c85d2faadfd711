//! Transactional notification delivery with bounded server failover
//!
//! This crate provides functionality to:
//! - Rotate a notification through up to three configured outbound servers
//! - Fall back to the local mail agent once rotation gives up
//! - Select servers by policy, hourly quota, and circuit breaker state
//! - Build and send messages over SMTP or sendmail

mod circuit_breaker;
mod coordinator;
mod error;
mod notification;
mod registry;
mod server;
pub mod transport;
mod types;
mod usage;

// Re-export circuit breaker types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, ServerBreakerConfig,
};
// Re-export the coordinator
pub use coordinator::{DeliveryAttemptCoordinator, FALLBACK_TRANSPORT, MAX_ROTATING_ATTEMPTS};
// Re-export error types
pub use error::{NotificationError, ServerConfigError, TransportError};
// Re-export notification builders
pub use notification::{NotificationRequest, PasswordReset};
// Re-export registry types
pub use registry::{RegisteredServer, SelectionPolicy, StaticServerRegistry};
// Re-export collaborator seams
pub use server::{OutboundServer, RequestContext, ServerRegistry, SiteConfig, StaticSite};
pub use transport::{LocalTransport, SendmailConfig, SendmailTransport, Security, SmtpServer, SmtpServerConfig};
// Re-export core types
pub use types::{AttemptOutcome, ExclusionSet, MessageId, ServerCapabilities, ServerId, TransportKind};
pub use usage::{USAGE_WINDOW, UsageTracker};
