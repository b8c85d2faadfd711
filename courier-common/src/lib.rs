//! Shared building blocks for the courier crates: logging setup, audit events
//! and the [`Host`] value type used to derive fallback sender identities.

pub mod audit;
pub mod host;
pub mod logging;

pub use host::Host;
pub use tracing;
