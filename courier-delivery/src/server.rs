//! Collaborator seams consumed by the coordinator

use std::sync::Arc;

use async_trait::async_trait;
use lettre::Address;

use crate::{
    notification::NotificationRequest,
    types::{AttemptOutcome, ExclusionSet, ServerCapabilities, ServerId},
};

/// A configured server able to send mail
///
/// Handles are owned by a [`ServerRegistry`]; the coordinator only holds one
/// for the duration of a single attempt.
#[async_trait]
pub trait OutboundServer: Send + Sync + std::fmt::Debug {
    fn id(&self) -> &ServerId;

    /// Address used as the sending identity for mail through this server
    fn from_address(&self) -> &Address;

    fn capabilities(&self) -> ServerCapabilities;

    /// Attempt to deliver `request`
    ///
    /// Failures are reported through [`AttemptOutcome::Failed`], never by
    /// panicking or erroring.
    async fn send(&self, request: &NotificationRequest) -> AttemptOutcome;

    /// Record that this server was used for a successful send
    fn log_usage(&self);
}

/// Source of candidate servers
pub trait ServerRegistry: Send + Sync {
    /// Pick a server not contained in `excluded`, or `None` if nothing is
    /// available.
    fn pick_server(&self, excluded: &ExclusionSet) -> Option<Arc<dyn OutboundServer>>;
}

/// Site-wide settings
pub trait SiteConfig: Send + Sync {
    /// Display name used for the sending identity
    fn site_name(&self) -> String;
}

/// Context of the request that triggered the notification
pub trait RequestContext: Send + Sync {
    /// Host the request was made against, if known
    fn host(&self) -> Option<String>;
}

/// Fixed site name and host, for processes without a live request
#[derive(Debug, Clone, Default)]
pub struct StaticSite {
    pub name: String,
    pub host: Option<String>,
}

impl StaticSite {
    #[must_use]
    pub fn new(name: impl Into<String>, host: Option<String>) -> Self {
        Self {
            name: name.into(),
            host,
        }
    }
}

impl SiteConfig for StaticSite {
    fn site_name(&self) -> String {
        self.name.clone()
    }
}

impl RequestContext for StaticSite {
    fn host(&self) -> Option<String> {
        self.host.clone()
    }
}
