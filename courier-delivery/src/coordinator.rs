//! Bounded failover for transactional notifications
//!
//! [`DeliveryAttemptCoordinator::send`] walks a short, strictly sequential
//! chain:
//!
//! ```text
//! pick ──> attempt ──Sent──> done (true)
//!  ^          │
//!  │       Failed
//!  │          │
//!  └─ exclude ┘   (at most MAX_ROTATING_ATTEMPTS times)
//!
//! no candidate / cap reached ──> local transport ──> true | false
//! ```
//!
//! Transport failures are expected and never surface as errors; only a
//! malformed request does.

use std::{sync::Arc, time::Instant};

use courier_common::{
    audit,
    host::{DEFAULT_HOST, NOREPLY_LOCAL_PART},
    Host, internal,
};
use lettre::{Address, message::Mailbox};
use tracing::{debug, error, info, warn};

use crate::{
    error::NotificationError,
    notification::NotificationRequest,
    server::{OutboundServer, RequestContext, ServerRegistry, SiteConfig},
    transport::LocalTransport,
    types::{AttemptOutcome, ExclusionSet, TransportKind},
};

/// Maximum number of attempts made against registry servers per `send`.
pub const MAX_ROTATING_ATTEMPTS: usize = 3;

/// Transport used once rotation has given up.
pub const FALLBACK_TRANSPORT: TransportKind = TransportKind::Sendmail;

/// Sends notifications through rotating outbound servers, then a local
/// fallback transport
///
/// Holds only references to its collaborators; every call to
/// [`send`](Self::send) starts a fresh attempt sequence.
#[derive(Clone)]
pub struct DeliveryAttemptCoordinator {
    registry: Arc<dyn ServerRegistry>,
    local: Arc<dyn LocalTransport>,
    site: Arc<dyn SiteConfig>,
    context: Arc<dyn RequestContext>,
}

impl DeliveryAttemptCoordinator {
    #[must_use]
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        local: Arc<dyn LocalTransport>,
        site: Arc<dyn SiteConfig>,
        context: Arc<dyn RequestContext>,
    ) -> Self {
        Self {
            registry,
            local,
            site,
            context,
        }
    }

    /// Deliver `request`, returning whether any attempt succeeded
    ///
    /// # Errors
    ///
    /// Only when the request itself is malformed (see
    /// [`NotificationRequest::validate`]); no attempt is made in that case.
    #[tracing::instrument(level = "debug", skip_all, fields(recipient = tracing::field::Empty))]
    pub async fn send(&self, mut request: NotificationRequest) -> Result<bool, NotificationError> {
        request.validate()?;

        let recipient = request.recipient()?.email.to_string();
        let redacted = audit::redact_email(&recipient, audit::config().redact_recipients);
        tracing::Span::current().record("recipient", redacted.as_str());

        let started = Instant::now();
        let site_name = self.site.site_name();
        let mut excluded = ExclusionSet::new();
        let mut attempts = 0;

        let mut candidate = self.registry.pick_server(&excluded);
        if candidate.is_none() {
            info!("No outbound server available, skipping rotation");
        }

        while let Some(server) = candidate {
            attempts += 1;
            request.from = Some(sender(&site_name, server.from_address().clone()));

            if Self::attempt(&*server, &request, &recipient, attempts, started).await {
                return Ok(true);
            }

            excluded.insert(server.id().clone());
            if attempts >= MAX_ROTATING_ATTEMPTS {
                debug!(attempts, "Rotation limit reached");
                break;
            }

            candidate = self.registry.pick_server(&excluded);
            if candidate.is_none() {
                debug!(attempts, "Registry has no further candidates");
            }
        }

        Ok(self
            .fallback(request, &recipient, &site_name, attempts, started)
            .await)
    }

    async fn attempt(
        server: &dyn OutboundServer,
        request: &NotificationRequest,
        recipient: &str,
        attempt: usize,
        started: Instant,
    ) -> bool {
        audit::log_attempt(recipient, server.id().as_str(), attempt);

        match server.send(request).await {
            AttemptOutcome::Sent(message_id) => {
                server.log_usage();
                info!(
                    server = %server.id(),
                    message_id = %message_id,
                    attempt,
                    "Notification sent"
                );
                audit::log_sent(
                    Some(message_id.as_str()),
                    recipient,
                    server.id().as_str(),
                    attempt,
                    started.elapsed().as_millis(),
                );
                true
            }
            AttemptOutcome::Failed(err) => {
                warn!(
                    server = %server.id(),
                    attempt,
                    temporary = err.is_temporary(),
                    error = %err,
                    "Delivery attempt failed, rotating"
                );
                false
            }
        }
    }

    async fn fallback(
        &self,
        mut request: NotificationRequest,
        recipient: &str,
        site_name: &str,
        rotating_attempts: usize,
        started: Instant,
    ) -> bool {
        let host = Host::from_context(self.context.host().as_deref());
        let address = match Address::new(NOREPLY_LOCAL_PART, host.as_str())
            .or_else(|_| Address::new(NOREPLY_LOCAL_PART, DEFAULT_HOST))
        {
            Ok(address) => address,
            Err(e) => {
                error!(host = %host, error = %e, "Could not build fallback sender address");
                audit::log_exhausted(recipient, rotating_attempts);
                return false;
            }
        };

        audit::log_fallback(recipient, address.as_ref(), rotating_attempts);
        internal!(
            level = DEBUG,
            transport = %FALLBACK_TRANSPORT,
            rotating_attempts,
            "Falling back to local transport"
        );

        request.from = Some(sender(site_name, address));
        request.transport = Some(FALLBACK_TRANSPORT);

        let total = rotating_attempts + 1;
        if self.local.send(&request).await {
            audit::log_sent(
                None,
                recipient,
                FALLBACK_TRANSPORT.to_string().as_str(),
                total,
                started.elapsed().as_millis(),
            );
            true
        } else {
            audit::log_exhausted(recipient, total);
            false
        }
    }
}

fn sender(site_name: &str, address: Address) -> Mailbox {
    let name = Some(site_name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    Mailbox::new(name, address)
}
