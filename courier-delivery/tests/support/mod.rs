//! Scripted collaborators for exercising the coordinator
//!
//! - [`ScriptedServer`]: an outbound server returning queued outcomes
//! - [`RecordingRegistry`]: hands out servers in order, recording every
//!   exclusion set it is asked about
//! - [`RecordingLocal`]: a local transport with a fixed answer
#![allow(dead_code)] // Test utility module - not all helpers used in every test

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use courier_delivery::{
    AttemptOutcome, DeliveryAttemptCoordinator, ExclusionSet, LocalTransport, MessageId,
    NotificationRequest, OutboundServer, ServerCapabilities, ServerId, ServerRegistry, StaticSite,
    TransportError,
};
use lettre::Address;

/// Outbound server that answers with queued outcomes, failing once the queue
/// runs dry
#[derive(Debug)]
pub struct ScriptedServer {
    id: ServerId,
    from: Address,
    outcomes: Mutex<VecDeque<AttemptOutcome>>,
    sent: Mutex<Vec<NotificationRequest>>,
    usage: AtomicUsize,
}

impl ScriptedServer {
    pub fn new(id: &str) -> Self {
        Self {
            id: ServerId::from(id),
            from: format!("{id}@mail.example.com")
                .parse()
                .expect("valid test address"),
            outcomes: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            usage: AtomicUsize::new(0),
        }
    }

    /// Server whose every attempt fails
    pub fn failing(id: &str) -> Arc<Self> {
        Arc::new(Self::new(id))
    }

    /// Server whose first attempt succeeds
    pub fn succeeding(id: &str) -> Arc<Self> {
        let server = Self::new(id);
        server
            .outcomes
            .lock()
            .unwrap()
            .push_back(AttemptOutcome::Sent(MessageId::generate("mail.example.com")));
        Arc::new(server)
    }

    pub fn attempts(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<NotificationRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn usage(&self) -> usize {
        self.usage.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutboundServer for ScriptedServer {
    fn id(&self) -> &ServerId {
        &self.id
    }

    fn from_address(&self) -> &Address {
        &self.from
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities::default()
    }

    async fn send(&self, request: &NotificationRequest) -> AttemptOutcome {
        self.sent.lock().unwrap().push(request.clone());
        self.outcomes.lock().unwrap().pop_front().unwrap_or_else(|| {
            AttemptOutcome::Failed(TransportError::Connection(format!(
                "{} refused connection",
                self.id
            )))
        })
    }

    fn log_usage(&self) {
        self.usage.fetch_add(1, Ordering::SeqCst);
    }
}

/// What the registry was asked on one `pick_server` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickCall {
    /// Excluded ids, sorted
    pub excluded: Vec<String>,
    /// Most recently excluded id
    pub last: Option<String>,
}

/// Registry handing out the first non-excluded server in order
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    servers: Vec<Arc<ScriptedServer>>,
    calls: Mutex<Vec<PickCall>>,
}

impl RecordingRegistry {
    pub fn new(servers: Vec<Arc<ScriptedServer>>) -> Self {
        Self {
            servers,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<PickCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl ServerRegistry for RecordingRegistry {
    fn pick_server(&self, excluded: &ExclusionSet) -> Option<Arc<dyn OutboundServer>> {
        let mut ids: Vec<String> = excluded.iter().map(ToString::to_string).collect();
        ids.sort();
        self.calls.lock().unwrap().push(PickCall {
            excluded: ids,
            last: excluded.last().map(ToString::to_string),
        });

        self.servers
            .iter()
            .find(|server| !excluded.contains(server.id()))
            .map(|server| Arc::clone(server) as Arc<dyn OutboundServer>)
    }
}

/// Local transport that records requests and answers with a fixed result
#[derive(Debug)]
pub struct RecordingLocal {
    accept: bool,
    requests: Mutex<Vec<NotificationRequest>>,
}

impl RecordingLocal {
    pub fn new(accept: bool) -> Arc<Self> {
        Arc::new(Self {
            accept,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<NotificationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalTransport for RecordingLocal {
    async fn send(&self, request: &NotificationRequest) -> bool {
        self.requests.lock().unwrap().push(request.clone());
        self.accept
    }
}

pub const SITE_NAME: &str = "Example Site";

/// Wire a coordinator around the given collaborators
pub fn coordinator(
    registry: Arc<dyn ServerRegistry>,
    local: Arc<RecordingLocal>,
    host: Option<&str>,
) -> DeliveryAttemptCoordinator {
    let site = Arc::new(StaticSite::new(SITE_NAME, host.map(str::to_string)));
    DeliveryAttemptCoordinator::new(registry, local, Arc::clone(&site) as _, site)
}

pub fn request() -> NotificationRequest {
    NotificationRequest::new("jane@example.com", "Password reset", "Follow the link")
}
