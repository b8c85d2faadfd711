//! Registry of configured outbound servers

use std::{
    fmt::Display,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    circuit_breaker::CircuitBreaker,
    error::ServerConfigError,
    server::{OutboundServer, ServerRegistry},
    transport::{SmtpServer, SmtpServerConfig},
    types::{ExclusionSet, ServerId},
    usage::UsageTracker,
};

/// How the registry chooses among eligible servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Cycle through the servers in configured order
    #[default]
    RoundRobin,
    /// Random choice proportional to each server's weight
    Weighted,
}

impl Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::RoundRobin => "round-robin",
            Self::Weighted => "weighted",
        })
    }
}

/// A server together with its selection parameters
#[derive(Debug, Clone)]
pub struct RegisteredServer {
    pub server: Arc<dyn OutboundServer>,
    pub weight: u32,
    pub hourly_quota: Option<u32>,
}

/// [`ServerRegistry`] over a fixed list of servers
///
/// A server is eligible when it is not excluded, still has capacity under
/// its hourly quota, and its circuit breaker allows delivery.
#[derive(Debug)]
pub struct StaticServerRegistry {
    policy: SelectionPolicy,
    servers: Vec<RegisteredServer>,
    usage: Arc<UsageTracker>,
    breaker: Arc<CircuitBreaker>,
    cursor: AtomicUsize,
}

impl StaticServerRegistry {
    #[must_use]
    pub fn new(policy: SelectionPolicy, usage: Arc<UsageTracker>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            policy,
            servers: Vec::new(),
            usage,
            breaker,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Build SMTP servers for every definition, in order
    ///
    /// # Errors
    ///
    /// If any definition is invalid or two share an id.
    pub fn from_configs(
        configs: &[SmtpServerConfig],
        policy: SelectionPolicy,
        usage: Arc<UsageTracker>,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ServerConfigError> {
        let mut registry = Self::new(policy, Arc::clone(&usage), Arc::clone(&breaker));

        for config in configs {
            let server = SmtpServer::from_config(config, Arc::clone(&usage), Arc::clone(&breaker))?;
            let weight = server.weight();
            let hourly_quota = server.hourly_quota();
            registry.register(Arc::new(server), weight, hourly_quota)?;
        }

        Ok(registry)
    }

    /// Add a server to the end of the rotation
    ///
    /// # Errors
    ///
    /// If a server with the same id is already registered, or `weight` is zero.
    pub fn register(
        &mut self,
        server: Arc<dyn OutboundServer>,
        weight: u32,
        hourly_quota: Option<u32>,
    ) -> Result<(), ServerConfigError> {
        if self.get(server.id()).is_some() {
            return Err(ServerConfigError::DuplicateId(server.id().to_string()));
        }

        if weight == 0 {
            return Err(ServerConfigError::Invalid {
                server: server.id().to_string(),
                field: "weight",
                reason: "must be at least 1".to_string(),
            });
        }

        self.servers.push(RegisteredServer {
            server,
            weight,
            hourly_quota,
        });
        Ok(())
    }

    #[must_use]
    pub const fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    #[must_use]
    pub fn servers(&self) -> &[RegisteredServer] {
        &self.servers
    }

    #[must_use]
    pub fn get(&self, id: &ServerId) -> Option<&RegisteredServer> {
        self.servers.iter().find(|entry| entry.server.id() == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    #[must_use]
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    #[must_use]
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Not excluded and still under its hourly quota
    fn has_room(&self, entry: &RegisteredServer, excluded: &ExclusionSet) -> bool {
        let id = entry.server.id();

        if excluded.contains(id) {
            return false;
        }

        if !self.usage.has_capacity(id, entry.hourly_quota) {
            trace!(server = %id, quota = ?entry.hourly_quota, "Server over hourly quota");
            return false;
        }

        true
    }

    /// An expired open circuit moves to half-open here, so only call this
    /// for the entry about to be handed out
    fn breaker_allows(&self, entry: &RegisteredServer) -> bool {
        let id = entry.server.id();
        let allowed = self.breaker.should_allow_delivery(id);
        if !allowed {
            trace!(server = %id, "Server circuit open");
        }
        allowed
    }

    fn pick_round_robin(&self, excluded: &ExclusionSet) -> Option<&RegisteredServer> {
        let count = self.servers.len();
        let start = self.cursor.load(Ordering::Relaxed);

        (0..count)
            .map(|offset| (start + offset) % count)
            .find(|&index| {
                let entry = &self.servers[index];
                self.has_room(entry, excluded) && self.breaker_allows(entry)
            })
            .map(|index| {
                self.cursor.store((index + 1) % count, Ordering::Relaxed);
                &self.servers[index]
            })
    }

    fn pick_weighted(&self, excluded: &ExclusionSet) -> Option<&RegisteredServer> {
        let mut candidates: Vec<&RegisteredServer> = self
            .servers
            .iter()
            .filter(|entry| self.has_room(entry, excluded))
            .collect();
        let mut rng = rand::rng();

        // Weights are at least 1, so the total is non-zero while candidates remain
        while !candidates.is_empty() {
            let total: u64 = candidates.iter().map(|entry| u64::from(entry.weight)).sum();
            let mut roll = rng.random_range(0..total);

            let index = candidates
                .iter()
                .position(|entry| {
                    let weight = u64::from(entry.weight);
                    if roll < weight {
                        true
                    } else {
                        roll -= weight;
                        false
                    }
                })
                .unwrap_or(candidates.len() - 1);

            let entry = candidates.swap_remove(index);
            if self.breaker_allows(entry) {
                return Some(entry);
            }
        }

        None
    }
}

impl ServerRegistry for StaticServerRegistry {
    fn pick_server(&self, excluded: &ExclusionSet) -> Option<Arc<dyn OutboundServer>> {
        if self.servers.is_empty() {
            return None;
        }

        let picked = match self.policy {
            SelectionPolicy::RoundRobin => self.pick_round_robin(excluded),
            SelectionPolicy::Weighted => self.pick_weighted(excluded),
        };

        match picked {
            Some(entry) => {
                trace!(server = %entry.server.id(), policy = %self.policy, "Picked server");
                Some(Arc::clone(&entry.server))
            }
            None => {
                trace!(excluded = excluded.len(), "No eligible server");
                None
            }
        }
    }
}
