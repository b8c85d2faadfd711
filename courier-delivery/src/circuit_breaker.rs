//! Per-server circuit breaker
//!
//! Keeps a server that keeps failing out of rotation for a while, so the
//! registry stops offering it to every notification only to watch it fail.
//!
//! ```text
//! ┌─────────┐  failure_threshold failures   ┌──────┐
//! │ Closed  │ ───── within the window ────> │ Open │
//! └─────────┘                               └──────┘
//!     ^                                        │ timeout_secs elapsed
//!     │ success_threshold                      v
//!     │ successes              ┌───────────────┐
//!     └────────────────────────│   Half-Open   │──── failure ───> Open
//!                              └───────────────┘
//! ```
//!
//! Only temporary transport failures are fed in; a permanent rejection says
//! more about the message than about the server.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::ServerId;

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of failures required to open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time window for counting failures (seconds)
    #[serde(default = "default_failure_window_secs")]
    pub failure_window_secs: u64,

    /// How long the circuit stays open before testing recovery (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of consecutive successes needed to close circuit from half-open
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Per-server overrides, keyed by server id
    #[serde(default)]
    pub server_overrides: ahash::AHashMap<String, ServerBreakerConfig>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_secs: default_failure_window_secs(),
            timeout_secs: default_timeout_secs(),
            success_threshold: default_success_threshold(),
            server_overrides: ahash::AHashMap::default(),
        }
    }
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_failure_window_secs() -> u64 {
    60
}

const fn default_timeout_secs() -> u64 {
    300
}

const fn default_success_threshold() -> u32 {
    1
}

/// Thresholds for one server
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServerBreakerConfig {
    pub failure_threshold: u32,
    pub failure_window_secs: u64,
    pub timeout_secs: u64,
    pub success_threshold: u32,
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Server in rotation
    Closed,
    /// Server out of rotation
    Open,
    /// Server offered again to test recovery
    HalfOpen,
}

#[derive(Debug)]
struct Breaker {
    state: CircuitState,
    failure_count: u32,
    first_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    consecutive_successes: u32,
    config: ServerBreakerConfig,
}

impl Breaker {
    const fn new(config: ServerBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            first_failure_at: None,
            opened_at: None,
            consecutive_successes: 0,
            config,
        }
    }

    fn window_expired(&self, now: Instant) -> bool {
        self.first_failure_at.is_none_or(|first| {
            now.duration_since(first) > Duration::from_secs(self.config.failure_window_secs)
        })
    }

    fn timeout_expired(&self, now: Instant) -> bool {
        self.opened_at.is_some_and(|opened| {
            now.duration_since(opened) >= Duration::from_secs(self.config.timeout_secs)
        })
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.consecutive_successes = 0;
    }

    fn record_failure(&mut self, server: &ServerId) -> bool {
        let now = Instant::now();
        match self.state {
            CircuitState::Closed => {
                if self.window_expired(now) {
                    self.failure_count = 0;
                    self.first_failure_at = Some(now);
                }
                self.failure_count += 1;

                if self.failure_count >= self.config.failure_threshold {
                    self.open(now);
                    tracing::warn!(
                        server = %server,
                        failure_count = self.failure_count,
                        timeout_secs = self.config.timeout_secs,
                        "Circuit breaker OPENED - server taken out of rotation"
                    );
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                self.open(now);
                tracing::warn!(server = %server, "Half-open delivery failed, reopening circuit");
                true
            }
            CircuitState::Open => false,
        }
    }

    fn record_success(&mut self, server: &ServerId) -> bool {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
                self.first_failure_at = None;
                false
            }
            CircuitState::HalfOpen => {
                self.consecutive_successes += 1;
                if self.consecutive_successes >= self.config.success_threshold {
                    *self = Self::new(self.config);
                    tracing::info!(server = %server, "Circuit breaker CLOSED - server back in rotation");
                    true
                } else {
                    false
                }
            }
            CircuitState::Open => {
                tracing::warn!(server = %server, "Unexpected success while circuit is open");
                false
            }
        }
    }

    fn allows(&mut self) -> bool {
        match self.state {
            CircuitState::Open if self.timeout_expired(Instant::now()) => {
                self.state = CircuitState::HalfOpen;
                self.consecutive_successes = 0;
                true
            }
            CircuitState::Open => false,
            CircuitState::Closed | CircuitState::HalfOpen => true,
        }
    }
}

/// Circuit breakers for every server, created on first use
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    breakers: DashMap<ServerId, Arc<Mutex<Breaker>>>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    fn breaker(&self, server: &ServerId) -> Arc<Mutex<Breaker>> {
        self.breakers
            .entry(server.clone())
            .or_insert_with(|| {
                let config = self
                    .config
                    .server_overrides
                    .get(server.as_str())
                    .copied()
                    .unwrap_or(ServerBreakerConfig {
                        failure_threshold: self.config.failure_threshold,
                        failure_window_secs: self.config.failure_window_secs,
                        timeout_secs: self.config.timeout_secs,
                        success_threshold: self.config.success_threshold,
                    });
                Arc::new(Mutex::new(Breaker::new(config)))
            })
            .clone()
    }

    /// Whether `server` may be offered for delivery
    ///
    /// An open circuit whose timeout has elapsed moves to half-open and
    /// allows the trial delivery.
    pub fn should_allow_delivery(&self, server: &ServerId) -> bool {
        self.breaker(server).lock().allows()
    }

    /// Returns `true` if the circuit closed as a result
    pub fn record_success(&self, server: &ServerId) -> bool {
        self.breaker(server).lock().record_success(server)
    }

    /// Returns `true` if the circuit opened as a result
    pub fn record_failure(&self, server: &ServerId) -> bool {
        self.breaker(server).lock().record_failure(server)
    }

    #[must_use]
    pub fn stats(&self, server: &ServerId) -> CircuitBreakerStats {
        let breaker = self.breaker(server);
        let breaker = breaker.lock();
        CircuitBreakerStats {
            state: breaker.state,
            failure_count: breaker.failure_count,
            consecutive_successes: breaker.consecutive_successes,
        }
    }
}

/// Snapshot of one server's breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub consecutive_successes: u32,
}
