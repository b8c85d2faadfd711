//! Coordinator driving the static registry
#![allow(clippy::unwrap_used)]

mod support;

use std::sync::Arc;

use courier_delivery::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, SelectionPolicy, ServerId,
    StaticServerRegistry, UsageTracker,
};
use support::{RecordingLocal, ScriptedServer, coordinator, request};

fn registry(
    policy: SelectionPolicy,
    servers: &[&Arc<ScriptedServer>],
    breaker: CircuitBreakerConfig,
) -> Arc<StaticServerRegistry> {
    let mut registry = StaticServerRegistry::new(
        policy,
        Arc::new(UsageTracker::new()),
        Arc::new(CircuitBreaker::new(breaker)),
    );
    for server in servers {
        registry
            .register(Arc::<ScriptedServer>::clone(server), 1, None)
            .unwrap();
    }
    Arc::new(registry)
}

#[tokio::test]
async fn test_round_robin_rotation_reaches_working_server() {
    let a = ScriptedServer::failing("a");
    let b = ScriptedServer::failing("b");
    let c = ScriptedServer::succeeding("c");
    let registry = registry(
        SelectionPolicy::RoundRobin,
        &[&a, &b, &c],
        CircuitBreakerConfig::default(),
    );
    let local = RecordingLocal::new(true);

    let sent = coordinator(registry, Arc::clone(&local), None)
        .send(request())
        .await;

    assert_eq!(sent, Ok(true));
    assert_eq!((a.attempts(), b.attempts(), c.attempts()), (1, 1, 1));
    assert!(local.requests().is_empty());
}

#[tokio::test]
async fn test_weighted_never_retries_a_failed_server() {
    let a = ScriptedServer::failing("a");
    let b = ScriptedServer::failing("b");
    let registry = registry(
        SelectionPolicy::Weighted,
        &[&a, &b],
        CircuitBreakerConfig::default(),
    );
    let local = RecordingLocal::new(true);

    let sent = coordinator(registry, Arc::clone(&local), Some("example.com"))
        .send(request())
        .await;

    assert_eq!(sent, Ok(true));
    assert_eq!((a.attempts(), b.attempts()), (1, 1));
    assert_eq!(local.requests().len(), 1);
}

#[tokio::test]
async fn test_open_circuit_leaves_rotation() {
    let a = ScriptedServer::failing("a");
    let b = ScriptedServer::succeeding("b");
    let registry = registry(
        SelectionPolicy::RoundRobin,
        &[&a, &b],
        CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        },
    );

    registry.circuit_breaker().record_failure(&ServerId::from("a"));
    assert_eq!(
        registry.circuit_breaker().stats(&ServerId::from("a")).state,
        CircuitState::Open
    );

    let sent = coordinator(registry, RecordingLocal::new(false), None)
        .send(request())
        .await;

    assert_eq!(sent, Ok(true));
    assert_eq!(a.attempts(), 0);
    assert_eq!(b.attempts(), 1);
}
