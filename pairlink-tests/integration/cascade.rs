//! Endpoint-cascade outcomes with the real simulation engine attached.

use std::sync::Arc;

use pairlink_core::config::PairlinkConfig;
use pairlink_core::endpoint::Environment;
use pairlink_core::supervisor::ConnectionState;
use pairlink_core::transport::{ScriptedBehavior, ScriptedConnector};
use pairlink_core::{ConsumerFacade, MatchFallback};
use pairlink_sim::MatchSimulationEngine;

use crate::init_tracing;

fn broker(
    hostname: &str,
    connector: ScriptedConnector,
) -> (ConsumerFacade, Arc<MatchSimulationEngine>, Arc<ScriptedConnector>) {
    let config = PairlinkConfig::for_testing();
    let engine = Arc::new(MatchSimulationEngine::new(config.simulation.clone()));
    let connector = Arc::new(connector);
    let facade = ConsumerFacade::new(
        config,
        Environment::new(hostname, false),
        Arc::clone(&connector) as Arc<dyn pairlink_core::Connector>,
        Arc::clone(&engine) as Arc<dyn MatchFallback>,
    );
    (facade, engine, connector)
}

#[tokio::test]
async fn reachable_primary_connects_and_leaves_simulation_idle() {
    init_tracing();
    let (facade, engine, connector) = broker("localhost", ScriptedConnector::reachable());
    let mut state = facade.connection_state();

    facade.connect();
    state
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();

    assert!(!facade.is_using_mock_mode());
    assert!(facade.transport_handle().is_some());
    assert!(!engine.is_active());
    assert_eq!(connector.attempts().len(), 1);

    facade.teardown().await;
}

#[tokio::test]
async fn loopback_secondary_rescues_failed_primary() {
    // Scenario A: localhost, :8000 unreachable, :8001 reachable.
    init_tracing();
    let connector = ScriptedConnector::unreachable().with_port(8001, ScriptedBehavior::Reachable);
    let (facade, engine, connector) = broker("localhost", connector);
    let mut state = facade.connection_state();

    facade.connect();
    state
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();

    assert!(!facade.is_using_mock_mode());
    assert!(!engine.is_active());

    let attempted: Vec<u16> = connector.attempts().iter().map(|e| e.port).collect();
    assert_eq!(attempted, vec![8000, 8001]);

    facade.teardown().await;
}

#[tokio::test]
async fn direct_host_resolves_one_candidate_and_degrades_on_failure() {
    // Scenario C: arbitrary hostname gets exactly one candidate.
    init_tracing();
    let (facade, _, connector) = broker("example.com", ScriptedConnector::unreachable());
    let mut state = facade.connection_state();

    facade.connect();
    state
        .wait_for(|s| *s == ConnectionState::Degraded)
        .await
        .unwrap();

    let attempted: Vec<(String, u16)> = connector
        .attempts()
        .iter()
        .map(|e| (e.host.clone(), e.port))
        .collect();
    assert_eq!(attempted, vec![("example.com".to_string(), 8000)]);

    facade.teardown().await;
}
