//! Deterministic teardown: nothing fires after unmount.

use std::sync::Arc;
use std::time::Duration;

use pairlink_core::config::PairlinkConfig;
use pairlink_core::endpoint::Environment;
use pairlink_core::supervisor::ConnectionState;
use pairlink_core::transport::{ScriptedBehavior, ScriptedConnector};
use pairlink_core::{ConsumerFacade, MatchFallback};
use pairlink_sim::MatchSimulationEngine;

use crate::init_tracing;

fn broker(connector: ScriptedConnector) -> (ConsumerFacade, Arc<MatchSimulationEngine>) {
    let config = PairlinkConfig::for_testing();
    let engine = Arc::new(MatchSimulationEngine::new(config.simulation.clone()));
    let facade = ConsumerFacade::new(
        config,
        Environment::loopback(),
        Arc::new(connector),
        Arc::clone(&engine) as Arc<dyn MatchFallback>,
    );
    (facade, engine)
}

#[tokio::test]
async fn teardown_while_connecting_cancels_the_attempt() {
    init_tracing();
    let (facade, engine) = broker(ScriptedConnector::new(ScriptedBehavior::Hang));
    let mut state = facade.connection_state();

    facade.connect();
    state
        .wait_for(|s| *s == ConnectionState::Connecting)
        .await
        .unwrap();

    facade.teardown().await;
    assert_eq!(*state.borrow_and_update(), ConnectionState::Closed);

    // Give any stray timer ample room to fire; the state must not move
    // and the fallback must never start.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!state.has_changed().unwrap_or(true));
    assert!(!engine.is_active());
    assert!(!facade.is_using_mock_mode());
}

#[tokio::test]
async fn teardown_in_degraded_mode_stops_the_simulation() {
    init_tracing();
    let (facade, engine) = broker(ScriptedConnector::unreachable());
    let mut state = facade.connection_state();
    let mut sessions = engine.subscribe();

    facade.connect();
    state
        .wait_for(|s| *s == ConnectionState::Degraded)
        .await
        .unwrap();
    sessions.wait_for(|s| s.is_some()).await.unwrap();

    facade.teardown().await;
    assert_eq!(*state.borrow_and_update(), ConnectionState::Closed);
    assert!(!engine.is_active());
    sessions.wait_for(|s| s.is_none()).await.unwrap();

    // No simulated phase transition fires after teardown.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sessions.borrow().is_none());
}

#[tokio::test]
async fn teardown_while_connected_closes_the_transport() {
    init_tracing();
    let (facade, _) = broker(ScriptedConnector::reachable());
    let mut state = facade.connection_state();

    facade.connect();
    state
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();
    let handle = facade.transport_handle().unwrap();
    assert!(handle.is_open());

    facade.teardown().await;
    assert!(!handle.is_open());
    assert!(facade.transport_handle().is_none());
    assert!(handle.send("late message").is_err());
}
