//! The facade contract: lazy single construction, nullable handle,
//! simulation reference, and the mock-mode flag.

use std::sync::Arc;
use std::time::Duration;

use pairlink_core::config::PairlinkConfig;
use pairlink_core::endpoint::Environment;
use pairlink_core::supervisor::ConnectionState;
use pairlink_core::transport::ScriptedConnector;
use pairlink_core::{ConsumerFacade, MatchFallback};
use pairlink_sim::MatchSimulationEngine;

use crate::init_tracing;

#[tokio::test]
async fn facade_exposes_injected_simulation_engine() {
    init_tracing();
    let config = PairlinkConfig::for_testing();
    let engine = Arc::new(MatchSimulationEngine::new(config.simulation.clone()));
    let facade = ConsumerFacade::new(
        config,
        Environment::loopback(),
        Arc::new(ScriptedConnector::unreachable()),
        Arc::clone(&engine) as Arc<dyn MatchFallback>,
    );

    // The reference handed back is the injected engine, not a copy.
    let reference = facade.simulation_engine();
    reference.start_bot_simulation();
    assert!(engine.is_active());
    engine.stop();
}

#[tokio::test]
async fn remount_storm_constructs_one_supervisor_and_one_cascade() {
    init_tracing();
    let config = PairlinkConfig::for_testing();
    let engine = Arc::new(MatchSimulationEngine::new(config.simulation.clone()));
    let connector = Arc::new(ScriptedConnector::reachable());
    let facade = ConsumerFacade::new(
        config,
        Environment::loopback(),
        Arc::clone(&connector) as Arc<dyn pairlink_core::Connector>,
        engine as Arc<dyn MatchFallback>,
    );

    let first = facade.supervisor();
    let second = facade.supervisor();
    assert!(Arc::ptr_eq(&first, &second));

    let mut state = facade.connection_state();
    for _ in 0..5 {
        facade.connect();
    }

    state
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(connector.attempts().len(), 1);

    facade.teardown().await;
}

#[tokio::test]
async fn handle_is_nullable_until_connected() {
    init_tracing();
    let config = PairlinkConfig::for_testing();
    let engine = Arc::new(MatchSimulationEngine::new(config.simulation.clone()));
    let facade = ConsumerFacade::new(
        config,
        Environment::loopback(),
        Arc::new(ScriptedConnector::reachable()),
        engine as Arc<dyn MatchFallback>,
    );

    assert!(facade.transport_handle().is_none());
    assert!(!facade.is_using_mock_mode());

    let mut state = facade.connection_state();
    facade.connect();
    state
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();

    let handle = facade.transport_handle().expect("handle published");
    assert_eq!(handle.endpoint().port, 8000);

    facade.teardown().await;
    assert!(facade.transport_handle().is_none());
}
