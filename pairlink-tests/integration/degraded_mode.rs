//! Degraded-mode behavior: simulated matchmaking substitutes for the
//! live backend and consumers proceed unaware.

use std::sync::Arc;
use std::time::Duration;

use pairlink_core::config::PairlinkConfig;
use pairlink_core::endpoint::Environment;
use pairlink_core::supervisor::ConnectionState;
use pairlink_core::transport::ScriptedConnector;
use pairlink_core::{ConsumerFacade, MatchFallback};
use pairlink_sim::{MatchSimulationEngine, SimulationPhase};

use crate::init_tracing;

#[tokio::test]
async fn exhausted_cascade_substitutes_simulated_matchmaking() {
    // Scenario B: localhost, both candidates unreachable.
    init_tracing();
    let config = PairlinkConfig::for_testing();
    let max_time_to_match = config.simulation.max_time_to_match();
    let engine = Arc::new(MatchSimulationEngine::new(config.simulation.clone()));
    let facade = ConsumerFacade::new(
        config,
        Environment::loopback(),
        Arc::new(ScriptedConnector::unreachable()),
        Arc::clone(&engine) as Arc<dyn MatchFallback>,
    );

    let mut state = facade.connection_state();
    let mut sessions = engine.subscribe();

    facade.connect();
    state
        .wait_for(|s| *s == ConnectionState::Degraded)
        .await
        .unwrap();

    assert!(facade.is_using_mock_mode());
    assert!(facade.transport_handle().is_none());
    assert!(engine.is_active());

    // A simulated session reaches Matched within its configured
    // maximum delay, partner assigned from the pool.
    tokio::time::timeout(
        max_time_to_match + Duration::from_millis(200),
        sessions.wait_for(|s| {
            s.as_ref()
                .is_some_and(|session| session.phase == SimulationPhase::Matched)
        }),
    )
    .await
    .expect("no simulated match within the configured maximum")
    .unwrap();

    let snapshot = sessions.borrow().clone().unwrap();
    let partner = snapshot.partner.expect("matched session has a partner");
    assert!(!partner.display_name.is_empty());

    facade.teardown().await;
}

#[tokio::test]
async fn repeated_fallback_start_keeps_single_session() {
    init_tracing();
    let config = PairlinkConfig::for_testing();
    let engine = Arc::new(MatchSimulationEngine::new(config.simulation.clone()));
    let mut sessions = engine.subscribe();

    engine.start_bot_simulation();
    sessions.wait_for(|s| s.is_some()).await.unwrap();
    let first_id = sessions.borrow().as_ref().unwrap().id;

    // The supervisor (or anyone else) starting again must not spawn a
    // second session.
    engine.start_bot_simulation();
    engine.start_bot_simulation();
    assert!(engine.is_active());
    assert_eq!(sessions.borrow().as_ref().map(|s| s.id), Some(first_id));

    engine.stop();
    assert!(!engine.is_active());
}
