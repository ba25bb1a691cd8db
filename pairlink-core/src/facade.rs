//! Single access point for connection state and the active transport.
//!
//! The rest of the application reads the broker exclusively through
//! `ConsumerFacade`: the nullable transport handle, the simulation
//! engine reference, and the mock-mode flag. The facade constructs the
//! connection supervisor lazily and exactly once, guarded against the
//! duplicate invocations a remounting UI layer produces.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::PairlinkConfig;
use crate::endpoint::Environment;
use crate::simulation::MatchFallback;
use crate::supervisor::{ConnectionState, ConnectionSupervisor};
use crate::transport::{Connector, TransportHandle};

/// State shared between the supervisor and facade consumers.
///
/// Written exclusively by the supervisor; read-only everywhere else.
#[derive(Debug, Clone, Default)]
pub struct FacadeState {
    handle: Arc<parking_lot::RwLock<Option<Arc<TransportHandle>>>>,
    mock_mode: Arc<AtomicBool>,
}

impl FacadeState {
    /// The active transport handle, if a live session is open.
    pub fn transport_handle(&self) -> Option<Arc<TransportHandle>> {
        self.handle.read().clone()
    }

    /// Publishes (or clears) the active transport handle.
    pub fn set_transport_handle(&self, handle: Option<Arc<TransportHandle>>) {
        *self.handle.write() = handle;
    }

    /// Whether simulated matchmaking is substituting for a live server.
    pub fn is_using_mock_mode(&self) -> bool {
        self.mock_mode.load(Ordering::SeqCst)
    }

    pub(crate) fn set_mock_mode(&self, enabled: bool) {
        self.mock_mode.store(enabled, Ordering::SeqCst);
    }
}

/// The application-facing entry point to the connection broker.
pub struct ConsumerFacade {
    config: PairlinkConfig,
    environment: Environment,
    connector: Arc<dyn Connector>,
    simulation: Arc<dyn MatchFallback>,
    state: FacadeState,
    supervisor: parking_lot::Mutex<Option<Arc<tokio::sync::Mutex<ConnectionSupervisor>>>>,
    connection_state: parking_lot::Mutex<Option<watch::Receiver<ConnectionState>>>,
    connect_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ConsumerFacade {
    /// Builds a facade over explicitly injected collaborators.
    ///
    /// The supervisor itself is not constructed until first use.
    pub fn new(
        config: PairlinkConfig,
        environment: Environment,
        connector: Arc<dyn Connector>,
        simulation: Arc<dyn MatchFallback>,
    ) -> Self {
        Self {
            config,
            environment,
            connector,
            simulation,
            state: FacadeState::default(),
            supervisor: parking_lot::Mutex::new(None),
            connection_state: parking_lot::Mutex::new(None),
            connect_task: parking_lot::Mutex::new(None),
        }
    }

    /// The connection supervisor, constructed lazily on first access.
    ///
    /// Construction happens fully under the guard, so a consumer never
    /// observes a half-constructed supervisor and repeated calls from
    /// remount effects share the single instance.
    pub fn supervisor(&self) -> Arc<tokio::sync::Mutex<ConnectionSupervisor>> {
        let mut slot = self.supervisor.lock();
        if let Some(existing) = slot.as_ref() {
            return Arc::clone(existing);
        }

        let supervisor = ConnectionSupervisor::new(
            &self.config,
            &self.environment,
            Arc::clone(&self.connector),
            Arc::clone(&self.simulation),
            self.state.clone(),
        );
        *self.connection_state.lock() = Some(supervisor.state());

        let supervisor = Arc::new(tokio::sync::Mutex::new(supervisor));
        *slot = Some(Arc::clone(&supervisor));
        supervisor
    }

    /// Kicks off the endpoint cascade in the background.
    ///
    /// Safe to call repeatedly: while an earlier connect task is still
    /// running the call is a no-op, and the supervisor itself rejects a
    /// second cascade.
    pub fn connect(&self) {
        let mut task = self.connect_task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            tracing::debug!("connect already in progress; ignoring");
            return;
        }

        let supervisor = self.supervisor();
        *task = Some(tokio::spawn(async move {
            if let Err(error) = supervisor.lock().await.initialize().await {
                tracing::debug!(%error, "connect attempt rejected");
            }
        }));
    }

    /// Tears down the broker: cancels any in-flight connect attempt and
    /// shuts the supervisor down. Idempotent.
    pub async fn teardown(&self) {
        if let Some(task) = self.connect_task.lock().take() {
            task.abort();
        }

        let supervisor = { self.supervisor.lock().clone() };
        if let Some(supervisor) = supervisor {
            supervisor.lock().await.shutdown();
        }
    }

    /// Subscribes to connection state transitions.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        // Ensure the supervisor (and with it the state channel) exists.
        let _ = self.supervisor();
        self.connection_state
            .lock()
            .as_ref()
            .expect("state receiver installed during supervisor construction")
            .clone()
    }

    /// The active transport handle; `None` while not connected.
    pub fn transport_handle(&self) -> Option<Arc<TransportHandle>> {
        self.state.transport_handle()
    }

    /// Publishes a transport handle into the facade.
    ///
    /// Part of the facade contract; the supervisor is the only writer
    /// in practice.
    pub fn set_transport_handle(&self, handle: Option<Arc<TransportHandle>>) {
        self.state.set_transport_handle(handle);
    }

    /// Reference to the injected simulation engine.
    pub fn simulation_engine(&self) -> Arc<dyn MatchFallback> {
        Arc::clone(&self.simulation)
    }

    /// Whether simulated matchmaking is substituting for a live server.
    pub fn is_using_mock_mode(&self) -> bool {
        self.state.is_using_mock_mode()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;
    use crate::transport::ScriptedConnector;

    #[derive(Default)]
    struct NullFallback {
        starts: AtomicU32,
    }

    impl MatchFallback for NullFallback {
        fn start_bot_simulation(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn stop(&self) {}

        fn is_active(&self) -> bool {
            false
        }
    }

    fn facade(connector: ScriptedConnector) -> (ConsumerFacade, Arc<NullFallback>) {
        let fallback = Arc::new(NullFallback::default());
        let facade = ConsumerFacade::new(
            PairlinkConfig::for_testing(),
            Environment::loopback(),
            Arc::new(connector),
            Arc::clone(&fallback) as Arc<dyn MatchFallback>,
        );
        (facade, fallback)
    }

    #[tokio::test]
    async fn test_supervisor_constructed_once() {
        let (facade, _) = facade(ScriptedConnector::reachable());

        let first = facade.supervisor();
        let second = facade.supervisor();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_connect_publishes_handle_and_state() {
        let (facade, fallback) = facade(ScriptedConnector::reachable());
        let mut state = facade.connection_state();

        assert!(facade.transport_handle().is_none());
        facade.connect();

        state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();
        assert!(facade.transport_handle().is_some());
        assert!(!facade.is_using_mock_mode());
        assert_eq!(fallback.starts.load(Ordering::SeqCst), 0);

        facade.teardown().await;
        assert!(facade.transport_handle().is_none());
    }

    #[tokio::test]
    async fn test_repeated_connect_runs_single_cascade() {
        let connector = Arc::new(ScriptedConnector::reachable());
        let fallback = Arc::new(NullFallback::default());
        let facade = ConsumerFacade::new(
            PairlinkConfig::for_testing(),
            Environment::loopback(),
            Arc::clone(&connector) as Arc<dyn Connector>,
            fallback as Arc<dyn MatchFallback>,
        );
        let mut state = facade.connection_state();

        // Remount effects fire connect several times in a row.
        facade.connect();
        facade.connect();
        facade.connect();

        state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(connector.attempts().len(), 1);

        facade.teardown().await;
    }

    #[tokio::test]
    async fn test_degraded_flow_sets_mock_mode() {
        let (facade, fallback) = facade(ScriptedConnector::unreachable());
        let mut state = facade.connection_state();

        facade.connect();
        state
            .wait_for(|s| *s == ConnectionState::Degraded)
            .await
            .unwrap();

        assert!(facade.is_using_mock_mode());
        assert!(facade.transport_handle().is_none());
        assert_eq!(fallback.starts.load(Ordering::SeqCst), 1);

        facade.teardown().await;
    }

    #[tokio::test]
    async fn test_teardown_without_connect_is_harmless() {
        let (facade, _) = facade(ScriptedConnector::reachable());
        facade.teardown().await;
        facade.teardown().await;
    }
}
