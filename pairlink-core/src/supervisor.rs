//! Connection supervision for the matching-server session.
//!
//! Owns the lifecycle of exactly one live transport per application
//! mount: resolves candidate endpoints once, drives the ordered
//! endpoint-attempt cascade, and falls back into locally simulated
//! matchmaking when every candidate fails. Teardown is deterministic:
//! after `shutdown()` no timer, socket, or task mutates state again.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::PairlinkConfig;
use crate::endpoint::{Endpoint, Environment, resolve_candidates};
use crate::facade::FacadeState;
use crate::simulation::MatchFallback;
use crate::transport::{
    ConnectOptions, Connector, TransportError, TransportEvent, TransportHandle,
};

/// Observable state of the supervised connection.
///
/// Exactly one value is active at a time per supervisor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not yet initialized
    Idle,
    /// Endpoint cascade in progress
    Connecting,
    /// Live transport open
    Connected,
    /// No live server reachable; simulated matchmaking substituted
    Degraded,
    /// Mid-session drop; transport running its bounded reconnect loop.
    /// Also the final advertised state once the reconnect budget is
    /// exhausted - the published transport handle is cleared at that
    /// point, so consumers can distinguish the two.
    Reconnecting,
    /// Torn down; terminal
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Degraded => write!(f, "degraded"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Errors raised by the connection supervisor.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Endpoint {endpoint} unreachable")]
    EndpointUnreachable { endpoint: String },

    #[error("Initialization already in progress")]
    AlreadyInitializing,

    #[error("Endpoint cascade already ran for this supervisor")]
    AlreadyInitialized,

    #[error("Supervisor is closed")]
    SupervisorClosed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Supervises the single live transport session for one application
/// mount.
///
/// The candidate endpoint list is computed once at construction and the
/// full list is tried at most once. After exhaustion the supervisor
/// stays in `Degraded` until teardown; there is no automatic re-probe
/// of live endpoints.
pub struct ConnectionSupervisor {
    candidates: Vec<Endpoint>,
    options: ConnectOptions,
    connector: Arc<dyn Connector>,
    simulation: Arc<dyn MatchFallback>,
    shared: FacadeState,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    handle: Option<Arc<TransportHandle>>,
    listener: Option<JoinHandle<()>>,
    initializing: bool,
    cascade_ran: bool,
}

impl ConnectionSupervisor {
    /// Creates a supervisor for the given environment.
    ///
    /// Resolves the candidate list immediately; nothing connects until
    /// `initialize()` is called.
    pub fn new(
        config: &PairlinkConfig,
        environment: &Environment,
        connector: Arc<dyn Connector>,
        simulation: Arc<dyn MatchFallback>,
        shared: FacadeState,
    ) -> Self {
        let candidates = resolve_candidates(environment, &config.endpoints);
        let (state_tx, _) = watch::channel(ConnectionState::Idle);

        Self {
            candidates,
            options: ConnectOptions::from_config(&config.network),
            connector,
            simulation,
            shared,
            state_tx: Arc::new(state_tx),
            handle: None,
            listener: None,
            initializing: false,
            cascade_ran: false,
        }
    }

    /// Candidate endpoints in attempt order.
    pub fn candidates(&self) -> &[Endpoint] {
        &self.candidates
    }

    /// Subscribes to connection state transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Current connection state.
    pub fn current_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// The open transport, if any.
    pub fn transport(&self) -> Option<Arc<TransportHandle>> {
        self.handle.clone()
    }

    /// Runs the endpoint-attempt cascade.
    ///
    /// Attempts the primary candidate; on failure attempts the
    /// secondary exactly once if one exists. When every candidate has
    /// failed, transitions to `Degraded` and starts the simulated
    /// matchmaking engine - that outcome is an accepted operating mode,
    /// not an error.
    ///
    /// # Errors
    /// - `BrokerError::SupervisorClosed` - Called after teardown
    /// - `BrokerError::AlreadyInitializing` - Re-entrant call while a
    ///   cascade is in flight (or was cancelled mid-flight)
    /// - `BrokerError::AlreadyInitialized` - Cascade already completed;
    ///   the candidate list is tried at most once per mount
    pub async fn initialize(&mut self) -> Result<(), BrokerError> {
        if self.current_state() == ConnectionState::Closed {
            return Err(BrokerError::SupervisorClosed);
        }
        if self.initializing {
            return Err(BrokerError::AlreadyInitializing);
        }
        if self.cascade_ran {
            return Err(BrokerError::AlreadyInitialized);
        }

        self.initializing = true;
        self.run_cascade().await;
        self.initializing = false;
        self.cascade_ran = true;
        Ok(())
    }

    async fn run_cascade(&mut self) {
        self.set_state(ConnectionState::Connecting);

        let candidates = self.candidates.clone();
        let total = candidates.len();
        for (index, endpoint) in candidates.iter().enumerate() {
            tracing::info!(
                %endpoint,
                attempt = index + 1,
                total,
                "attempting matching server endpoint"
            );

            // Fresh connection per attempt; the connector applies the
            // per-attempt timeout itself.
            match self.connector.connect(endpoint, &self.options).await {
                Ok(handle) => {
                    self.install(handle);
                    return;
                }
                Err(error) => {
                    tracing::warn!(%endpoint, %error, "endpoint attempt failed");
                }
            }
        }

        self.enter_degraded();
    }

    /// Installs a freshly opened transport and begins observing its
    /// mid-session events.
    fn install(&mut self, handle: TransportHandle) {
        let handle = Arc::new(handle);
        let endpoint = handle.endpoint().clone();
        let mut events = handle.subscribe();
        let state_tx = Arc::clone(&self.state_tx);
        let shared = self.shared.clone();

        // Mid-session transport events update the observable state
        // only; the endpoint cascade never reruns here. Every publish
        // goes through `publish_state`, so a transition racing with
        // `shutdown()` on another worker can never land after `Closed`.
        let listener = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "transport event listener lagged");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };

                if *state_tx.borrow() == ConnectionState::Closed {
                    break;
                }

                match event {
                    TransportEvent::Opened => {
                        publish_state(&state_tx, ConnectionState::Connected);
                    }
                    TransportEvent::Reconnecting { attempt } => {
                        tracing::debug!(attempt, "transport reconnecting");
                        publish_state(&state_tx, ConnectionState::Reconnecting);
                    }
                    TransportEvent::Disconnected { reason } => {
                        tracing::warn!(%reason, "transport disconnected; reconnects exhausted");
                        // The session is over for good; consumers must
                        // not keep sending into a dead transport.
                        shared.set_transport_handle(None);
                        publish_state(&state_tx, ConnectionState::Reconnecting);
                    }
                    TransportEvent::Closed => break,
                    TransportEvent::Message(_) => {}
                }
            }
        });

        self.listener = Some(listener);
        self.handle = Some(Arc::clone(&handle));
        self.shared.set_transport_handle(Some(handle));
        self.shared.set_mock_mode(false);
        self.set_state(ConnectionState::Connected);
        tracing::info!(%endpoint, "connected to matching server");
    }

    /// Every candidate failed: close any partially-open transport and
    /// substitute the simulated matchmaking engine.
    fn enter_degraded(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        self.shared.set_transport_handle(None);
        self.shared.set_mock_mode(true);
        self.set_state(ConnectionState::Degraded);
        tracing::warn!("no matching server reachable; starting local match simulation");
        self.simulation.start_bot_simulation();
    }

    /// Tears the supervisor down.
    ///
    /// Closes any open transport, cancels the event listener, stops the
    /// simulation if it is running, and transitions to `Closed`. After
    /// this returns no further state transitions occur for this
    /// instance under any circumstance.
    pub fn shutdown(&mut self) {
        if self.current_state() == ConnectionState::Closed {
            return;
        }

        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        self.shared.set_transport_handle(None);
        if self.simulation.is_active() {
            self.simulation.stop();
        }
        self.set_state(ConnectionState::Closed);
        tracing::info!("connection supervisor closed");
    }

    fn set_state(&self, next: ConnectionState) {
        publish_state(&self.state_tx, next);
    }
}

/// Publishes a state transition unless the channel already reads
/// `Closed`.
///
/// The check and the write happen under the watch channel's internal
/// lock as one step. A plain borrow-then-send pair leaves a window on a
/// multi-thread runtime where a listener passes the closed check, gets
/// preempted while `shutdown()` completes, then overwrites `Closed`.
fn publish_state(state_tx: &watch::Sender<ConnectionState>, next: ConnectionState) -> bool {
    state_tx.send_if_modified(|current| {
        if *current == ConnectionState::Closed || *current == next {
            return false;
        }
        tracing::debug!(previous = %*current, %next, "connection state transition");
        *current = next;
        true
    })
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use futures::FutureExt;

    use super::*;
    use crate::transport::{ScriptedBehavior, ScriptedConnector};

    /// Counts fallback invocations for assertions.
    #[derive(Default)]
    struct RecordingFallback {
        starts: AtomicU32,
        stops: AtomicU32,
        active: AtomicBool,
    }

    impl MatchFallback for RecordingFallback {
        fn start_bot_simulation(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.active.store(true, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.active.store(false, Ordering::SeqCst);
        }

        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }
    }

    fn supervisor(
        hostname: &str,
        connector: Arc<ScriptedConnector>,
    ) -> (ConnectionSupervisor, Arc<RecordingFallback>, FacadeState) {
        let config = PairlinkConfig::for_testing();
        let environment = Environment::new(hostname, false);
        let fallback = Arc::new(RecordingFallback::default());
        let shared = FacadeState::default();
        let supervisor = ConnectionSupervisor::new(
            &config,
            &environment,
            connector,
            Arc::clone(&fallback) as Arc<dyn MatchFallback>,
            shared.clone(),
        );
        (supervisor, fallback, shared)
    }

    #[tokio::test]
    async fn test_reachable_primary_connects_without_fallback() {
        let connector = Arc::new(ScriptedConnector::reachable());
        let (mut supervisor, fallback, shared) = supervisor("localhost", Arc::clone(&connector));

        supervisor.initialize().await.unwrap();

        assert_eq!(supervisor.current_state(), ConnectionState::Connected);
        assert_eq!(fallback.starts.load(Ordering::SeqCst), 0);
        assert!(!shared.is_using_mock_mode());
        assert!(shared.transport_handle().is_some());
        // Secondary never attempted when the primary opens.
        assert_eq!(connector.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_secondary_attempted_after_primary_failure() {
        // Scenario A: localhost, :8000 unreachable, :8001 reachable.
        let connector = Arc::new(
            ScriptedConnector::unreachable().with_port(8001, ScriptedBehavior::Reachable),
        );
        let (mut supervisor, fallback, shared) = supervisor("localhost", Arc::clone(&connector));

        supervisor.initialize().await.unwrap();

        assert_eq!(supervisor.current_state(), ConnectionState::Connected);
        assert!(!shared.is_using_mock_mode());
        assert_eq!(fallback.starts.load(Ordering::SeqCst), 0);

        let attempted: Vec<u16> = connector.attempts().iter().map(|e| e.port).collect();
        assert_eq!(attempted, vec![8000, 8001]);
    }

    #[tokio::test]
    async fn test_exhausted_candidates_enter_degraded_once() {
        // Scenario B: localhost, both candidates unreachable.
        let connector = Arc::new(ScriptedConnector::unreachable());
        let (mut supervisor, fallback, shared) = supervisor("localhost", Arc::clone(&connector));

        supervisor.initialize().await.unwrap();

        assert_eq!(supervisor.current_state(), ConnectionState::Degraded);
        assert!(shared.is_using_mock_mode());
        assert!(shared.transport_handle().is_none());
        assert_eq!(fallback.starts.load(Ordering::SeqCst), 1);

        let attempted: Vec<u16> = connector.attempts().iter().map(|e| e.port).collect();
        assert_eq!(attempted, vec![8000, 8001]);
    }

    #[tokio::test]
    async fn test_direct_host_has_single_candidate() {
        // Scenario C: arbitrary hostname resolves to exactly one candidate.
        let connector = Arc::new(ScriptedConnector::unreachable());
        let (mut supervisor, fallback, _) = supervisor("example.com", Arc::clone(&connector));

        assert_eq!(supervisor.candidates().len(), 1);
        assert_eq!(supervisor.candidates()[0].host, "example.com");
        assert_eq!(supervisor.candidates()[0].port, 8000);

        supervisor.initialize().await.unwrap();
        assert_eq!(supervisor.current_state(), ConnectionState::Degraded);
        assert_eq!(fallback.starts.load(Ordering::SeqCst), 1);
        assert_eq!(connector.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_cascade_runs_at_most_once() {
        let connector = Arc::new(ScriptedConnector::reachable());
        let (mut supervisor, _, _) = supervisor("example.com", Arc::clone(&connector));

        supervisor.initialize().await.unwrap();
        let second = supervisor.initialize().await;

        assert!(matches!(second, Err(BrokerError::AlreadyInitialized)));
        assert_eq!(connector.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_cascade_rejects_reentry() {
        let connector = Arc::new(ScriptedConnector::new(ScriptedBehavior::Hang));
        let (mut supervisor, _, _) = supervisor("example.com", connector);

        // Poll the cascade once, then drop it mid-attempt.
        assert!(supervisor.initialize().now_or_never().is_none());

        let result = supervisor.initialize().await;
        assert!(matches!(result, Err(BrokerError::AlreadyInitializing)));
    }

    #[tokio::test]
    async fn test_shutdown_is_terminal() {
        let connector = Arc::new(ScriptedConnector::unreachable());
        let (mut supervisor, fallback, shared) = supervisor("localhost", connector);

        supervisor.initialize().await.unwrap();
        assert!(fallback.is_active());

        let mut state = supervisor.state();
        supervisor.shutdown();

        assert_eq!(supervisor.current_state(), ConnectionState::Closed);
        assert!(!fallback.is_active());
        assert_eq!(fallback.stops.load(Ordering::SeqCst), 1);
        assert!(shared.transport_handle().is_none());

        // Shutdown twice is a no-op; initialize afterwards is rejected.
        supervisor.shutdown();
        assert_eq!(fallback.stops.load(Ordering::SeqCst), 1);
        assert!(matches!(
            supervisor.initialize().await,
            Err(BrokerError::SupervisorClosed)
        ));

        // No state mutation after teardown.
        assert_eq!(*state.borrow_and_update(), ConnectionState::Closed);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!state.has_changed().unwrap_or(false));
    }

    #[tokio::test]
    async fn test_shutdown_during_connecting_cancels_attempt() {
        let connector = Arc::new(ScriptedConnector::new(ScriptedBehavior::Hang));
        let (mut supervisor, fallback, _) = supervisor("example.com", Arc::clone(&connector));

        // Unmount lands while the attempt is still hanging.
        assert!(supervisor.initialize().now_or_never().is_none());
        assert_eq!(supervisor.current_state(), ConnectionState::Connecting);

        supervisor.shutdown();
        assert_eq!(supervisor.current_state(), ConnectionState::Closed);

        // The dropped attempt never fires its timeout path, so the
        // fallback is never started.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(supervisor.current_state(), ConnectionState::Closed);
        assert_eq!(fallback.starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_state_publish_rejected_after_closed() {
        // A listener racing with shutdown on another worker loses the
        // race inside the watch lock, not at a separate check.
        let (tx, mut rx) = watch::channel(ConnectionState::Closed);

        assert!(!publish_state(&tx, ConnectionState::Reconnecting));
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Closed);
        assert!(!rx.has_changed().unwrap_or(true));
    }

    #[tokio::test]
    async fn test_exhausted_reconnects_clear_published_handle() {
        let connector = Arc::new(ScriptedConnector::reachable());
        let (mut supervisor, _, shared) = supervisor("example.com", Arc::clone(&connector));

        supervisor.initialize().await.unwrap();
        assert!(shared.transport_handle().is_some());

        let mut state = supervisor.state();
        let events = connector.last_event_sender().unwrap();
        events
            .send(TransportEvent::Disconnected {
                reason: "socket reset".to_string(),
            })
            .unwrap();

        state
            .wait_for(|s| *s == ConnectionState::Reconnecting)
            .await
            .unwrap();
        // The handle is cleared before the state flips, so once the
        // transition is observed no dead handle is reachable.
        assert!(shared.transport_handle().is_none());
    }

    #[tokio::test]
    async fn test_mid_session_events_update_state_without_new_cascade() {
        let connector = Arc::new(ScriptedConnector::reachable());
        let (mut supervisor, _, _) = supervisor("example.com", Arc::clone(&connector));

        supervisor.initialize().await.unwrap();
        let mut state = supervisor.state();
        let events = connector.last_event_sender().unwrap();

        events
            .send(TransportEvent::Reconnecting { attempt: 1 })
            .unwrap();
        state
            .wait_for(|s| *s == ConnectionState::Reconnecting)
            .await
            .unwrap();

        events.send(TransportEvent::Opened).unwrap();
        state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();

        // The cascade never reran: still exactly one attempt.
        assert_eq!(connector.attempts().len(), 1);
    }
}
