//! Transport abstraction for the matching-server session.
//!
//! Enables both the real websocket transport and scripted test
//! connectors to drive the same supervision logic.

pub mod mock;
pub mod websocket;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

pub use mock::{ScriptedBehavior, ScriptedConnector};
pub use websocket::WebSocketConnector;

use crate::config::NetworkConfig;
use crate::endpoint::Endpoint;

/// Errors raised by the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    #[error("Endpoint {endpoint} unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("Invalid connection request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Transport is closed")]
    Closed,
}

/// Parameters applied to every connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Timeout for a single endpoint attempt
    pub connect_timeout: Duration,
    /// Maximum automatic in-session reconnect attempts
    pub reconnect_max_attempts: u32,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// Whether to attach stored credentials to the handshake
    pub include_credentials: bool,
    /// Session credentials sent when `include_credentials` is set
    pub credentials: Option<String>,
    /// Capacity of the transport event broadcast channel
    pub event_buffer: usize,
}

impl ConnectOptions {
    /// Builds connect options from the network configuration section.
    pub fn from_config(network: &NetworkConfig) -> Self {
        Self {
            connect_timeout: network.connect_timeout,
            reconnect_max_attempts: network.reconnect_max_attempts,
            reconnect_delay: network.reconnect_delay,
            include_credentials: network.include_credentials,
            credentials: network.credentials.clone(),
            event_buffer: network.event_buffer,
        }
    }
}

/// Observable events emitted by an open transport session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportEvent {
    /// Session (re)opened
    Opened,
    /// Inbound text frame
    Message(String),
    /// Automatic reconnect attempt in progress
    Reconnecting { attempt: u32 },
    /// Session lost and reconnect attempts exhausted
    Disconnected { reason: String },
    /// Session closed locally
    Closed,
}

/// Opens transport sessions to candidate endpoints.
///
/// The production implementation speaks websocket; tests inject
/// scripted implementations so the supervisor's cascade logic can be
/// exercised without a network.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a fresh session to the endpoint.
    ///
    /// Implementations apply `options.connect_timeout` themselves and
    /// never reuse a stale socket across attempts.
    ///
    /// # Errors
    /// - `TransportError::ConnectTimeout` - No open within the timeout
    /// - `TransportError::Unreachable` - Endpoint refused or failed
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ConnectOptions,
    ) -> Result<TransportHandle, TransportError>;
}

/// An open transport session.
///
/// Owned exclusively by the connection supervisor while open; every
/// other component sees it as a shared read-only reference. Closing is
/// idempotent and synchronously cancels the session pump task, so no
/// transport callback can fire afterwards.
#[derive(Debug)]
pub struct TransportHandle {
    endpoint: Endpoint,
    outbound: mpsc::UnboundedSender<String>,
    events: broadcast::Sender<TransportEvent>,
    pump: parking_lot::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl TransportHandle {
    /// Assembles a handle around a running session pump.
    ///
    /// Used by connector implementations; consumers obtain handles only
    /// through the supervisor.
    pub fn new(
        endpoint: Endpoint,
        outbound: mpsc::UnboundedSender<String>,
        events: broadcast::Sender<TransportEvent>,
        pump: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            endpoint,
            outbound,
            events,
            pump: parking_lot::Mutex::new(pump),
            closed: AtomicBool::new(false),
        }
    }

    /// Endpoint this session was opened against.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Queues an outbound text message.
    ///
    /// # Errors
    /// - `TransportError::Closed` - Session already closed
    pub fn send(&self, message: impl Into<String>) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(message.into())
            .map_err(|_| TransportError::Closed)
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    /// Whether the session has not been closed locally.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Closes the session. Idempotent.
    ///
    /// Cancels the pump task before emitting the final `Closed` event,
    /// so no further events are observed after this returns.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        let _ = self.events.send(TransportEvent::Closed);
        tracing::debug!(endpoint = %self.endpoint, "transport session closed");
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Endpoint, EndpointScheme};

    fn endpoint() -> Endpoint {
        Endpoint {
            host: "localhost".to_string(),
            port: 8000,
            scheme: EndpointScheme::Ws,
            priority: 0,
        }
    }

    fn open_handle() -> (TransportHandle, mpsc::UnboundedReceiver<String>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(8);
        (TransportHandle::new(endpoint(), outbound, events, None), rx)
    }

    #[tokio::test]
    async fn test_send_before_and_after_close() {
        let (handle, mut rx) = open_handle();

        handle.send("hello").unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");

        handle.close();
        assert!(matches!(handle.send("late"), Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_emits_once() {
        let (handle, _rx) = open_handle();
        let mut events = handle.subscribe();

        handle.close();
        handle.close();

        assert_eq!(events.recv().await.unwrap(), TransportEvent::Closed);
        assert!(events.try_recv().is_err());
        assert!(!handle.is_open());
    }

    #[test]
    fn test_options_from_config_carry_fixed_parameters() {
        let network = NetworkConfig {
            credentials: Some("session=abc123".to_string()),
            ..NetworkConfig::default()
        };
        let options = ConnectOptions::from_config(&network);

        assert_eq!(options.connect_timeout, Duration::from_secs(20));
        assert_eq!(options.reconnect_max_attempts, 5);
        assert_eq!(options.reconnect_delay, Duration::from_secs(1));
        assert!(options.include_credentials);
        assert_eq!(options.credentials.as_deref(), Some("session=abc123"));
    }
}
