//! Scripted connector for exercising the supervisor without a network.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use super::{ConnectOptions, Connector, TransportError, TransportEvent, TransportHandle};
use crate::endpoint::Endpoint;

/// Scripted outcome for connection attempts against one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedBehavior {
    /// Attempt succeeds immediately
    Reachable,
    /// Attempt fails immediately with a refused-style error
    Unreachable,
    /// Attempt hangs until the connect timeout elapses
    Hang,
}

/// Connector whose outcomes are scripted per endpoint port.
///
/// Records every attempted endpoint in order so tests can assert the
/// cascade tried candidates exactly once and in priority order.
#[derive(Debug)]
pub struct ScriptedConnector {
    behaviors: HashMap<u16, ScriptedBehavior>,
    default: ScriptedBehavior,
    attempts: parking_lot::Mutex<Vec<Endpoint>>,
    event_senders: parking_lot::Mutex<Vec<broadcast::Sender<TransportEvent>>>,
}

impl ScriptedConnector {
    pub fn new(default: ScriptedBehavior) -> Self {
        Self {
            behaviors: HashMap::new(),
            default,
            attempts: parking_lot::Mutex::new(Vec::new()),
            event_senders: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Connector where every endpoint accepts.
    pub fn reachable() -> Self {
        Self::new(ScriptedBehavior::Reachable)
    }

    /// Connector where every endpoint refuses.
    pub fn unreachable() -> Self {
        Self::new(ScriptedBehavior::Unreachable)
    }

    /// Overrides the behavior for one port.
    pub fn with_port(mut self, port: u16, behavior: ScriptedBehavior) -> Self {
        self.behaviors.insert(port, behavior);
        self
    }

    /// Endpoints attempted so far, in order.
    pub fn attempts(&self) -> Vec<Endpoint> {
        self.attempts.lock().clone()
    }

    /// Event sender of the most recently opened session.
    ///
    /// Lets tests inject mid-session transport events into a handle
    /// created by this connector.
    pub fn last_event_sender(&self) -> Option<broadcast::Sender<TransportEvent>> {
        self.event_senders.lock().last().cloned()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ConnectOptions,
    ) -> Result<TransportHandle, TransportError> {
        self.attempts.lock().push(endpoint.clone());

        let behavior = self
            .behaviors
            .get(&endpoint.port)
            .copied()
            .unwrap_or(self.default);

        match behavior {
            ScriptedBehavior::Reachable => {
                let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
                let (event_tx, _) = broadcast::channel(options.event_buffer);
                // Drain outbound messages so send() keeps succeeding.
                let pump = tokio::spawn(async move { while outbound_rx.recv().await.is_some() {} });

                self.event_senders.lock().push(event_tx.clone());
                Ok(TransportHandle::new(
                    endpoint.clone(),
                    outbound_tx,
                    event_tx,
                    Some(pump),
                ))
            }
            ScriptedBehavior::Unreachable => Err(TransportError::Unreachable {
                endpoint: endpoint.to_string(),
                reason: "scripted connection refusal".to_string(),
            }),
            ScriptedBehavior::Hang => {
                tokio::time::sleep(options.connect_timeout).await;
                Err(TransportError::ConnectTimeout {
                    endpoint: endpoint.to_string(),
                    timeout: options.connect_timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::NetworkConfig;
    use crate::endpoint::EndpointScheme;

    fn endpoint(port: u16) -> Endpoint {
        Endpoint {
            host: "localhost".to_string(),
            port,
            scheme: EndpointScheme::Ws,
            priority: 0,
        }
    }

    fn options() -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_millis(20),
            ..ConnectOptions::from_config(&NetworkConfig::default())
        }
    }

    #[tokio::test]
    async fn test_scripted_outcomes_per_port() {
        let connector = ScriptedConnector::unreachable().with_port(8001, ScriptedBehavior::Reachable);

        assert!(connector.connect(&endpoint(8000), &options()).await.is_err());
        let handle = connector.connect(&endpoint(8001), &options()).await.unwrap();
        assert!(handle.is_open());

        let attempted: Vec<u16> = connector.attempts().iter().map(|e| e.port).collect();
        assert_eq!(attempted, vec![8000, 8001]);
    }

    #[tokio::test]
    async fn test_hang_reports_timeout() {
        let connector = ScriptedConnector::new(ScriptedBehavior::Hang);
        let result = connector.connect(&endpoint(8000), &options()).await;
        assert!(matches!(result, Err(TransportError::ConnectTimeout { .. })));
    }
}
