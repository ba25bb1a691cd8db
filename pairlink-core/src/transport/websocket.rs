//! Production websocket connector.
//!
//! Opens a fresh websocket per attempt, pumps frames through the
//! handle's channels, and drives the bounded in-session reconnect loop.
//! The initial endpoint cascade lives in the supervisor; this module
//! only recovers mid-session drops.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{ConnectOptions, Connector, TransportError, TransportEvent, TransportHandle};
use crate::endpoint::Endpoint;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector speaking websocket to the matching server.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ConnectOptions,
    ) -> Result<TransportHandle, TransportError> {
        let stream = open_socket(endpoint, options).await?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(options.event_buffer);
        let pump = tokio::spawn(pump_session(
            endpoint.clone(),
            options.clone(),
            stream,
            outbound_rx,
            event_tx.clone(),
        ));

        Ok(TransportHandle::new(
            endpoint.clone(),
            outbound_tx,
            event_tx,
            Some(pump),
        ))
    }
}

/// Opens one fresh websocket within the configured timeout.
async fn open_socket(
    endpoint: &Endpoint,
    options: &ConnectOptions,
) -> Result<WsStream, TransportError> {
    let mut request =
        endpoint
            .url()
            .into_client_request()
            .map_err(|e| TransportError::InvalidRequest {
                reason: e.to_string(),
            })?;

    if options.include_credentials {
        if let Some(credentials) = &options.credentials {
            let value = HeaderValue::from_str(credentials).map_err(|e| {
                TransportError::InvalidRequest {
                    reason: format!("invalid credentials header: {e}"),
                }
            })?;
            request.headers_mut().insert(COOKIE, value);
        }
    }

    match tokio::time::timeout(options.connect_timeout, connect_async(request)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(TransportError::Unreachable {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(TransportError::ConnectTimeout {
            endpoint: endpoint.to_string(),
            timeout: options.connect_timeout,
        }),
    }
}

enum SessionEnd {
    /// Outbound channel dropped; the handle was closed locally.
    Local,
    /// Server closed the session or the socket failed.
    Remote(String),
}

/// Forwards frames both ways until the session ends, then runs the
/// bounded reconnect loop. Returns when the session is over for good.
async fn pump_session(
    endpoint: Endpoint,
    options: ConnectOptions,
    mut stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: broadcast::Sender<TransportEvent>,
) {
    loop {
        let reason = match drive(&mut stream, &mut outbound, &events).await {
            SessionEnd::Local => return,
            SessionEnd::Remote(reason) => reason,
        };

        tracing::warn!(endpoint = %endpoint, %reason, "transport session lost");

        let mut reconnected = None;
        for attempt in 1..=options.reconnect_max_attempts {
            let _ = events.send(TransportEvent::Reconnecting { attempt });
            tokio::time::sleep(options.reconnect_delay).await;

            match open_socket(&endpoint, &options).await {
                Ok(fresh) => {
                    reconnected = Some(fresh);
                    break;
                }
                Err(error) => {
                    tracing::debug!(endpoint = %endpoint, attempt, %error, "reconnect attempt failed");
                }
            }
        }

        match reconnected {
            Some(fresh) => {
                stream = fresh;
                let _ = events.send(TransportEvent::Opened);
                tracing::info!(endpoint = %endpoint, "transport session reestablished");
            }
            None => {
                let _ = events.send(TransportEvent::Disconnected { reason });
                return;
            }
        }
    }
}

async fn drive(
    stream: &mut WsStream,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    events: &broadcast::Sender<TransportEvent>,
) -> SessionEnd {
    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(text) => {
                    if let Err(e) = stream.send(Message::text(text)).await {
                        return SessionEnd::Remote(e.to_string());
                    }
                }
                None => {
                    let _ = stream.close(None).await;
                    return SessionEnd::Local;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(text.to_string()));
                }
                Some(Ok(Message::Close(_))) | None => {
                    return SessionEnd::Remote("connection closed by server".to_string());
                }
                Some(Ok(_)) => {
                    // Ping/pong and binary frames carry no broker-level meaning.
                }
                Some(Err(e)) => return SessionEnd::Remote(e.to_string()),
            },
        }
    }
}
