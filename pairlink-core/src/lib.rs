//! Pairlink Core - Connection supervision for the matching backend
//!
//! This crate provides the realtime connection broker for Pairlink:
//! endpoint resolution from a structured environment descriptor, a
//! supervised websocket transport with a bounded endpoint-attempt
//! cascade, and a graceful fallback into locally simulated matchmaking
//! when no live server is reachable.

pub mod config;
pub mod endpoint;
pub mod facade;
pub mod simulation;
pub mod supervisor;
pub mod transport;

// Re-export main types for convenient access
pub use config::PairlinkConfig;
pub use endpoint::{Endpoint, Environment};
pub use facade::ConsumerFacade;
pub use simulation::MatchFallback;
pub use supervisor::{BrokerError, ConnectionState, ConnectionSupervisor};
pub use transport::{Connector, TransportError, TransportHandle};

/// Core errors that can bubble up from any Pairlink subsystem.
#[derive(Debug, thiserror::Error)]
pub enum PairlinkError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PairlinkError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            PairlinkError::Broker(e) => match e {
                BrokerError::EndpointUnreachable { endpoint } => {
                    format!("Could not reach matching server at {endpoint}")
                }
                BrokerError::AlreadyInitializing => {
                    "Connection attempt already in progress".to_string()
                }
                BrokerError::SupervisorClosed => "Connection has been shut down".to_string(),
                _ => "Connection error occurred".to_string(),
            },
            PairlinkError::Transport(_) => "Realtime transport error occurred".to_string(),
            PairlinkError::Configuration { .. } => "Configuration error occurred".to_string(),
            PairlinkError::Io(_) => "I/O error occurred".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PairlinkError>;
