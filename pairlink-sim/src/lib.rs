//! Pairlink Simulation - Fabricated matchmaking for degraded mode.
//!
//! When no live matching server is reachable, the connection
//! supervisor substitutes this engine so downstream consumers (the
//! matching screen, chat view) keep working without special-case
//! branches for "no backend available". Sessions cycle through the
//! same phases a real match would; under a fixed seed every delay and
//! partner assignment is reproducible.

pub mod engine;
pub mod partner;
pub mod session;

pub use engine::MatchSimulationEngine;
pub use partner::{PartnerPool, SimulatedPartner};
pub use session::{SimulatedChatEvent, SimulatedSession, SimulationPhase};
