//! Simulated session and chat event types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::partner::SimulatedPartner;

/// Phase of a simulated matchmaking session.
///
/// Sessions advance `Searching → Matched → Chatting → Ended` and loop
/// back to `Searching` until the engine is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationPhase {
    Searching,
    Matched,
    Chatting,
    Ended,
}

impl fmt::Display for SimulationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Searching => write!(f, "searching"),
            Self::Matched => write!(f, "matched"),
            Self::Chatting => write!(f, "chatting"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// An in-process fabricated matching/chat session, used only in
/// degraded mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedSession {
    pub id: Uuid,
    pub phase: SimulationPhase,
    pub partner: Option<SimulatedPartner>,
    pub started_at: DateTime<Utc>,
}

impl SimulatedSession {
    /// Fresh session in the `Searching` phase with no partner yet.
    pub fn searching() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: SimulationPhase::Searching,
            partner: None,
            started_at: Utc::now(),
        }
    }
}

/// A synthetic chat line emitted while a simulated session is in the
/// `Chatting` phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedChatEvent {
    pub session_id: Uuid,
    pub partner_id: Uuid,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}
