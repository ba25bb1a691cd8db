//! Control seam for the degraded-mode matchmaking substitute.
//!
//! The concrete engine lives in `pairlink-sim`; the supervisor only
//! needs to start and stop it, so this trait keeps the dependency
//! pointing from the sim crate into core rather than the other way
//! around.

/// Locally simulated matchmaking, substituted when no live matching
/// server is reachable.
///
/// Constructed explicitly at application startup and injected by
/// reference; never read from ambient global state.
pub trait MatchFallback: Send + Sync {
    /// Starts the simulated matchmaking loop.
    ///
    /// Idempotent: calling this while a session is already active is a
    /// no-op, not an error.
    fn start_bot_simulation(&self);

    /// Stops the active simulated session and cancels all its pending
    /// timers. Safe to call when nothing is running.
    fn stop(&self);

    /// Whether a simulated session is currently active.
    fn is_active(&self) -> bool;
}
