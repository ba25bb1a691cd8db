//! The simulated matchmaking engine.
//!
//! Substitutes a believable matching/chat experience when the broker
//! cannot reach a live server. One engine holds at most one active
//! session; starting is idempotent and stopping cancels every pending
//! phase timer synchronously.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use pairlink_core::MatchFallback;
use pairlink_core::config::SimulationConfig;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::partner::PartnerPool;
use crate::session::{SimulatedChatEvent, SimulatedSession, SimulationPhase};

/// Canned lines the fabricated partner "types" during Chatting.
const CHAT_LINES: &[&str] = &[
    "hey! where are you from?",
    "haha nice",
    "I was just about to log off, glad I didn't",
    "what do you do for fun?",
    "no way, me too!",
    "this app keeps matching me with interesting people",
];

/// Process-wide simulated matchmaking service.
///
/// Constructed once at application startup and injected wherever the
/// broker or UI needs it; holds at most one active session at a time.
pub struct MatchSimulationEngine {
    config: SimulationConfig,
    pool: PartnerPool,
    run: parking_lot::Mutex<Option<ActiveRun>>,
    session_tx: Arc<watch::Sender<Option<SimulatedSession>>>,
    chat_tx: broadcast::Sender<SimulatedChatEvent>,
}

/// One running matchmaking loop and its stop gate.
///
/// The gate outlives the abort: a loop iteration already mid-poll on
/// another worker checks it inside the watch lock, so no session
/// snapshot can land after `stop()` has published `None`.
struct ActiveRun {
    task: JoinHandle<()>,
    stopped: Arc<AtomicBool>,
}

impl MatchSimulationEngine {
    pub fn new(config: SimulationConfig) -> Self {
        let (session_tx, _) = watch::channel(None);
        let (chat_tx, _) = broadcast::channel(64);
        Self {
            config,
            pool: PartnerPool::default(),
            run: parking_lot::Mutex::new(None),
            session_tx: Arc::new(session_tx),
            chat_tx,
        }
    }

    /// Subscribes to session snapshots.
    ///
    /// `None` means no simulated session is active.
    pub fn subscribe(&self) -> watch::Receiver<Option<SimulatedSession>> {
        self.session_tx.subscribe()
    }

    /// Subscribes to synthetic chat lines emitted during `Chatting`.
    pub fn chat_events(&self) -> broadcast::Receiver<SimulatedChatEvent> {
        self.chat_tx.subscribe()
    }
}

impl MatchFallback for MatchSimulationEngine {
    fn start_bot_simulation(&self) {
        let mut run = self.run.lock();
        if run.as_ref().is_some_and(|r| !r.task.is_finished()) {
            // Already active: a no-op by contract, not an error.
            tracing::debug!("bot simulation already active; ignoring start");
            return;
        }

        tracing::info!("starting bot matchmaking simulation");
        let config = self.config.clone();
        let pool = self.pool.clone();
        let session_tx = Arc::clone(&self.session_tx);
        let chat_tx = self.chat_tx.clone();
        let stopped = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_matchmaking_loop(
            config,
            pool,
            session_tx,
            chat_tx,
            Arc::clone(&stopped),
        ));
        *run = Some(ActiveRun { task, stopped });
    }

    fn stop(&self) {
        let mut run = self.run.lock();
        if let Some(run) = run.take() {
            // Gate first: any loop publish still mid-flight is refused
            // before the session is cleared below.
            run.stopped.store(true, Ordering::SeqCst);
            run.task.abort();
            tracing::info!("bot matchmaking simulation stopped");
        }
        let _ = self.session_tx.send(None);
    }

    fn is_active(&self) -> bool {
        self.run.lock().as_ref().is_some_and(|r| !r.task.is_finished())
    }
}

impl Drop for MatchSimulationEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Duration drawn uniformly from `[min, max]`, in milliseconds.
fn bounded_delay(rng: &mut ChaCha8Rng, min: Duration, max: Duration) -> Duration {
    let min_ms = min.as_millis() as u64;
    let max_ms = (max.as_millis() as u64).max(min_ms);
    Duration::from_millis(rng.random_range(min_ms..=max_ms))
}

/// Publishes a session snapshot unless the run has been stopped.
///
/// The gate check and the write happen under the watch channel's
/// internal lock, so a snapshot racing with `stop()` on another worker
/// can never overwrite the `None` that `stop()` publishes.
fn publish_session(
    stopped: &AtomicBool,
    session_tx: &watch::Sender<Option<SimulatedSession>>,
    session: SimulatedSession,
) -> bool {
    session_tx.send_if_modified(|slot| {
        if stopped.load(Ordering::SeqCst) {
            return false;
        }
        *slot = Some(session);
        true
    })
}

/// Cycles `Searching → Matched → Chatting → Ended` until aborted.
async fn run_matchmaking_loop(
    config: SimulationConfig,
    pool: PartnerPool,
    session_tx: Arc<watch::Sender<Option<SimulatedSession>>>,
    chat_tx: broadcast::Sender<SimulatedChatEvent>,
    stopped: Arc<AtomicBool>,
) {
    let mut rng = match config.deterministic_seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_os_rng(),
    };
    let mut line_index = 0usize;

    loop {
        let mut session = SimulatedSession::searching();
        tracing::debug!(session_id = %session.id, "simulated session searching");
        publish_session(&stopped, &session_tx, session.clone());
        let searching_for =
            bounded_delay(&mut rng, config.search_delay_min, config.search_delay_max);
        tokio::time::sleep(searching_for).await;

        let partner = pool.assign(&mut rng);
        tracing::debug!(session_id = %session.id, partner = %partner.display_name, "simulated match found");
        session.partner = Some(partner.clone());
        session.phase = SimulationPhase::Matched;
        publish_session(&stopped, &session_tx, session.clone());
        tokio::time::sleep(config.matched_delay).await;

        session.phase = SimulationPhase::Chatting;
        publish_session(&stopped, &session_tx, session.clone());
        let chat_for = bounded_delay(&mut rng, config.chat_duration_min, config.chat_duration_max);
        let chat_started = tokio::time::Instant::now();
        while chat_started.elapsed() < chat_for {
            tokio::time::sleep(config.message_interval).await;
            if chat_started.elapsed() >= chat_for {
                break;
            }
            let event = SimulatedChatEvent {
                session_id: session.id,
                partner_id: partner.id,
                text: CHAT_LINES[line_index % CHAT_LINES.len()].to_string(),
                sent_at: Utc::now(),
            };
            line_index += 1;
            if !stopped.load(Ordering::SeqCst) {
                let _ = chat_tx.send(event);
            }
        }

        session.phase = SimulationPhase::Ended;
        publish_session(&stopped, &session_tx, session);
        tokio::time::sleep(config.ended_delay).await;
        // Loops back to Searching; stop() is the only way out.
    }
}
