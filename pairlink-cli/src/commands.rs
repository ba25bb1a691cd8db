//! CLI command implementations

use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use pairlink_core::config::PairlinkConfig;
use pairlink_core::endpoint::{Environment, resolve_candidates};
use pairlink_core::supervisor::ConnectionState;
use pairlink_core::transport::WebSocketConnector;
use pairlink_core::{ConsumerFacade, MatchFallback};
use pairlink_sim::{MatchSimulationEngine, SimulationPhase};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the resolved candidate endpoints for a hostname
    Resolve {
        /// Hostname the application is served from
        hostname: String,
        /// Treat the page as served over TLS
        #[arg(long)]
        secure: bool,
    },
    /// Connect to the matching backend and stream state transitions
    Connect {
        /// Hostname the application is served from
        hostname: String,
        /// Treat the page as served over TLS
        #[arg(long)]
        secure: bool,
    },
    /// Run the bot matchmaking simulation standalone
    Simulate {
        /// Deterministic seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
        /// Number of match cycles to run before exiting
        #[arg(short, long, default_value = "2")]
        cycles: u32,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Resolve { hostname, secure } => resolve(hostname, secure),
        Commands::Connect { hostname, secure } => connect(hostname, secure).await,
        Commands::Simulate { seed, cycles } => simulate(seed, cycles).await,
    }
}

/// Print the candidate endpoint table for a hostname.
fn resolve(hostname: String, secure: bool) -> Result<()> {
    let config = PairlinkConfig::from_env();
    let environment = Environment::new(hostname, secure);
    let candidates = resolve_candidates(&environment, &config.endpoints);

    println!("Candidate endpoints");
    println!("{:-<50}", "");
    for candidate in &candidates {
        let role = if candidate.priority == 0 {
            "primary"
        } else {
            "secondary"
        };
        println!("{:>9}  {}", role, candidate.url());
    }

    Ok(())
}

/// Supervise a live connection, falling back to simulated matchmaking.
async fn connect(hostname: String, secure: bool) -> Result<()> {
    let config = PairlinkConfig::from_env();
    let environment = Environment::new(hostname, secure);
    let engine = Arc::new(MatchSimulationEngine::new(config.simulation.clone()));
    let mut sessions = engine.subscribe();

    let facade = ConsumerFacade::new(
        config,
        environment,
        Arc::new(WebSocketConnector::new()),
        Arc::clone(&engine) as Arc<dyn MatchFallback>,
    );

    let mut state = facade.connection_state();
    facade.connect();

    println!("Press Ctrl+C to stop");
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                println!("connection state: {current}");
                if current == ConnectionState::Closed {
                    break;
                }
            }
            changed = sessions.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(session) = sessions.borrow_and_update().clone() {
                    match (&session.phase, &session.partner) {
                        (SimulationPhase::Matched, Some(partner)) => {
                            println!("simulated match: {}", partner.display_name);
                        }
                        (phase, _) => println!("simulated session: {phase}"),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("shutting down");
                facade.teardown().await;
                break;
            }
        }
    }

    Ok(())
}

/// Run the simulation engine by itself for a few match cycles.
async fn simulate(seed: Option<u64>, cycles: u32) -> Result<()> {
    let mut config = PairlinkConfig::from_env().simulation;
    if seed.is_some() {
        config.deterministic_seed = seed;
    }

    let engine = MatchSimulationEngine::new(config);
    let mut sessions = engine.subscribe();
    engine.start_bot_simulation();

    let mut completed = 0u32;
    while completed < cycles {
        if sessions.changed().await.is_err() {
            break;
        }
        let snapshot = sessions.borrow_and_update().clone();
        if let Some(session) = snapshot {
            match (&session.phase, &session.partner) {
                (SimulationPhase::Matched, Some(partner)) => {
                    println!("matched with {}", partner.display_name);
                }
                (SimulationPhase::Ended, _) => {
                    completed += 1;
                    println!("cycle {completed} of {cycles} ended");
                }
                (phase, _) => println!("{phase}"),
            }
        }
    }

    engine.stop();
    println!("Simulation completed!");
    Ok(())
}
