//! Pairlink CLI - Command-line interface
//!
//! Provides command-line access to the connection broker and the
//! degraded-mode matchmaking simulation.

mod commands;

use clap::Parser;

#[derive(Parser)]
#[command(name = "pairlink")]
#[command(about = "Realtime connection broker for the Pairlink matching backend")]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    commands::handle_command(cli.command).await?;

    Ok(())
}
