//! membank - Memory bank maintenance CLI
//!
//! Analyzes branch-scoped architecture knowledge, applies bounded
//! optimization plans, and restores snapshots.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("membank=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load()?;

    // Execute command
    match cli.command {
        Commands::Analyze(cmd) => commands::analyze::execute(cmd, &config).await,
        Commands::Optimize(cmd) => commands::optimize::execute(cmd, &config).await,
        Commands::Rollback(cmd) => commands::rollback::execute(cmd, &config).await,
        Commands::Snapshots(cmd) => commands::snapshots::execute(cmd, &config).await,
        Commands::Import(cmd) => commands::import::execute(cmd, &config).await,
        Commands::Version => {
            println!("membank {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
