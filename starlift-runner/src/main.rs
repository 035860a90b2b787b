//! Pipeline runner binary.
//!
//! One subcommand per stage, so a scheduler can invoke extraction,
//! transformation and load on independent cadences against the same
//! configured storage areas.

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod core;

#[derive(Debug, Parser)]
#[command(name = "starlift", about = "Incremental warehouse pipeline runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Snapshot changed source tables into a new staging run.
    Extract,
    /// Transform the latest staged run into warehouse tables.
    Transform,
    /// Apply the latest processed run to the warehouse.
    Load {
        /// Print rendered insert statements instead of applying them.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    if let Err(err) = core::run(cli.command).await {
        error!("{err:#}");
        std::process::exit(1);
    }
}
