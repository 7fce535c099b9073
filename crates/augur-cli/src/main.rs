//! Demo binary: runs one analysis or follow-up against the configured model
//! backend and prints the downstream SSE frames (or the JSON reply).

mod cli;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    augur_core::config::init();
    augur_core::observability::init_observability();
    cli::Cli::parse().run().await
}
