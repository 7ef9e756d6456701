//! mailsift CLI: extract the people a sender has emailed.
//!
//! Fetches recipient addresses for a sender, merges probable duplicate
//! identities, and saves the deduplicated list as CSV or JSON.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
