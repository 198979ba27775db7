//! Tribunal CLI: batch pipeline for published tribunal decisions.
//!
//! Discovers decisions through the public search interface, downloads their
//! documents into a landing zone, and cleans them into a curated zone.

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
