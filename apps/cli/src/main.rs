//! SourceScout CLI: run a research plan and print budget-bounded sources.
//!
//! Executes a planner's research steps against a search backend and the web,
//! distills what comes back, and keeps what fits the model's token budget.

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
