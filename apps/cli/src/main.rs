//! energyqa CLI: scoped, evidence-grounded prompts for an energy physics study assistant.
//!
//! Loads project material, checks whether a question is in scope, retrieves
//! evidence and prints the payload for the answering model.

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
