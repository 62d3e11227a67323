//! Surrogate Bench - Main Entry Point

use clap::Parser;
use surrogate_bench::cli::{cmd_compare, cmd_models, log_subscriber, Cli, Commands};
use tracing_subscriber::prelude::*;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    log_subscriber(cli.log_file.as_deref())?.init();

    match &cli.command {
        Commands::Compare(args) => cmd_compare(args)?,
        Commands::Models => cmd_models()?,
    }

    Ok(())
}
