//! Tether node binary.

use clap::Parser;
use tether_node_core::{
    cli::{Cli, Commands},
    commands, logging,
};
use tracing::debug;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init_logging(&cli.log_args)?;
    debug!(?cli.command, "dispatching command");

    match cli.command {
        Commands::Dev(args) => commands::dev::run(args).await,
        Commands::Config(args) => commands::config::run(args).await,
    }
}
