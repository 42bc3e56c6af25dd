mod commands;
mod config;
mod logging;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use logging::init_logging;

#[derive(clap::Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, default_value = "chanclol.yaml", env = "CHANCLOL_CONFIG")]
    config: PathBuf,
}

#[derive(clap::Subcommand)]
pub(crate) enum Commands {
    /// Poll tracked players and notify guilds when they start a game
    Run,
    /// Validate config file
    Check,
    /// Handle a single chat command as if it was sent from a guild channel
    ///
    /// A running instance picks up the changes on its next registry sync. The
    /// lookups made here are not counted against the running instance's quota.
    Command {
        #[arg(long)]
        guild: String,
        #[arg(long)]
        channel: String,
        /// Message text, e.g. `chanclol register Name#TAG`
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Run => crate::commands::run::command(&cli).await,
        Commands::Check => crate::commands::check::command(&cli).await,
        Commands::Command {
            guild,
            channel,
            message,
        } => crate::commands::command::command(&cli, guild, channel, &message.join(" ")).await,
    }
}
