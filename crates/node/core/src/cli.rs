//! Command-line interface for the tether node.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::constants::{DEFAULT_DEV_CHUNKS, DEFAULT_DEV_HOSTERS};

/// Tether - storage hoster and attester node
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Logging configuration
    #[command(flatten)]
    pub log_args: LogArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Logging configuration
#[derive(Debug, Args, Clone, Default)]
#[command(next_help_heading = "Logging")]
pub struct LogArgs {
    /// Silence all output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (-v, -vv, -vvv, etc.)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Log filter directive (e.g., "tether_roles=debug,tether_session=trace")
    #[arg(long = "log.filter", value_name = "DIRECTIVE", global = true)]
    pub filter: Option<String>,

    /// Include timestamps in logs
    #[arg(long = "log.timestamps", global = true)]
    pub timestamps: bool,
}

/// Node commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run an in-process network through hosting setup, a storage challenge
    /// and a performance challenge
    Dev(DevArgs),

    /// Manage node configuration
    Config(ConfigArgs),
}

/// Data directory configuration
#[derive(Debug, Args, Clone, Default)]
#[command(next_help_heading = "Datadir")]
pub struct DataDirArgs {
    /// Data directory path (config, feed storage)
    #[arg(long, value_name = "PATH", env = "TETHER_DATADIR")]
    pub datadir: Option<PathBuf>,
}

/// Arguments for the 'dev' command
#[derive(Debug, Args)]
pub struct DevArgs {
    /// Data directory configuration
    #[command(flatten)]
    pub datadir: DataDirArgs,

    /// Number of chunks in the demo feed
    #[arg(long, default_value_t = DEFAULT_DEV_CHUNKS)]
    pub chunks: u64,

    /// Number of encoder/hoster pairs in the demo amendment
    #[arg(long, default_value_t = DEFAULT_DEV_HOSTERS)]
    pub hosters: usize,

    /// Send a bundle with a broken Merkle proof for this chunk from the first
    /// encoder
    #[arg(long, value_name = "INDEX")]
    pub corrupt: Option<u64>,

    /// Override the configured session deadline, in milliseconds
    #[arg(long = "session.timeout-ms", value_name = "MS")]
    pub session_timeout_ms: Option<u64>,
}

/// Arguments for the 'config' command
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Data directory configuration
    #[command(flatten)]
    pub datadir: DataDirArgs,

    /// Write the default configuration, replacing any existing file
    #[arg(long)]
    pub init: bool,

    /// Show current configuration
    #[arg(long)]
    pub show: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dev_with_global_log_args() {
        let cli = Cli::try_parse_from([
            "tether",
            "dev",
            "--chunks",
            "4",
            "--corrupt",
            "2",
            "-vv",
            "--log.filter",
            "tether_roles=trace",
        ])
        .unwrap();
        assert_eq!(cli.log_args.verbosity, 2);
        assert_eq!(cli.log_args.filter.as_deref(), Some("tether_roles=trace"));
        let Commands::Dev(args) = cli.command else { panic!("expected dev") };
        assert_eq!(args.chunks, 4);
        assert_eq!(args.hosters, DEFAULT_DEV_HOSTERS);
        assert_eq!(args.corrupt, Some(2));
    }

    #[test]
    fn test_config_flags() {
        let cli = Cli::try_parse_from(["tether", "config", "--show", "--datadir", "/tmp/t"]).unwrap();
        let Commands::Config(args) = cli.command else { panic!("expected config") };
        assert!(args.show && !args.init);
        assert_eq!(args.datadir.datadir, Some(PathBuf::from("/tmp/t")));
    }
}
