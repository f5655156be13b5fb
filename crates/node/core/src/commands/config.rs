//! Config command - Manage node configuration

use crate::{cli::ConfigArgs, config::NodeConfig, dirs::DataDirs};
use eyre::Result;
use tracing::info;

/// Run the config command
pub async fn run(args: ConfigArgs) -> Result<()> {
    let dirs = DataDirs::new(&args.datadir)?;
    let path = dirs.config_file();

    if args.init {
        NodeConfig::default().save(&path)?;
        info!(path = %path.display(), "wrote default configuration");
    }

    if args.show || !args.init {
        let config = NodeConfig::load_or_create(&path)?;
        info!(path = %path.display(), "current configuration");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    Ok(())
}
