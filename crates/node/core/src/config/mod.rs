//! Node configuration handling.
//!
//! Configuration is split into submodules:
//! - `session` - session deadline, challenge policies and event dedup
//! - `storage` - feed storage backend

mod session;
mod storage;

pub use session::{ChallengeConfig, EventConfig, SessionConfig};
pub use storage::{BackendKind, StorageConfig};

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use tether_roles::RoleConfig;

/// Configuration for the tether node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub challenge: ChallengeConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub node: EventConfig,
}

impl NodeConfig {
    /// Load the configuration from the given path, or create a default one if it doesn't exist.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = fs::read_to_string(path)
                .wrap_err_with(|| format!("failed to read {}", path.display()))?;
            let config: Self = toml::from_str(&content)
                .wrap_err_with(|| format!("invalid config {}", path.display()))?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Save the configuration to the given path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Protocol engine settings derived from this configuration.
    pub fn role_config(&self) -> RoleConfig {
        RoleConfig {
            session_timeout: Duration::from_millis(self.session.timeout_ms),
            storage_failure_policy: self.challenge.storage_failure_policy,
            index_selection: self.challenge.index_selection,
            dedup_capacity: self.node.dedup_capacity,
        }
    }
}
