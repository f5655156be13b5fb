//! Feed storage configuration for TOML persistence.

use crate::constants::DEFAULT_REDB_FILE_NAME;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tether_storer::{MemoryBackend, RedbBackend, StorageBackend, StorerResult};

/// Which backend holds hosted feeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Lost on restart.
    Memory,
    /// Single redb database file.
    #[default]
    Redb,
}

/// Storage configuration (TOML-serializable).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Database path. Relative paths resolve against the data directory;
    /// unset means `feeds.redb` in the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Opens the configured backend. Relative paths resolve against `root`.
    pub fn open(&self, root: &Path) -> StorerResult<Arc<dyn StorageBackend>> {
        Ok(match self.backend {
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
            BackendKind::Redb => {
                let path = match &self.path {
                    Some(path) => root.join(path),
                    None => root.join(DEFAULT_REDB_FILE_NAME),
                };
                Arc::new(RedbBackend::open(path)?)
            }
        })
    }
}
