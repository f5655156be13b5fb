//! Directory management for the tether node.

use crate::{
    cli::DataDirArgs,
    constants::{CONFIG_FILE_NAME, FALLBACK_DATA_DIR},
};
use directories::ProjectDirs;
use eyre::{Result, WrapErr};
use std::{fs, path::PathBuf};

/// Returns the default project directories for tether.
pub fn default_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("rs", "tether", "tether")
}

/// Returns the default data directory path.
pub fn default_data_dir() -> Option<PathBuf> {
    default_project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Locations of the node's files.
#[derive(Debug, Clone)]
pub struct DataDirs {
    /// Root data directory
    pub root: PathBuf,
}

impl DataDirs {
    /// Resolves the data directory from `args` and creates it.
    pub fn new(args: &DataDirArgs) -> Result<Self> {
        let root = args
            .datadir
            .clone()
            .unwrap_or_else(|| default_data_dir().unwrap_or_else(|| PathBuf::from(FALLBACK_DATA_DIR)));

        fs::create_dir_all(&root)
            .wrap_err_with(|| format!("failed to create directory {}", root.display()))?;

        Ok(Self { root })
    }

    /// Returns the path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datadir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("nested").join("node");
        let dirs = DataDirs::new(&DataDirArgs { datadir: Some(root.clone()) }).unwrap();
        assert!(root.is_dir());
        assert_eq!(dirs.config_file(), root.join("config.toml"));
    }
}
