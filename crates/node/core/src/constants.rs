//! Constants used throughout the tether node.
//!
//! Protocol defaults live next to the code they tune (`RoleConfig`); this
//! module holds what the node binary itself needs.

// =============================================================================
// Files
// =============================================================================

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default name of the redb feed database inside the data directory.
pub const DEFAULT_REDB_FILE_NAME: &str = "feeds.redb";

/// Fallback data directory when the platform has no home directory.
pub const FALLBACK_DATA_DIR: &str = ".tether";

// =============================================================================
// Dev network
// =============================================================================

/// Chunks in the demo feed.
pub const DEFAULT_DEV_CHUNKS: u64 = 8;

/// Encoder/hoster pairs in the demo amendment.
pub const DEFAULT_DEV_HOSTERS: usize = 2;
