//! Session, challenge and event-handling settings for TOML persistence.

use serde::{Deserialize, Serialize};
use tether_roles::{FailurePolicy, IndexSelection, RoleConfig};

/// Session configuration (TOML-serializable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Deadline of every protocol session, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { timeout_ms: default_timeout_ms() }
    }
}

/// Ledger event handling (TOML-serializable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Processed ledger events remembered for idempotent re-delivery.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { dedup_capacity: default_dedup_capacity() }
    }
}

fn default_timeout_ms() -> u64 {
    RoleConfig::DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_dedup_capacity() -> usize {
    RoleConfig::DEFAULT_DEDUP_CAPACITY
}

/// Challenge configuration (TOML-serializable).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeConfig {
    /// `abort` or `submit-partial`.
    #[serde(default)]
    pub storage_failure_policy: FailurePolicy,

    /// `seeded` or `random`.
    #[serde(default)]
    pub index_selection: IndexSelection,
}
