//! Protocol engine settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a storage challenge does when a check fails verification.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FailurePolicy {
    /// Fail the session with `InvalidProof` and submit nothing.
    #[default]
    Abort,
    /// Submit the verified checks and list the failed ones.
    SubmitPartial,
}

/// How performance-challenge chunk indices are drawn.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum IndexSelection {
    /// Reproducible from the challenge id and the hoster key.
    #[default]
    Seeded,
    /// Local randomness.
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleConfig {
    /// Deadline of every session.
    pub session_timeout: Duration,
    pub storage_failure_policy: FailurePolicy,
    pub index_selection: IndexSelection,
    /// Processed event ids remembered for idempotent re-delivery.
    pub dedup_capacity: usize,
}

impl RoleConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);
    pub const DEFAULT_DEDUP_CAPACITY: usize = 4096;
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            session_timeout: Self::DEFAULT_TIMEOUT,
            storage_failure_policy: FailurePolicy::default(),
            index_selection: IndexSelection::default(),
            dedup_capacity: Self::DEFAULT_DEDUP_CAPACITY,
        }
    }
}
