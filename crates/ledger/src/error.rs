//! Ledger client errors.

use tether_primitives::PeerKey;

/// Ledger entity kinds, for lookup errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Entity {
    Amendment,
    Contract,
    Feed,
    StorageChallenge,
    PerformanceChallenge,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// No entity with this id.
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: u64 },

    /// No registered user owns this transport key.
    #[error("no user for noise key {0}")]
    UnknownNoiseKey(PeerKey),

    /// Submission was refused.
    #[error("submission rejected: {0}")]
    Rejected(String),

    /// Ledger could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    pub fn not_found(entity: Entity, id: u64) -> Self {
        Self::NotFound { entity, id }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
