//! Session primitive errors.

use std::fmt;

use tether_primitives::{ChunkIndex, Topic};

/// Errors from the rendezvous relay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// A second producer arrived for an index.
    #[error("double fill at index {0}")]
    DoubleFill(ChunkIndex),

    /// A second consumer arrived for an index.
    #[error("double consume at index {0}")]
    DoubleConsume(ChunkIndex),

    /// Index is not part of the session's range set.
    #[error("index {0} is not expected in this session")]
    UnexpectedIndex(ChunkIndex),

    /// The waiting consumer went away before delivery.
    #[error("consumer for index {0} dropped before delivery")]
    ConsumerGone(ChunkIndex),

    /// The relay was dropped while a consumer was waiting.
    #[error("relay closed while waiting for index {0}")]
    Closed(ChunkIndex),
}

/// One of the two inputs of a completion join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    DataComplete,
    ContactProof,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DataComplete => "data-complete",
            Self::ContactProof => "contact-proof",
        })
    }
}

/// Errors from completion joins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    /// A signal landed twice.
    #[error("duplicate {0} signal")]
    DuplicateSignal(Signal),

    /// A multi-join received a signal for a participant it does not track.
    #[error("signal for unknown participant")]
    UnknownParticipant,

    /// The join was dropped without firing.
    #[error("join abandoned before firing")]
    Abandoned,
}

/// Errors from a cancellation scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The scope deadline elapsed.
    #[error("session timed out")]
    TimedOut,

    /// The scope was cancelled explicitly.
    #[error("session cancelled")]
    Cancelled,

    /// The session already completed.
    #[error("session already completed")]
    Completed,
}

/// Errors from the session manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// A live session already owns the topic.
    #[error("session already open for topic {0}")]
    AlreadyOpen(Topic),

    /// The manager is draining and accepts no new sessions.
    #[error("session manager closed")]
    Closed,
}
