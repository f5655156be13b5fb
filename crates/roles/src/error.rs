//! Protocol errors.

use tether_ledger::LedgerError;
use tether_net_transport::TransportError;
use tether_primitives::{
    ChunkIndex, CodecError, ContractId, FeedKey, PeerKey, SessionId, TopicError,
};
use tether_proof::{SignError, VerifyError};
use tether_session::{JoinError, LifecycleError, RelayError, ScopeError};
use tether_storer::StorerError;

/// Why a session or one of its chunks failed.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A chunk references a feed this node does not host.
    #[error("unknown feed {0}")]
    UnknownFeed(FeedKey),

    /// A bundle or proof-of-contact failed verification.
    #[error("invalid proof for chunk {index}{}: {reason}", of_contract(.contract))]
    InvalidProof { contract: Option<ContractId>, index: ChunkIndex, reason: VerifyError },

    /// A proof-of-contact does not verify against the checked party.
    #[error("invalid proof of contact: {0}")]
    InvalidContact(VerifyError),

    /// The session deadline elapsed.
    #[error("session {0} timed out")]
    SessionTimeout(SessionId),

    /// A peer sent something the protocol does not allow at this point.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The targeted peer never joined the session topic.
    #[error("peer {0} unreachable")]
    PeerUnreachable(PeerKey),

    /// The session was cancelled before it finished.
    #[error("session {0} cancelled")]
    Cancelled(SessionId),

    /// Ledger data does not describe a runnable session.
    #[error("inconsistent ledger data: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(StorerError),

    #[error(transparent)]
    Transport(TransportError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error(transparent)]
    Sign(#[from] SignError),
}

impl ProtocolError {
    /// Returns true for failures treated as a bad proof.
    pub fn is_proof_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidProof { .. } | Self::InvalidContact(_) | Self::MalformedMessage(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::SessionTimeout(_) | Self::PeerUnreachable(_))
    }

    pub(crate) fn invalid(index: ChunkIndex, reason: VerifyError) -> Self {
        Self::InvalidProof { contract: None, index, reason }
    }

    pub(crate) fn scope(session: SessionId, err: ScopeError) -> Self {
        match err {
            ScopeError::TimedOut => Self::SessionTimeout(session),
            ScopeError::Cancelled | ScopeError::Completed => Self::Cancelled(session),
        }
    }

    pub(crate) fn unexpected(expected: &str, found: &impl std::fmt::Debug) -> Self {
        Self::MalformedMessage(format!("expected {expected}, got {found:?}"))
    }
}

impl From<StorerError> for ProtocolError {
    fn from(err: StorerError) -> Self {
        match err {
            StorerError::UnknownFeed(feed) => Self::UnknownFeed(feed),
            other => Self::Storage(other),
        }
    }
}

impl From<TransportError> for ProtocolError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Codec(e) => Self::MalformedMessage(e.to_string()),
            other => Self::Transport(other),
        }
    }
}

impl From<TopicError> for ProtocolError {
    fn from(err: TopicError) -> Self {
        Self::Inconsistent(err.to_string())
    }
}

impl From<CodecError> for ProtocolError {
    fn from(err: CodecError) -> Self {
        Self::MalformedMessage(err.to_string())
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

fn of_contract(contract: &Option<ContractId>) -> String {
    contract.map(|c| format!(" of contract {c}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_classification() {
        let malformed = ProtocolError::MalformedMessage("x".into());
        assert!(malformed.is_proof_failure());
        let invalid = ProtocolError::invalid(3, VerifyError::MerkleRoot(3));
        assert!(invalid.is_proof_failure());
        assert_eq!(
            invalid.to_string(),
            "invalid proof for chunk 3: merkle proof for index 3 does not reach the feed commitment"
        );

        let session = SessionId::storage_challenge(tether_primitives::ChallengeId(1));
        assert!(ProtocolError::scope(session, ScopeError::TimedOut).is_timeout());
        assert!(!ProtocolError::scope(session, ScopeError::Cancelled).is_timeout());
    }

    #[test]
    fn test_storage_errors_map_unknown_feed() {
        let feed = FeedKey::new([1; 32]);
        assert_matches!(
            ProtocolError::from(StorerError::UnknownFeed(feed)),
            ProtocolError::UnknownFeed(f) if f == feed
        );
        assert_matches!(
            ProtocolError::from(TransportError::Codec(CodecError::Decode("eof".into()))),
            ProtocolError::MalformedMessage(_)
        );
    }
}
