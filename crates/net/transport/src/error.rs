use tether_primitives::{ChunkIndex, CodecError, PeerKey, Topic};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The remote side of the link went away.
    #[error("link to {0} closed")]
    Closed(PeerKey),

    /// A log position was written twice.
    #[error("log position {0} already written")]
    Occupied(ChunkIndex),

    /// The transport has already joined this topic.
    #[error("already joined topic {0}")]
    AlreadyJoined(Topic),

    /// A control message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

pub type TransportResult<T> = Result<T, TransportError>;
