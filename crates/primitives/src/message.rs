//! Messages exchanged over an established link.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{ChunkIndex, ChunkProofBundle, CodecError, ContractId, FeedKey, ScopeId, Topic};

/// Postcard encoding for everything that crosses a link.
pub trait Wire: Serialize + DeserializeOwned {
    fn to_wire(&self) -> Result<Vec<u8>, CodecError> {
        postcard::to_allocvec(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

/// Control message carried beside the chunk logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// Sent by the serving side when a link opens.
    FeedKey { feed: FeedKey },
    /// Asks the peer to sign the session scope.
    ContactRequest { scope: ScopeId },
    /// Signature over the requested scope.
    ContactProof { topic: Topic, signature: Vec<u8> },
    /// Performance-challenge retrieval request.
    ChunkRequest { feed: FeedKey, index: ChunkIndex },
    /// Answer to a [`ControlMessage::ChunkRequest`]; `None` if the chunk is missing.
    ChunkResponse { index: ChunkIndex, bundle: Option<ChunkProofBundle> },
}

/// A hoster's answer to one check of a storage challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProof {
    pub contract: ContractId,
    pub bundle: ChunkProofBundle,
}

impl Wire for ControlMessage {}
impl Wire for StorageProof {}
impl Wire for ChunkProofBundle {}
impl Wire for crate::ScopedContent {}
