//! Chunk proof bundles.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AmendmentId, ChallengeId, ChunkIndex};

/// Session-scope string bound into every payload and proof-of-contact.
///
/// Hosting setup scopes are `"<amendment>/<position>"`; challenge scopes are
/// `"<challenge>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(String);

impl ScopeId {
    /// Scope for the pair at `position` of an amendment.
    pub fn position(amendment: AmendmentId, position: usize) -> Self {
        Self(format!("{amendment}/{position}"))
    }

    /// Scope for a storage or performance challenge.
    pub fn challenge(challenge: ChallengeId) -> Self {
        Self(challenge.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Plaintext carried inside an encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedContent {
    pub scope: ScopeId,
    pub data: Vec<u8>,
}

/// Inclusion proof of a chunk in the feed's Merkle tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedProof {
    /// Leaf position.
    pub index: ChunkIndex,
    /// `keccak256` of the raw chunk data.
    pub leaf: B256,
    /// Sibling hashes from the leaf level up to the root.
    pub siblings: Vec<B256>,
}

/// The unit exchanged between encoder, attester and hoster.
///
/// Every field is checked by the verification pipeline before the bundle is
/// stored or relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProofBundle {
    pub index: ChunkIndex,
    /// Compressed [`ScopedContent`].
    pub encoded_payload: Vec<u8>,
    /// Encoder's signature over `encoded_payload`.
    pub payload_signature: Vec<u8>,
    pub merkle_proof: FeedProof,
    /// Scope the bundle was produced for.
    pub scope: ScopeId,
}
