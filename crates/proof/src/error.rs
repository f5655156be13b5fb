//! Verification errors.

use alloy_primitives::Address;
use strum::Display;
use tether_primitives::{ChunkIndex, CodecError, ScopeId};

/// Pipeline stage a rejection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    Signature,
    MerkleProof,
    Content,
}

/// Reasons a bundle is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Signature bytes are not a valid recoverable signature.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// Signature recovers to a different signer.
    #[error("signer mismatch: expected {expected}, recovered {recovered}")]
    SignerMismatch { expected: Address, recovered: Address },

    /// Proof index differs from the bundle index.
    #[error("proof index {proof} does not match chunk index {chunk}")]
    IndexMismatch { proof: ChunkIndex, chunk: ChunkIndex },

    /// Proof path does not hash to the feed commitment.
    #[error("merkle proof for index {0} does not reach the feed commitment")]
    MerkleRoot(ChunkIndex),

    /// Payload could not be decompressed.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// Decompressed payload is not valid scoped content.
    #[error("malformed payload: {0}")]
    Malformed(#[from] CodecError),

    /// Payload was produced for another session.
    #[error("scope mismatch: expected {expected}, found {found}")]
    ScopeMismatch { expected: ScopeId, found: ScopeId },

    /// Content hash differs from the proof leaf.
    #[error("content hash does not match proof leaf for index {0}")]
    BlockHash(ChunkIndex),
}

impl VerifyError {
    /// Stage of the pipeline that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::MalformedSignature(_) | Self::SignerMismatch { .. } => Stage::Signature,
            Self::IndexMismatch { .. } | Self::MerkleRoot(_) => Stage::MerkleProof,
            Self::Decompress(_)
            | Self::Malformed(_)
            | Self::ScopeMismatch { .. }
            | Self::BlockHash(_) => Stage::Content,
        }
    }
}
