//! Proof verification for chunk proof bundles.
//!
//! [`ProofPrimitives`] is the seam to the low-level codec and crypto
//! operations. [`KeccakPrimitives`] is the default implementation: recoverable
//! secp256k1 signatures, keccak256 Merkle trees and zstd compression.
//!
//! [`ProofVerifier`] runs the ordered, fail-fast check of a bundle:
//!
//! 1. encoder signature over the encoded payload
//! 2. Merkle inclusion against the feed commitment
//! 3. decompression, scope tag, and content hash against the proof leaf
//!
//! The first failing stage is reported; later stages never run.

mod codec;
mod error;
mod merkle;
mod pipeline;
mod primitives;
mod signer;

pub use codec::{compress, encode_payload};
pub use error::{Stage, VerifyError};
pub use merkle::{MerkleTree, leaf_hash};
pub use pipeline::{ProofVerifier, Verified};
pub use primitives::{KeccakPrimitives, ProofPrimitives};
pub use signer::{PayloadSigner, SignError};

/// Result type for verification.
pub type Result<T> = std::result::Result<T, VerifyError>;
