//! Core primitive types for the tether protocol engine.
//!
//! This crate holds the vocabulary shared by every other crate: peer and feed
//! keys, ledger identifiers, chunk ranges, rendezvous topics, and the proof
//! bundle that travels between encoders, attesters and hosters.
//!
//! # Types
//!
//! ## Keys
//! - [`PeerKey`] - 32-byte transport key of a peer
//! - [`FeedKey`] - 32-byte public key identifying a feed
//! - [`SignerAddress`] - signing identity (secp256k1 address)
//!
//! ## Rendezvous
//! - [`Topic`], [`SessionId`], [`derive_topic`] - one channel per pair per session
//!
//! ## Data
//! - [`ChunkRange`] - inclusive range of chunk indices
//! - [`ChunkProofBundle`], [`FeedProof`], [`ScopeId`] - unit of exchanged data
//! - [`ControlMessage`], [`StorageProof`] - messages carried over a link

mod bundle;
mod error;
mod ids;
mod keys;
mod message;
mod range;
mod topic;

pub use bundle::{ChunkProofBundle, FeedProof, ScopeId, ScopedContent};
pub use error::{CodecError, KeyError, RangeError, TopicError};
pub use ids::{AmendmentId, ChallengeId, ContractId, EventId, FeedId, PlanId, UserId};
pub use keys::{FeedKey, PeerKey, SignerAddress};
pub use message::{ControlMessage, StorageProof, Wire};
pub use range::{ChunkRange, ranges_count};
pub use topic::{SessionId, SessionKind, Topic, derive_topic};

/// Index of a chunk within a feed.
pub type ChunkIndex = u64;
