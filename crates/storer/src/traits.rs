//! Storage backend traits.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tether_primitives::{ChunkIndex, ChunkProofBundle, ChunkRange, FeedKey};

use crate::StorerResult;

/// Bundle storage for one feed, keyed by chunk index.
///
/// Writers never overlap on an index under correct protocol operation, so
/// implementations need not order concurrent writes to the same index.
pub trait FeedStore: Send + Sync {
    fn feed(&self) -> FeedKey;

    /// Stores an accepted bundle at its index.
    fn store_encoded(&self, bundle: &ChunkProofBundle) -> StorerResult<()>;

    /// Returns the stored bundle for `index`, used to answer challenges.
    fn get_storage_challenge(&self, index: ChunkIndex) -> StorerResult<ChunkProofBundle>;

    fn contains(&self, index: ChunkIndex) -> StorerResult<bool>;

    /// Number of stored bundles.
    fn count(&self) -> StorerResult<u64>;

    /// Closes the store. Later reads and writes fail with `Closed`.
    fn close(&self) -> StorerResult<()>;
}

impl std::fmt::Debug for dyn FeedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedStore").field("feed", &self.feed()).finish_non_exhaustive()
    }
}

/// A hosted feed and the ranges this node keeps for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedFeed {
    pub feed: FeedKey,
    pub ranges: Vec<ChunkRange>,
}

/// Key-value persistence namespaced per feed.
pub trait StorageBackend: Send + Sync + 'static {
    /// Opens or creates the store for `feed`.
    fn open_feed(&self, feed: &FeedKey) -> StorerResult<Arc<dyn FeedStore>>;

    /// Deletes everything stored for `feed`.
    fn remove_feed(&self, feed: &FeedKey) -> StorerResult<()>;

    /// Loads the hosted-key record.
    fn load_keys(&self) -> StorerResult<Vec<HostedFeed>>;

    /// Replaces the hosted-key record.
    fn save_keys(&self, keys: &[HostedFeed]) -> StorerResult<()>;
}
