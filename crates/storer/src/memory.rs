//! In-memory backend.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use parking_lot::RwLock;
use tether_primitives::{ChunkIndex, ChunkProofBundle, FeedKey};

use crate::{FeedStore, HostedFeed, StorageBackend, StorerError, StorerResult};

type Bundles = Arc<RwLock<BTreeMap<ChunkIndex, ChunkProofBundle>>>;

/// Backend holding everything in process memory.
///
/// Reopening a feed sees the bundles stored before, until the feed is removed.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    feeds: RwLock<HashMap<FeedKey, Bundles>>,
    keys: RwLock<Vec<HostedFeed>>,
    opens: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `open_feed` calls served.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl StorageBackend for MemoryBackend {
    fn open_feed(&self, feed: &FeedKey) -> StorerResult<Arc<dyn FeedStore>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let bundles = self.feeds.write().entry(*feed).or_default().clone();
        Ok(Arc::new(MemoryFeedStore { feed: *feed, bundles, closed: AtomicBool::new(false) }))
    }

    fn remove_feed(&self, feed: &FeedKey) -> StorerResult<()> {
        self.feeds.write().remove(feed);
        Ok(())
    }

    fn load_keys(&self) -> StorerResult<Vec<HostedFeed>> {
        Ok(self.keys.read().clone())
    }

    fn save_keys(&self, keys: &[HostedFeed]) -> StorerResult<()> {
        *self.keys.write() = keys.to_vec();
        Ok(())
    }
}

struct MemoryFeedStore {
    feed: FeedKey,
    bundles: Bundles,
    closed: AtomicBool,
}

impl MemoryFeedStore {
    fn ensure_open(&self) -> StorerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorerError::Closed(self.feed));
        }
        Ok(())
    }
}

impl FeedStore for MemoryFeedStore {
    fn feed(&self) -> FeedKey {
        self.feed
    }

    fn store_encoded(&self, bundle: &ChunkProofBundle) -> StorerResult<()> {
        self.ensure_open()?;
        self.bundles.write().insert(bundle.index, bundle.clone());
        Ok(())
    }

    fn get_storage_challenge(&self, index: ChunkIndex) -> StorerResult<ChunkProofBundle> {
        self.ensure_open()?;
        self.bundles
            .read()
            .get(&index)
            .cloned()
            .ok_or(StorerError::NotFound { feed: self.feed, index })
    }

    fn contains(&self, index: ChunkIndex) -> StorerResult<bool> {
        self.ensure_open()?;
        Ok(self.bundles.read().contains_key(&index))
    }

    fn count(&self) -> StorerResult<u64> {
        self.ensure_open()?;
        Ok(self.bundles.read().len() as u64)
    }

    fn close(&self) -> StorerResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
