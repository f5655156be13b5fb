//! Feed → storage handle registry.

use std::{collections::HashMap, sync::Arc};

use parking_lot::{Mutex, RwLock};
use tether_primitives::FeedKey;
use tether_session::KeyedSerializer;
use tracing::{debug, warn};

use crate::{FeedStore, HostedFeed, StorageBackend, StorerError, StorerResult};

/// Shared map from feed to its open store.
///
/// Loads of the same feed are serialized so concurrent sessions for one feed
/// initialize its store once and share the handle. Reads of an already loaded
/// handle take no per-key lock.
pub struct StorageRegistry {
    backend: Arc<dyn StorageBackend>,
    feeds: RwLock<HashMap<FeedKey, Arc<dyn FeedStore>>>,
    loads: KeyedSerializer<FeedKey>,
    keys: Mutex<()>,
}

impl std::fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRegistry").field("feeds", &self.feeds.read().len()).finish()
    }
}

impl StorageRegistry {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            feeds: RwLock::new(HashMap::new()),
            loads: KeyedSerializer::new(),
            keys: Mutex::new(()),
        }
    }

    /// Returns the store for `feed`, opening it on first use.
    pub async fn load(&self, feed: FeedKey) -> StorerResult<Arc<dyn FeedStore>> {
        if let Some(store) = self.get(&feed) {
            return Ok(store);
        }

        self.loads
            .run(feed, || async {
                // An earlier queued load may have finished while we waited.
                if let Some(store) = self.get(&feed) {
                    return Ok(store);
                }
                let store = self.backend.open_feed(&feed)?;
                self.feeds.write().insert(feed, store.clone());
                debug!(feed = %feed.short(), "feed store opened");
                Ok(store)
            })
            .await
    }

    /// Returns the store for `feed` if it is loaded.
    pub fn get(&self, feed: &FeedKey) -> Option<Arc<dyn FeedStore>> {
        self.feeds.read().get(feed).cloned()
    }

    /// Returns the store for a feed this node hosts, failing with
    /// `UnknownFeed` if the feed is neither loaded nor recorded.
    pub async fn hosted(&self, feed: FeedKey) -> StorerResult<Arc<dyn FeedStore>> {
        if let Some(store) = self.get(&feed) {
            return Ok(store);
        }
        if self.list_keys()?.iter().any(|hosted| hosted.feed == feed) {
            return self.load(feed).await;
        }
        Err(StorerError::UnknownFeed(feed))
    }

    /// Records `hosted` in the hosted-key record, replacing an older entry.
    pub fn add_key(&self, hosted: HostedFeed) -> StorerResult<()> {
        let _guard = self.keys.lock();
        let mut keys = self.backend.load_keys()?;
        keys.retain(|existing| existing.feed != hosted.feed);
        keys.push(hosted);
        self.backend.save_keys(&keys)
    }

    /// Removes `feed` from the hosted-key record.
    pub fn remove_key(&self, feed: &FeedKey) -> StorerResult<bool> {
        let _guard = self.keys.lock();
        let mut keys = self.backend.load_keys()?;
        let before = keys.len();
        keys.retain(|existing| &existing.feed != feed);
        if keys.len() == before {
            return Ok(false);
        }
        self.backend.save_keys(&keys)?;
        Ok(true)
    }

    pub fn list_keys(&self) -> StorerResult<Vec<HostedFeed>> {
        self.backend.load_keys()
    }

    /// Reopens every feed in the hosted-key record.
    pub async fn restore(&self) -> StorerResult<usize> {
        let keys = self.list_keys()?;
        for hosted in &keys {
            self.load(hosted.feed).await?;
        }
        debug!(feeds = keys.len(), "restored hosted feeds");
        Ok(keys.len())
    }

    /// Stops hosting `feed`: closes its store, deletes its data and forgets
    /// its key.
    pub async fn remove_feed(&self, feed: FeedKey) -> StorerResult<()> {
        self.loads
            .run(feed, || async {
                let store = self.feeds.write().remove(&feed);
                if let Some(store) = store {
                    store.close()?;
                }
                self.backend.remove_feed(&feed)?;
                self.remove_key(&feed)?;
                debug!(feed = %feed.short(), "feed removed");
                Ok(())
            })
            .await
    }

    /// Closes every loaded store.
    pub fn close(&self) {
        let stores: Vec<_> = self.feeds.write().drain().collect();
        for (feed, store) in stores {
            if let Err(e) = store.close() {
                warn!(feed = %feed.short(), error = %e, "failed to close feed store");
            }
        }
    }
}
