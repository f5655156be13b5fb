//! redb-based feed storage backend.
//!
//! One database file holds every hosted feed. Each feed gets its own table,
//! named after the feed key, mapping chunk index to the postcard-encoded
//! bundle. The hosted-key record lives in a separate table under `all_keys`.

use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use redb::{Database, ReadableTableMetadata, TableDefinition, TableError};
use tether_primitives::{ChunkIndex, ChunkProofBundle, CodecError, FeedKey, Wire};
use tracing::debug;

use crate::{FeedStore, HostedFeed, StorageBackend, StorerError, StorerResult};

/// Key: record name, value: postcard-encoded record.
const KEYS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("hoster_keys");
const ALL_KEYS: &str = "all_keys";

fn feed_table_name(feed: &FeedKey) -> String {
    format!("feed/{feed}")
}

/// redb-backed storage for every feed hosted by this node.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend").finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorerResult<Self> {
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(KEYS_TABLE)?;
        }
        write_txn.commit()?;

        debug!("Opened redb feed store");
        Ok(Self { db: Arc::new(db) })
    }
}

impl StorageBackend for RedbBackend {
    fn open_feed(&self, feed: &FeedKey) -> StorerResult<Arc<dyn FeedStore>> {
        let table = feed_table_name(feed);
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(TableDefinition::<u64, &[u8]>::new(&table))?;
        }
        write_txn.commit()?;

        Ok(Arc::new(RedbFeedStore {
            db: self.db.clone(),
            feed: *feed,
            table,
            closed: AtomicBool::new(false),
        }))
    }

    fn remove_feed(&self, feed: &FeedKey) -> StorerResult<()> {
        let table = feed_table_name(feed);
        let write_txn = self.db.begin_write()?;
        write_txn.delete_table(TableDefinition::<u64, &[u8]>::new(&table))?;
        write_txn.commit()?;
        Ok(())
    }

    fn load_keys(&self) -> StorerResult<Vec<HostedFeed>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(KEYS_TABLE)?;
        match table.get(ALL_KEYS)? {
            Some(value) => postcard::from_bytes(value.value())
                .map_err(|e| StorerError::Serialization(e.into())),
            None => Ok(Vec::new()),
        }
    }

    fn save_keys(&self, keys: &[HostedFeed]) -> StorerResult<()> {
        let bytes = postcard::to_allocvec(keys)
            .map_err(|e| StorerError::Serialization(CodecError::Encode(e.to_string())))?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(KEYS_TABLE)?;
            table.insert(ALL_KEYS, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

struct RedbFeedStore {
    db: Arc<Database>,
    feed: FeedKey,
    table: String,
    closed: AtomicBool,
}

impl RedbFeedStore {
    fn definition(&self) -> TableDefinition<'_, u64, &'static [u8]> {
        TableDefinition::new(&self.table)
    }

    fn ensure_open(&self) -> StorerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorerError::Closed(self.feed));
        }
        Ok(())
    }

    fn read(&self, index: ChunkIndex) -> StorerResult<Option<ChunkProofBundle>> {
        self.ensure_open()?;
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(self.definition()) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match table.get(index)? {
            Some(value) => Ok(Some(ChunkProofBundle::from_wire(value.value())?)),
            None => Ok(None),
        }
    }
}

impl FeedStore for RedbFeedStore {
    fn feed(&self) -> FeedKey {
        self.feed
    }

    fn store_encoded(&self, bundle: &ChunkProofBundle) -> StorerResult<()> {
        self.ensure_open()?;
        let bytes = bundle.to_wire()?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.definition())?;
            table.insert(bundle.index, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_storage_challenge(&self, index: ChunkIndex) -> StorerResult<ChunkProofBundle> {
        self.read(index)?.ok_or(StorerError::NotFound { feed: self.feed, index })
    }

    fn contains(&self, index: ChunkIndex) -> StorerResult<bool> {
        Ok(self.read(index)?.is_some())
    }

    fn count(&self) -> StorerResult<u64> {
        self.ensure_open()?;
        let read_txn = self.db.begin_read()?;
        match read_txn.open_table(self.definition()) {
            Ok(table) => Ok(table.len()?),
            Err(TableError::TableDoesNotExist(_)) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&self) -> StorerResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
