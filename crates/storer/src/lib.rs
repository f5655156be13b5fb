//! Feed storage for hosters.
//!
//! - [`FeedStore`] - per-feed bundle storage keyed by chunk index
//! - [`StorageBackend`] - opens feed stores and persists the hosted-key record
//! - [`MemoryBackend`], [`RedbBackend`] - backend implementations
//! - [`StorageRegistry`] - feed → store map with serialized, idempotent loads

mod error;
mod memory;
mod redb_store;
mod registry;
mod traits;

pub use error::{StorerError, StorerResult};
pub use memory::MemoryBackend;
pub use redb_store::RedbBackend;
pub use registry::StorageRegistry;
pub use traits::{FeedStore, HostedFeed, StorageBackend};
