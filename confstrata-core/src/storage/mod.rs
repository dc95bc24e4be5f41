//! Storage collaborators for Confstrata
//!
//! Two external services sit behind narrow capability traits: a bounded,
//! TTL-capable fast tier ([`KeyValueStore`]) and an unbounded blob tier
//! ([`BlobStore`]). [`CombinedStore`] composes them as a two-level cache.

pub mod blob_store;
pub mod combined;
pub mod factory;
pub mod memory;
pub mod redis_store;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub use blob_store::{BlobKvStore, ObjectBlobStore};
pub use combined::{CombinedStore, PersistPolicy, persist_all};
pub use factory::{S3Settings, StoreBuilder};
pub use memory::MemoryKvStore;
pub use redis_store::RedisKvStore;

/// Expiry for a fast-tier write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Wire value `-1`: keep until explicitly deleted.
    Never,
    Seconds(u64),
}

impl Ttl {
    pub fn as_wire(&self) -> i64 {
        match self {
            Ttl::Never => -1,
            Ttl::Seconds(seconds) => i64::try_from(*seconds).unwrap_or(i64::MAX),
        }
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: &str, ttl: Ttl) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Option<Bytes>>;

    async fn write(&self, path: &str, content: &str) -> Result<()>;

    /// Returns the paths that were actually removed.
    async fn delete(&self, path: &str) -> Result<Vec<String>>;
}
