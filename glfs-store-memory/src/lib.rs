//! An in-memory, process-local [`glfs_store::Store`] implementation.
//!
//! Intended for tests, examples, and doctests — not for production use
//! (nothing here is persisted).

use bytes::Bytes;
use dashmap::DashMap;
use futures::stream;
use glfs_store::{Cid, CidStream, Deleter, Exister, Getter, Lister, Poster, StoreError, StoreResult};

/// Default cap on posted blob size: large enough that tests never need to
/// think about it, small enough to catch a writer that forgot to chunk.
pub const DEFAULT_MAX_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Debug)]
pub struct MemoryStore {
    blobs: DashMap<Cid, Bytes>,
    max_size: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            blobs: DashMap::new(),
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    pub fn with_max_size(max_size: u64) -> Self {
        Self {
            blobs: DashMap::new(),
            max_size,
        }
    }

    /// Number of distinct blobs currently stored. Handy for assertions like
    /// S1's "store contains exactly 4 blobs".
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Getter for MemoryStore {
    async fn get(&self, cid: Cid) -> StoreResult<Bytes> {
        self.blobs
            .get(&cid)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(cid))
    }
}

#[async_trait::async_trait]
impl Poster for MemoryStore {
    async fn post(&self, bytes: Bytes) -> StoreResult<Cid> {
        if bytes.len() as u64 > self.max_size {
            return Err(StoreError::TooLarge {
                len: bytes.len() as u64,
                max_size: self.max_size,
            });
        }
        let cid = self.hash(&bytes);
        self.blobs.entry(cid).or_insert(bytes);
        Ok(cid)
    }

    fn max_size(&self) -> u64 {
        self.max_size
    }

    fn hash(&self, bytes: &[u8]) -> Cid {
        Cid::new(bytes)
    }
}

#[async_trait::async_trait]
impl Exister for MemoryStore {
    async fn exists(&self, cid: Cid) -> StoreResult<bool> {
        Ok(self.blobs.contains_key(&cid))
    }
}

#[async_trait::async_trait]
impl Deleter for MemoryStore {
    async fn delete(&self, cid: Cid) -> StoreResult<()> {
        self.blobs.remove(&cid).ok_or(StoreError::NotFound(cid))?;
        Ok(())
    }
}

impl Lister for MemoryStore {
    fn list(&self) -> CidStream<'_> {
        let cids: Vec<StoreResult<Cid>> = self.blobs.iter().map(|e| Ok(*e.key())).collect();
        Box::pin(stream::iter(cids))
    }
}
