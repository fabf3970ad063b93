use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;

use crate::{Cid, StoreError};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A stream of CIDs, as returned by [`Lister::list`].
pub type CidStream<'a> = Pin<Box<dyn Stream<Item = StoreResult<Cid>> + Send + 'a>>;

/// Fetch bytes by content id. The returned bytes must hash (under the
/// store's own [`Poster::hash`]) to the requested `cid`; callers verify
/// this themselves rather than trusting the store (§4.1 step 2).
#[async_trait::async_trait]
pub trait Getter: Send + Sync {
    async fn get(&self, cid: Cid) -> StoreResult<Bytes>;
}

/// Write immutable, content-addressed bytes. `post` is idempotent:
/// posting identical bytes twice returns the same `Cid` both times and is
/// not required to perform a second write.
#[async_trait::async_trait]
pub trait Poster: Send + Sync {
    async fn post(&self, bytes: Bytes) -> StoreResult<Cid>;

    /// Upper bound, in bytes, on a single posted blob. `blockSize` must
    /// never exceed this (§4.3).
    fn max_size(&self) -> u64;

    /// The store's content-addressing function. Exposed so callers can
    /// verify fetched bytes without assuming BLAKE3 (§6.1).
    fn hash(&self, bytes: &[u8]) -> Cid;
}

#[async_trait::async_trait]
pub trait Exister: Send + Sync {
    async fn exists(&self, cid: Cid) -> StoreResult<bool>;
}

#[async_trait::async_trait]
pub trait Deleter: Send + Sync {
    async fn delete(&self, cid: Cid) -> StoreResult<()>;
}

pub trait Lister: Send + Sync {
    fn list(&self) -> CidStream<'_>;
}

/// The capability needed by any read-only traversal: fetch and check
/// freshness of what you already have a ref to.
pub trait GetExister: Getter + Exister {}
impl<T: Getter + Exister> GetExister for T {}

/// The capability needed by anything that writes new objects and also
/// needs to read back what it just wrote (tree/bigblob writers,
/// `TreeWriter::put`'s referential-integrity check).
pub trait GetPoster: Getter + Poster {}
impl<T: Getter + Poster> GetPoster for T {}

pub trait GetPosterExister: Getter + Poster + Exister {}
impl<T: Getter + Poster + Exister> GetPosterExister for T {}

/// Full capability set, required by garbage-collection-shaped operations
/// that must enumerate and delete unreachable blobs.
pub trait Store: Getter + Poster + Exister + Deleter + Lister + std::fmt::Debug {}
impl<T: Getter + Poster + Exister + Deleter + Lister + std::fmt::Debug> Store for T {}
