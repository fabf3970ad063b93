//! The read-only configuration + cache object every GLFS operation is a
//! method of (§5, SPEC_FULL.md §8.2).

use std::sync::Arc;
use std::sync::Mutex;

use bytes::Bytes;
use glfs_store::{Cid, Getter, Poster};
use lru::LruCache;
use tracing::{debug, instrument, trace};

use crate::error::{GlfsError, Result};
use crate::ref_::{self, Ref};
use crate::root::DEFAULT_BLOCK_SIZE;
use crate::typed::{ObjectType, TypedRef};
use crate::root::Root;

/// Minimum allowed block size: large enough that an index block can hold
/// at least two refs (otherwise fan-out degenerates to a linked list).
pub const MIN_BLOCK_SIZE: u64 = 2 * crate::ref_::REF_SIZE as u64;

pub const DEFAULT_CACHE_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug)]
struct Salts {
    master: [u8; 32],
    raw: [u8; 32],
    index: [u8; 32],
}

impl Salts {
    fn derive(master: [u8; 32]) -> Self {
        let mut raw = [0u8; 32];
        ref_::derive_key(&mut raw, &master, b"raw");
        let mut index = [0u8; 32];
        ref_::derive_key(&mut index, &master, b"index");
        Salts { master, raw, index }
    }
}

struct Inner {
    salts: Salts,
    block_size: u64,
    cache: Mutex<LruCache<[u8; 32], Bytes>>,
}

/// Configuration (salt, block size, cache capacity) plus the shared
/// plaintext LRU. Cheap to clone (an `Arc` around immutable config and a
/// shared cache); safe to share across concurrent callers (§5).
#[derive(Clone)]
pub struct Engine(Arc<Inner>);

pub struct EngineBuilder {
    salt: [u8; 32],
    block_size: u64,
    cache_capacity: usize,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            salt: [0u8; 32],
            block_size: DEFAULT_BLOCK_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl EngineBuilder {
    pub fn salt(mut self, salt: [u8; 32]) -> Self {
        self.salt = salt;
        self
    }

    pub fn block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    pub fn build(self) -> Result<Engine> {
        if self.block_size < MIN_BLOCK_SIZE {
            return Err(GlfsError::BadConfiguration(format!(
                "block_size {} is below the minimum of {}",
                self.block_size, MIN_BLOCK_SIZE
            )));
        }
        let capacity = std::num::NonZeroUsize::new(self.cache_capacity.max(1)).unwrap();
        Ok(Engine(Arc::new(Inner {
            salts: Salts::derive(self.salt),
            block_size: self.block_size,
            cache: Mutex::new(LruCache::new(capacity)),
        })))
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// An engine with default salt (`[0u8; 32]`, **not** appropriate for
    /// production deduplication across untrusted parties — see
    /// SPEC_FULL.md §8.2), default block size, and default cache capacity.
    pub fn new() -> Engine {
        EngineBuilder::default().build().expect("defaults are always valid")
    }

    pub fn block_size(&self) -> u64 {
        self.0.block_size
    }

    pub(crate) fn raw_salt(&self) -> &[u8; 32] {
        &self.0.salts.raw
    }

    pub(crate) fn index_salt(&self) -> &[u8; 32] {
        &self.0.salts.index
    }

    /// Derive a fresh per-role salt from the engine's master salt, for
    /// typed-object keyspace separation beyond raw/index (e.g. per-type
    /// salts for custom object types).
    pub fn derive_salt(&self, role: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        ref_::derive_key(&mut out, &self.0.salts.master, role);
        out
    }

    /// Convergently encrypt and post `plaintext` under `salt`.
    #[instrument(skip(self, store, salt, plaintext), fields(len = plaintext.len()))]
    pub async fn post(&self, store: &impl Poster, salt: &[u8; 32], plaintext: &[u8]) -> Result<Ref> {
        let (ciphertext, dek) = ref_::encrypt(salt, plaintext);
        let cid = store.post(Bytes::from(ciphertext)).await?;
        trace!(cid = %cid, len = plaintext.len(), "posted object");
        Ok(Ref { cid, dek })
    }

    pub async fn post_raw(&self, store: &impl Poster, plaintext: &[u8]) -> Result<Ref> {
        let salt = self.0.salts.raw;
        self.post(store, &salt, plaintext).await
    }

    pub async fn post_index(&self, store: &impl Poster, plaintext: &[u8]) -> Result<Ref> {
        let salt = self.0.salts.index;
        self.post(store, &salt, plaintext).await
    }

    /// Fetch and decrypt the plaintext a [`Ref`] points to, consulting and
    /// populating the shared LRU (§4.1 `get`).
    #[instrument(skip(self, store, r#ref), fields(cid = %r#ref.cid))]
    pub async fn get(&self, store: &impl Getter, r#ref: &Ref) -> Result<Bytes> {
        let key = r#ref.cache_key();
        if let Some(hit) = self.0.cache.lock().unwrap().get(&key).cloned() {
            trace!(cid = %r#ref.cid, "cache hit");
            return Ok(hit);
        }
        let mut ciphertext = store
            .get(r#ref.cid)
            .await
            .map_err(|e| GlfsError::from_store(r#ref.cid, e))?
            .to_vec();
        let actual = store.hash(&ciphertext);
        if actual != r#ref.cid {
            return Err(GlfsError::HashMismatch(r#ref.cid));
        }
        ref_::decrypt(&r#ref.dek, &mut ciphertext);
        let plaintext = Bytes::from(ciphertext);
        self.0.cache.lock().unwrap().put(key, plaintext.clone());
        debug!(cid = %r#ref.cid, len = plaintext.len(), "fetched and decrypted");
        Ok(plaintext)
    }

    /// Post a complete, already-materialised buffer as a typed single-leaf
    /// blob (`depth == 0`). Convenience used by tree/merge/concat code that
    /// already has the whole plaintext in memory (small blobs, tree
    /// serialisations).
    pub async fn post_typed_bytes(
        &self,
        store: &impl Poster,
        ty: ObjectType,
        plaintext: &[u8],
    ) -> Result<TypedRef> {
        let r#ref = self.post_raw(store, plaintext).await?;
        Ok(TypedRef::new(
            ty,
            Root::new(r#ref, plaintext.len() as u64, self.block_size()),
        ))
    }

    pub async fn get_typed_bytes(&self, store: &impl Getter, typed: &TypedRef) -> Result<Bytes> {
        if typed.root.depth() != 0 {
            // Multi-level bigblob: defer to the reader, which knows how to
            // descend the index. Kept here as a convenience wrapper so
            // callers of small typed objects (trees, tiny blobs) don't need
            // to construct a full `bigblob::Reader` themselves.
            let mut reader = crate::bigblob::Reader::new(self.clone(), typed.root);
            return reader.read_all(store).await;
        }
        self.get(store, &typed.root.r#ref).await
    }

    pub fn dek_size() -> usize {
        crate::ref_::DEK_SIZE
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("block_size", &self.0.block_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glfs_store_memory::MemoryStore;

    #[tokio::test]
    async fn post_then_get_round_trips() {
        let engine = Engine::new();
        let store = MemoryStore::new();
        let r#ref = engine.post_raw(&store, b"hello engine").await.unwrap();
        let got = engine.get(&store, &r#ref).await.unwrap();
        assert_eq!(&got[..], b"hello engine");
    }

    #[tokio::test]
    async fn block_size_too_small_is_rejected() {
        let err = Engine::builder().block_size(10).build().unwrap_err();
        assert!(matches!(err, GlfsError::BadConfiguration(_)));
    }

    #[tokio::test]
    async fn cache_serves_repeat_gets_without_extra_verification() {
        let engine = Engine::new();
        let store = MemoryStore::new();
        let r#ref = engine.post_raw(&store, b"cached").await.unwrap();
        let first = engine.get(&store, &r#ref).await.unwrap();
        let second = engine.get(&store, &r#ref).await.unwrap();
        assert_eq!(first, second);
    }
}
