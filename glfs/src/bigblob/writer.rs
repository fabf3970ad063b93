//! Streaming writer: buffer until `block_size`, post ciphertext, build the
//! fan-out index bottom-up (§4.3).

use glfs_store::Poster;

use crate::engine::Engine;
use crate::error::Result;
use crate::index::IndexBlock;
use crate::ref_::Ref;
use crate::root::Root;

struct Level {
    block: IndexBlock,
    count: usize,
}

impl Level {
    fn new(block_size: u64) -> Self {
        Self {
            block: IndexBlock::new(block_size),
            count: 0,
        }
    }
}

/// Accepts bytes in arbitrary-sized chunks and returns a [`Root`] on
/// [`Writer::finish`]. One writer instance is single-use: construct, call
/// [`Writer::write`] any number of times, call `finish` exactly once.
pub struct Writer {
    engine: Engine,
    buf: Vec<u8>,
    levels: Vec<Level>,
    size: u64,
    any_leaf_posted: bool,
}

impl Writer {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            buf: Vec::new(),
            levels: Vec::new(),
            size: 0,
            any_leaf_posted: false,
        }
    }

    pub fn block_size(&self) -> u64 {
        self.engine.block_size()
    }

    /// Buffer `data`, flushing full `block_size` leaves to `store` as they
    /// accumulate.
    pub async fn write(&mut self, store: &impl Poster, mut data: &[u8]) -> Result<()> {
        let block_size = self.block_size() as usize;
        while !data.is_empty() {
            let room = block_size - self.buf.len();
            let take = room.min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            self.size += take as u64;
            if self.buf.len() == block_size {
                self.flush_leaf(store).await?;
            }
        }
        Ok(())
    }

    async fn flush_leaf(&mut self, store: &impl Poster) -> Result<()> {
        let leaf_ref = self.engine.post_raw(store, &self.buf).await?;
        self.buf.clear();
        self.any_leaf_posted = true;
        self.push_ref(store, leaf_ref, 0).await
    }

    /// Push `r#ref` into `levels[level]`, cascading a full block upward as
    /// many times as needed.
    async fn push_ref(&mut self, store: &impl Poster, mut r#ref: Ref, mut level: usize) -> Result<()> {
        let block_size = self.block_size();
        loop {
            if level == self.levels.len() {
                self.levels.push(Level::new(block_size));
            }
            let bf = self.levels[level].block.branching_factor();
            let lvl = &mut self.levels[level];
            lvl.block.set(lvl.count, &r#ref);
            lvl.count += 1;
            if lvl.count == bf {
                let bytes = lvl.block.as_bytes();
                let carry = self.engine.post_index(store, &bytes).await?;
                self.levels[level].block.clear();
                self.levels[level].count = 0;
                r#ref = carry;
                level += 1;
                continue;
            }
            break;
        }
        Ok(())
    }

    /// Flush any residual buffer and fold the level stack into a single
    /// [`Root`] (§4.3 "Finish protocol").
    pub async fn finish(mut self, store: &impl Poster) -> Result<Root> {
        if !self.buf.is_empty() || !self.any_leaf_posted {
            self.flush_leaf(store).await?;
        }

        let mut carry: Option<Ref> = None;
        let top = self.levels.len() - 1;
        for (i, lvl) in self.levels.iter_mut().enumerate() {
            if let Some(child) = carry.take() {
                lvl.block.set(lvl.count, &child);
                lvl.count += 1;
            }
            let is_top = i == top;
            if is_top {
                carry = Some(if lvl.count == 0 {
                    // Only reachable if a writer is finished having never
                    // flushed a leaf, which `any_leaf_posted` above
                    // prevents; kept as a defensive fallback that still
                    // upholds invariant 5 (depth-0 roots carry a raw leaf).
                    self.engine.post_raw(store, &[]).await?
                } else if lvl.count == 1 {
                    lvl.block.get(0).expect("count == 1 implies slot 0 is set")
                } else {
                    let bytes = lvl.block.as_bytes();
                    self.engine.post_index(store, &bytes).await?
                });
            } else if lvl.count > 0 {
                let bytes = lvl.block.as_bytes();
                carry = Some(self.engine.post_index(store, &bytes).await?);
            }
        }

        let r#ref = carry.expect("topmost level always produces a ref");
        Ok(Root::new(r#ref, self.size, self.block_size()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bigblob::Reader;
    use glfs_store_memory::MemoryStore;

    async fn write_all(engine: &Engine, store: &MemoryStore, data: &[u8]) -> Root {
        let mut w = Writer::new(engine.clone());
        w.write(store, data).await.unwrap();
        w.finish(store).await.unwrap()
    }

    #[tokio::test]
    async fn empty_blob_has_depth_zero() {
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let store = MemoryStore::new();
        let root = write_all(&engine, &store, b"").await;
        assert_eq!(root.size, 0);
        assert_eq!(root.depth(), 0);
    }

    #[tokio::test]
    async fn single_short_leaf_returns_bare_ref_no_wrapping_index() {
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let store = MemoryStore::new();
        let root = write_all(&engine, &store, b"short").await;
        assert_eq!(root.depth(), 0);
        // depth 0: the one blob in the store is the raw leaf itself.
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn scenario_s1_2049_bytes_block_1024() {
        // S1: blockSize=1024, write 2*1024+1 deterministic bytes.
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let store = MemoryStore::new();
        let data: Vec<u8> = (0..2049u32).map(|i| (i % 251) as u8).collect();
        let root = write_all(&engine, &store, &data).await;
        assert_eq!(root.size, 2049);
        assert_eq!(root.depth(), 1);
        assert_eq!(store.len(), 4); // 3 leaves + 1 index

        let mut reader = Reader::new(engine, root);
        let got = reader.read_all(&store).await.unwrap();
        assert_eq!(&got[..], &data[..]);
    }

    #[tokio::test]
    async fn exact_multiple_of_branching_factor_unwraps_one_layer() {
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let store = MemoryStore::new();
        // 16 leaves of 1024 bytes: level0 fills exactly once and cascades,
        // leaving a single top-level index with one entry, unwrapped.
        let data = vec![7u8; 16 * 1024];
        let root = write_all(&engine, &store, &data).await;
        assert_eq!(root.depth(), 1);
        let mut reader = Reader::new(engine, root);
        assert_eq!(reader.read_all(&store).await.unwrap().len(), data.len());
    }
}
