//! Random-access reader: index descent, `read`/`seek` (§4.4).

use std::io::SeekFrom;

use bytes::{Bytes, BytesMut};
use glfs_store::Getter;

use crate::engine::Engine;
use crate::error::{GlfsError, Result};
use crate::index::IndexBlock;
use crate::ref_::Ref;
use crate::root::Root;

/// Reads a [`Root`] at arbitrary offsets, decrypting only the leaves it
/// actually needs. Cheap to construct; holds no open handles of its own.
pub struct Reader {
    engine: Engine,
    root: Root,
    offset: u64,
}

impl Reader {
    pub fn new(engine: Engine, root: Root) -> Self {
        Self {
            engine,
            root,
            offset: 0,
        }
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    /// Descend `level` index layers to the leaf ref holding `block_index`,
    /// at each layer selecting `block_index / bf^(level-1)` and recursing
    /// on `block_index % bf^(level-1)` (§4.4 step 3). Implemented
    /// iteratively: each layer strictly reduces `level`, so no recursion
    /// (and no future-boxing) is needed.
    async fn get_piece(
        &self,
        store: &impl Getter,
        bf: u64,
        mut level: u32,
        mut block_index: u64,
    ) -> Result<Ref> {
        let mut current = self.root.r#ref;
        while level > 0 {
            let data = self.engine.get(store, &current).await?;
            let idx = IndexBlock::from_bytes(self.root.block_size, &data);
            let divisor = bf.pow(level - 1);
            let slot = (block_index / divisor) as usize;
            let cid = current.cid;
            current = idx
                .get(slot)
                .ok_or_else(|| GlfsError::InvalidTree(format!("missing index slot {slot} in {cid}")))?;
            block_index %= divisor;
            level -= 1;
        }
        Ok(current)
    }

    /// `ReadAt` (§4.4): fills as much of `buf` as the target leaf holds
    /// starting at `offset`'s within-leaf remainder, never spanning two
    /// leaves in a single call. Returns `(n, eof)`, `eof` true iff
    /// `offset + n == root.size`.
    pub async fn read_at(&self, store: &impl Getter, offset: u64, buf: &mut [u8]) -> Result<(usize, bool)> {
        if offset >= self.root.size || buf.is_empty() {
            return Ok((0, offset >= self.root.size));
        }
        let level = self.root.depth();
        let bf = self.root.branching_factor();
        let block_size = self.root.block_size;
        let block_index = offset / block_size;
        let rel_offset = (offset % block_size) as usize;

        let leaf_ref = self.get_piece(store, bf, level, block_index).await?;
        let leaf = self.engine.get(store, &leaf_ref).await?;
        if rel_offset > leaf.len() {
            return Err(GlfsError::InvalidTree(format!(
                "leaf {} is {} bytes, offset into it is {}",
                leaf_ref.cid,
                leaf.len(),
                rel_offset
            )));
        }
        let available = &leaf[rel_offset..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        let eof = offset + n as u64 == self.root.size;
        Ok((n, eof))
    }

    /// `Read`: `read_at` driven by an internal cursor.
    pub async fn read(&mut self, store: &impl Getter, buf: &mut [u8]) -> Result<usize> {
        let (n, _eof) = self.read_at(store, self.offset, buf).await?;
        self.offset += n as u64;
        Ok(n)
    }

    /// `Seek`: start/current/end, `End` resolved as ordinary POSIX
    /// `size + offset` (see DESIGN.md, Open Question — the original Go
    /// source subtracts instead of adds).
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let new_offset: i64 = match pos {
            SeekFrom::Start(o) => o as i64,
            SeekFrom::Current(o) => self.offset as i64 + o,
            SeekFrom::End(o) => self.root.size as i64 + o,
        };
        if new_offset < 0 {
            return Err(GlfsError::BadConfiguration(format!(
                "seek would move offset negative: {new_offset}"
            )));
        }
        self.offset = new_offset as u64;
        Ok(self.offset)
    }

    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Drain the whole blob into a single buffer, advancing the cursor to
    /// the end. Convenience for small objects (tree serialisations, small
    /// blobs); large blobs should prefer repeated `read`/`read_at` calls.
    pub async fn read_all(&mut self, store: &impl Getter) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(self.root.size.saturating_sub(self.offset) as usize);
        let chunk_len = self.root.block_size.min(self.root.size.max(1)) as usize;
        let mut chunk = vec![0u8; chunk_len.max(1)];
        loop {
            let n = self.read(store, &mut chunk).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bigblob::Writer;
    use glfs_store_memory::MemoryStore;

    async fn write_all(engine: &Engine, store: &MemoryStore, data: &[u8]) -> Root {
        let mut w = Writer::new(engine.clone());
        w.write(store, data).await.unwrap();
        w.finish(store).await.unwrap()
    }

    #[tokio::test]
    async fn random_access_matches_slice_at_every_offset() {
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let store = MemoryStore::new();
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 253) as u8).collect();
        let root = write_all(&engine, &store, &data).await;
        let reader = Reader::new(engine, root);

        for &offset in &[0usize, 1, 1023, 1024, 1025, 4999] {
            let mut buf = vec![0u8; 7];
            let (n, eof) = reader.read_at(&store, offset as u64, &mut buf).await.unwrap();
            let expect_len = (data.len() - offset).min(7);
            assert_eq!(n, expect_len, "offset={offset}");
            assert_eq!(&buf[..n], &data[offset..offset + n]);
            assert_eq!(eof, offset + n == data.len());
        }
    }

    #[tokio::test]
    async fn seek_end_is_additive() {
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let store = MemoryStore::new();
        let data = vec![1u8; 100];
        let root = write_all(&engine, &store, &data).await;
        let mut reader = Reader::new(engine, root);
        let pos = reader.seek(SeekFrom::End(-10)).unwrap();
        assert_eq!(pos, 90);
    }

    #[tokio::test]
    async fn seek_end_positive_moves_past_size() {
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let store = MemoryStore::new();
        let root = write_all(&engine, &store, &[1u8; 10]).await;
        let mut reader = Reader::new(engine, root);
        assert_eq!(reader.seek(SeekFrom::End(5)).unwrap(), 15);
    }

    #[tokio::test]
    async fn read_to_end_reproduces_input() {
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let store = MemoryStore::new();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 199) as u8).collect();
        let root = write_all(&engine, &store, &data).await;
        let mut reader = Reader::new(engine, root);
        let got = reader.read_all(&store).await.unwrap();
        assert_eq!(&got[..], &data[..]);
    }
}
