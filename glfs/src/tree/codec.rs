//! JSON-lines tree serialisation: streaming [`TreeReader`]/[`TreeWriter`]
//! plus the slice-returning convenience used by smaller trees (§4.6).

use glfs_store::{Exister, Getter, Poster};

use crate::bigblob::Writer as BlobWriter;
use crate::engine::Engine;
use crate::error::{GlfsError, Result};
use crate::typed::{ObjectType, TypedRef};

use super::entry::TreeEntry;

/// Parses a tree's JSON-lines plaintext one entry at a time, enforcing
/// ascending-name order as it reads (§4.6 Invariant 3). The underlying
/// plaintext is fetched in full on the first call — GLFS trees are
/// expected to be small relative to the blobs they reference — but
/// entries are still decoded and validated lazily, one line at a time,
/// rather than collected into a `Vec<TreeEntry>` up front.
pub struct TreeReader<'s, G: Getter> {
    engine: Engine,
    store: &'s G,
    typed: TypedRef,
    buf: Option<bytes::Bytes>,
    pos: usize,
    last_name: Option<String>,
}

impl<'s, G: Getter> TreeReader<'s, G> {
    pub fn new(engine: Engine, store: &'s G, typed: TypedRef) -> Result<Self> {
        if !typed.is_tree() {
            return Err(GlfsError::WrongType {
                have: typed.ty.clone(),
                want: ObjectType::Tree,
            });
        }
        Ok(Self {
            engine,
            store,
            typed,
            buf: None,
            pos: 0,
            last_name: None,
        })
    }

    async fn ensure_buffered(&mut self) -> Result<()> {
        if self.buf.is_none() {
            let bytes = self.engine.get_typed_bytes(self.store, &self.typed).await?;
            self.buf = Some(bytes);
        }
        Ok(())
    }

    /// The next entry, or `None` at end of stream.
    pub async fn next(&mut self) -> Result<Option<TreeEntry>> {
        self.ensure_buffered().await?;
        let buf = self.buf.as_ref().expect("just buffered");
        loop {
            if self.pos >= buf.len() {
                return Ok(None);
            }
            let rest = &buf[self.pos..];
            let (line, advance) = match rest.iter().position(|&b| b == b'\n') {
                Some(i) => (&rest[..i], i + 1),
                None => (rest, rest.len()),
            };
            self.pos += advance;
            if line.is_empty() {
                continue;
            }
            let entry: TreeEntry =
                serde_json::from_slice(line).map_err(|e| GlfsError::InvalidTree(e.to_string()))?;
            entry.validate()?;
            if let Some(last) = &self.last_name
                && entry.name.as_str() <= last.as_str()
            {
                return Err(GlfsError::InvalidTree(format!(
                    "tree entries are out of order: {:?} <= {:?}",
                    entry.name, last
                )));
            }
            self.last_name = Some(entry.name.clone());
            return Ok(Some(entry));
        }
    }

    /// Collect up to `max` entries into a `Vec`. For large trees, prefer
    /// repeated [`TreeReader::next`] calls (§ Design Notes: "streaming
    /// tree reader vs slice").
    pub async fn collect(mut self, max: usize) -> Result<Vec<TreeEntry>> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.next().await? {
                Some(entry) => out.push(entry),
                None => break,
            }
        }
        Ok(out)
    }
}

/// Streams [`TreeEntry`] values out through a typed blob writer,
/// rejecting out-of-order names and unresolved targets as it goes (§4.6:
/// "referential integrity is enforced at write time, not deferred to GC").
pub struct TreeWriter<'s, S: Poster + Exister> {
    store: &'s S,
    writer: BlobWriter,
    last_name: Option<String>,
}

impl<'s, S: Poster + Exister> TreeWriter<'s, S> {
    pub fn new(engine: Engine, store: &'s S) -> Self {
        Self {
            store,
            writer: BlobWriter::new(engine),
            last_name: None,
        }
    }

    pub async fn put(&mut self, entry: TreeEntry) -> Result<()> {
        entry.validate()?;
        if let Some(last) = &self.last_name
            && entry.name.as_str() <= last.as_str()
        {
            return Err(GlfsError::InvalidTree(format!(
                "cannot write tree entries out of order: {:?} <= {:?}",
                entry.name, last
            )));
        }
        let target = entry.r#ref.root.r#ref.cid;
        if !self.store.exists(target).await? {
            return Err(GlfsError::ReferentialIntegrity(target));
        }
        let mut line = serde_json::to_vec(&entry).map_err(|e| GlfsError::InvalidTree(e.to_string()))?;
        line.push(b'\n');
        self.writer.write(self.store, &line).await?;
        self.last_name = Some(entry.name);
        Ok(())
    }

    pub async fn finish(self) -> Result<TypedRef> {
        let root = self.writer.finish(self.store).await?;
        Ok(TypedRef::tree(root))
    }
}
