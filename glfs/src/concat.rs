//! Associative pairwise combine: blob streams concatenate byte-for-byte,
//! trees union by name with recursive concat on collisions (§4.8 `Concat`).

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use glfs_store::{Exister, Getter, Poster};

use crate::bigblob::{Reader as BlobReader, Writer as BlobWriter};
use crate::engine::Engine;
use crate::error::{GlfsError, Result};
use crate::tree::{get_tree_slice, post_tree, TreeEntry};
use crate::typed::TypedRef;

/// `Concat(layers)`: left-folds `layers` pairwise through [`concat2`].
/// Concat is associative, so a left fold produces the same result as the
/// original source's balanced split-recursion with less bookkeeping.
pub async fn concat<S>(engine: Engine, store: &S, layers: Vec<TypedRef>) -> Result<TypedRef>
where
    S: Poster + Getter + Exister + Sync,
{
    let mut iter = layers.into_iter();
    let mut acc = iter
        .next()
        .ok_or_else(|| GlfsError::BadConfiguration("concat of 0 refs".into()))?;
    for next in iter {
        acc = concat2(engine.clone(), store, acc, next).await?;
    }
    Ok(acc)
}

fn concat2<'a, S>(engine: Engine, store: &'a S, left: TypedRef, right: TypedRef) -> BoxFuture<'a, Result<TypedRef>>
where
    S: Poster + Getter + Exister + Sync,
{
    Box::pin(async move {
        match (left.is_tree(), right.is_tree()) {
            (false, false) => concat_blobs(engine, store, left, right).await,
            (true, true) => concat_trees(engine, store, left, right).await,
            _ => Err(GlfsError::TypeMismatch {
                op: "concat",
                left: left.ty,
                right: right.ty,
            }),
        }
    })
}

/// Reads `left` then `right` through [`BlobReader`] in `block_size`
/// chunks, writing each chunk straight into a fresh [`BlobWriter`] —
/// equivalent to the spec's "multi-reader feeding a fresh writer" without
/// holding either source blob fully in memory.
async fn concat_blobs<S>(engine: Engine, store: &S, left: TypedRef, right: TypedRef) -> Result<TypedRef>
where
    S: Poster + Getter + Sync,
{
    let mut writer = BlobWriter::new(engine.clone());
    let chunk_size = writer.block_size().max(1) as usize;
    let mut buf = vec![0u8; chunk_size];
    for typed in [left, right] {
        let mut reader = BlobReader::new(engine.clone(), typed.root);
        loop {
            let n = reader.read(store, &mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write(store, &buf[..n]).await?;
        }
    }
    let root = writer.finish(store).await?;
    Ok(TypedRef::blob(root))
}

/// Union of entries by name; a name present on both sides recurses
/// through [`concat2`] rather than taking either side whole. Reads both
/// operands through `get_tree_slice` independently (resolves the spec's
/// Open Question: unlike the original source, `right` is never read into
/// the `left` binding).
async fn concat_trees<S>(engine: Engine, store: &S, left: TypedRef, right: TypedRef) -> Result<TypedRef>
where
    S: Poster + Getter + Exister + Sync,
{
    let left_entries = get_tree_slice(engine.clone(), store, left, usize::MAX).await?;
    let right_entries = get_tree_slice(engine.clone(), store, right, usize::MAX).await?;

    let mut merged: BTreeMap<String, TreeEntry> = left_entries.into_iter().map(|e| (e.name.clone(), e)).collect();
    for r_entry in right_entries {
        match merged.remove(&r_entry.name) {
            Some(l_entry) => {
                let combined = concat2(engine.clone(), store, l_entry.r#ref, r_entry.r#ref).await?;
                merged.insert(r_entry.name.clone(), TreeEntry::new(r_entry.name, r_entry.mode, combined));
            }
            None => {
                merged.insert(r_entry.name.clone(), r_entry);
            }
        }
    }
    let entries: Vec<TreeEntry> = merged.into_values().collect();
    post_tree(engine, store, entries).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::ObjectType;
    use glfs_store_memory::MemoryStore;

    async fn blob(engine: &Engine, store: &MemoryStore, data: &[u8]) -> TypedRef {
        engine.post_typed_bytes(store, ObjectType::Blob, data).await.unwrap()
    }

    #[tokio::test]
    async fn single_layer_passes_through() {
        let engine = Engine::new();
        let store = MemoryStore::new();
        let a = blob(&engine, &store, b"only").await;
        let got = concat(engine, &store, vec![a.clone()]).await.unwrap();
        assert_eq!(got, a);
    }

    #[tokio::test]
    async fn blob_concat_preserves_byte_order() {
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let store = MemoryStore::new();
        let a: Vec<u8> = (0..2000u32).map(|i| (i % 97) as u8).collect();
        let b: Vec<u8> = (0..3000u32).map(|i| (i % 89) as u8).collect();
        let ra = blob(&engine, &store, &a).await;
        let rb = blob(&engine, &store, &b).await;

        let combined = concat(engine.clone(), &store, vec![ra, rb]).await.unwrap();
        assert_eq!(combined.root.size, (a.len() + b.len()) as u64);

        let mut reader = crate::bigblob::Reader::new(engine, combined.root);
        let got = reader.read_all(&store).await.unwrap();
        let mut expect = a;
        expect.extend_from_slice(&b);
        assert_eq!(&got[..], &expect[..]);
    }

    #[tokio::test]
    async fn tree_concat_unions_and_recurses_on_collisions() {
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let store = MemoryStore::new();
        let left_only = blob(&engine, &store, b"left-only").await;
        let right_only = blob(&engine, &store, b"right-only").await;
        let shared_left: Vec<u8> = vec![1u8; 100];
        let shared_right: Vec<u8> = vec![2u8; 200];
        let shared_l_ref = blob(&engine, &store, &shared_left).await;
        let shared_r_ref = blob(&engine, &store, &shared_right).await;

        let mut left_map = std::collections::BTreeMap::new();
        left_map.insert("left.txt".to_string(), left_only);
        left_map.insert("shared.bin".to_string(), shared_l_ref);
        let left = crate::tree::post_tree_map(engine.clone(), &store, left_map).await.unwrap();

        let mut right_map = std::collections::BTreeMap::new();
        right_map.insert("right.txt".to_string(), right_only);
        right_map.insert("shared.bin".to_string(), shared_r_ref);
        let right = crate::tree::post_tree_map(engine.clone(), &store, right_map).await.unwrap();

        let combined = concat(engine.clone(), &store, vec![left, right]).await.unwrap();
        let entries = get_tree_slice(engine.clone(), &store, combined, usize::MAX).await.unwrap();
        assert_eq!(entries.len(), 3);
        let shared = entries.iter().find(|e| e.name == "shared.bin").unwrap();
        assert_eq!(shared.r#ref.root.size, (shared_left.len() + shared_right.len()) as u64);
    }

    #[tokio::test]
    async fn mixed_types_is_a_type_mismatch() {
        let engine = Engine::new();
        let store = MemoryStore::new();
        let b = blob(&engine, &store, b"x").await;
        let mut map = std::collections::BTreeMap::new();
        map.insert("a".to_string(), blob(&engine, &store, b"y").await);
        let t = crate::tree::post_tree_map(engine.clone(), &store, map).await.unwrap();
        let err = concat(engine, &store, vec![b, t]).await.unwrap_err();
        assert!(matches!(err, GlfsError::TypeMismatch { .. }));
    }
}
