//! Structural rewrites over a tree: path filtering, hash sharding, and
//! ref-rewriting maps (§4.9).

use std::sync::Arc;

use futures::future::BoxFuture;
use glfs_store::{Exister, Getter, Poster};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::bigblob::{Reader as BlobReader, Writer as BlobWriter};
use crate::concurrency;
use crate::engine::Engine;
use crate::error::{GlfsError, Result};
use crate::tree::{get_tree_slice, post_tree, TreeEntry};
use crate::typed::{ObjectType, TypedRef};

/// FNV-1 (not FNV-1a): multiply by the prime, then XOR in the byte. Used
/// only by [`shard_leaves`]'s bucket assignment (§4.9 "hashes the cleaned
/// path with FNV-1 32-bit").
fn fnv1_32(data: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for &byte in data {
        hash = hash.wrapping_mul(PRIME);
        hash ^= byte as u32;
    }
    hash
}

fn filter_node<'a, S, F>(
    engine: &'a Engine,
    store: &'a S,
    node: TypedRef,
    path: String,
    pred: &'a F,
) -> BoxFuture<'a, Result<Option<TypedRef>>>
where
    S: Poster + Getter + Exister + Sync,
    F: Fn(&str) -> bool + Sync,
{
    Box::pin(async move {
        if !node.is_tree() {
            return Ok(if pred(&path) { Some(node) } else { None });
        }
        let entries = get_tree_slice(engine.clone(), store, node, usize::MAX).await?;
        let mut kept = Vec::new();
        for entry in entries {
            let child_path = if path.is_empty() {
                entry.name.clone()
            } else {
                format!("{path}/{}", entry.name)
            };
            if let Some(kept_ref) = filter_node(engine, store, entry.r#ref, child_path, pred).await? {
                kept.push(TreeEntry::new(entry.name, entry.mode, kept_ref));
            }
        }
        Ok(Some(post_tree(engine.clone(), store, kept).await?))
    })
}

/// Keep only leaves whose accumulated path satisfies `pred`; rebuild every
/// subtree on the way back up. Always produces a tree, even an empty one,
/// never `null` (§4.9).
pub async fn filter_paths<S, F>(engine: Engine, store: &S, root: TypedRef, pred: F) -> Result<TypedRef>
where
    S: Poster + Getter + Exister + Sync,
    F: Fn(&str) -> bool + Sync,
{
    match filter_node(&engine, store, root, String::new(), &pred).await? {
        Some(kept) => Ok(kept),
        None => post_tree(engine, store, Vec::new()).await,
    }
}

/// Produce `n` disjoint filtered views, bucketing each leaf's cleaned path
/// by `⌊FNV1(path) / (2³²/n)⌋`, fanned out under `sem` like [`crate::bigblob::sync`]
/// and [`crate::bigblob::traverse_blob`] (§4.9, §5).
pub async fn shard_leaves<S>(
    engine: Engine,
    store: Arc<S>,
    sem: Arc<Semaphore>,
    cancel: CancellationToken,
    root: TypedRef,
    n: u32,
) -> Result<Vec<TypedRef>>
where
    S: Poster + Getter + Exister + Sync + Send + 'static,
{
    if n == 0 {
        return Err(GlfsError::BadConfiguration("shard_leaves: n must be > 0".into()));
    }
    let width = (1u64 << 32) / n as u64;
    let results: Arc<std::sync::Mutex<Vec<Option<TypedRef>>>> =
        Arc::new(std::sync::Mutex::new((0..n).map(|_| None).collect()));

    let tasks: Vec<_> = (0..n)
        .map(|bucket| {
            let engine = engine.clone();
            let store = Arc::clone(&store);
            let root = root.clone();
            let results = Arc::clone(&results);
            move || async move {
                let pred = move |path: &str| -> bool {
                    let hash = fnv1_32(path.as_bytes()) as u64;
                    let assigned = (hash / width).min((n - 1) as u64) as u32;
                    assigned == bucket
                };
                let shard = filter_paths(engine, store.as_ref(), root, pred).await?;
                results.lock().unwrap()[bucket as usize] = Some(shard);
                Ok(())
            }
        })
        .collect();
    concurrency::run_bounded(&sem, &cancel, tasks).await?;

    Ok(results
        .lock()
        .unwrap()
        .iter_mut()
        .map(|slot| slot.take().expect("every bucket task ran exactly once"))
        .collect())
}

fn map_node<'a, S, F>(engine: &'a Engine, store: &'a S, node: TypedRef, path: String, f: &'a F) -> BoxFuture<'a, Result<TypedRef>>
where
    S: Poster + Getter + Exister + Sync,
    F: Fn(&str, TypedRef) -> BoxFuture<'static, Result<TypedRef>> + Sync,
{
    Box::pin(async move {
        if !node.is_tree() {
            return f(&path, node).await;
        }
        let entries = get_tree_slice(engine.clone(), store, node, usize::MAX).await?;
        let mut mapped = Vec::with_capacity(entries.len());
        for entry in entries {
            let child_path = if path.is_empty() {
                entry.name.clone()
            } else {
                format!("{path}/{}", entry.name)
            };
            let new_ref = map_node(engine, store, entry.r#ref, child_path, f).await?;
            mapped.push(TreeEntry::new(entry.name, entry.mode, new_ref));
        }
        post_tree(engine.clone(), store, mapped).await
    })
}

/// Structural traverse rewriting every leaf ref through `f(path, ref)`,
/// leaving tree shape and non-leaf entries otherwise untouched (§4.9
/// `MapLeaves`). See [`map_blobs`] for the content-rewriting specialisation
/// (`MapBlobs`) built on top of this.
pub async fn map_leaves<S, F>(engine: Engine, store: &S, root: TypedRef, f: F) -> Result<TypedRef>
where
    S: Poster + Getter + Exister + Sync,
    F: Fn(&str, TypedRef) -> BoxFuture<'static, Result<TypedRef>> + Sync,
{
    map_node(&engine, store, root, String::new(), &f).await
}

/// Like [`map_leaves`], but a blob-typed leaf is handed to `f` as a fresh
/// `(reader, writer)` pair instead of its bare ref: the framework
/// constructs a [`BlobReader`] over the leaf's old content and a fresh
/// [`BlobWriter`], `f` streams from one into the other however it likes,
/// and the framework finishes the writer into the leaf's replacement ref.
/// Non-blob leaves (trees recursed into by `map_leaves`, and any
/// `ObjectType::Custom` leaf) pass through untouched (§4.9 `MapBlobs`,
/// original `map_blob.go`: the Go source's `BlobMapper` switches on
/// `TypeBlob` inside the `RefMapper` it hands to `MapLeaves`).
///
/// Takes `store` as an `Arc` because `f`'s returned future must be
/// `'static` (it is driven by [`map_node`]'s recursion, which does not
/// borrow from this call's stack frame); cloning the `Arc` into each leaf's
/// future is how that future gets its own handle to the store to read and
/// write through.
pub async fn map_blobs<S, F>(engine: Engine, store: Arc<S>, root: TypedRef, f: F) -> Result<TypedRef>
where
    S: Poster + Getter + Exister + Sync + Send + 'static,
    F: Fn(String, Arc<S>, BlobReader, BlobWriter) -> BoxFuture<'static, Result<BlobWriter>> + Sync + Send + 'static,
{
    let f = Arc::new(f);
    let nav_store = Arc::clone(&store);
    map_leaves(engine.clone(), nav_store.as_ref(), root, move |path, old| {
        let engine = engine.clone();
        let store = Arc::clone(&store);
        let path = path.to_string();
        let f = Arc::clone(&f);
        Box::pin(async move {
            if old.ty != ObjectType::Blob {
                return Ok(old);
            }
            let reader = BlobReader::new(engine.clone(), old.root);
            let writer = BlobWriter::new(engine.clone());
            let writer = f(path, Arc::clone(&store), reader, writer).await?;
            let new_root = writer.finish(store.as_ref()).await?;
            Ok(TypedRef::blob(new_root))
        })
    })
    .await
}

fn map_entry_at<'a, S, F>(
    engine: &'a Engine,
    store: &'a S,
    node: TypedRef,
    path: &'a str,
    f: &'a F,
) -> BoxFuture<'a, Result<TypedRef>>
where
    S: Poster + Getter + Exister + Sync,
    F: Fn(TreeEntry) -> BoxFuture<'static, Result<TreeEntry>> + Sync,
{
    Box::pin(async move {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(GlfsError::BadConfiguration("map_entry_at: empty path".into()));
        }
        if !node.is_tree() {
            return Err(GlfsError::WrongType {
                have: node.ty.clone(),
                want: crate::typed::ObjectType::Tree,
            });
        }
        let (head, tail) = trimmed.split_once('/').unwrap_or((trimmed, ""));
        let entries = get_tree_slice(engine.clone(), store, node, usize::MAX).await?;
        let mut rebuilt = Vec::with_capacity(entries.len());
        let mut found = false;
        for entry in entries {
            if entry.name == head {
                found = true;
                let updated = if tail.is_empty() {
                    f(entry).await?
                } else {
                    let sub = map_entry_at(engine, store, entry.r#ref, tail, f).await?;
                    TreeEntry::new(entry.name, entry.mode, sub)
                };
                rebuilt.push(updated);
            } else {
                rebuilt.push(entry);
            }
        }
        if !found {
            return Err(GlfsError::NoEntry(head.to_string()));
        }
        post_tree(engine.clone(), store, rebuilt).await
    })
}

/// Navigate to the entry at `path`, apply `f` to it, and rewrite every
/// containing tree on the way back up. Empty path and non-tree
/// intermediates are errors (§4.9).
pub async fn map_entry_at_root<S, F>(engine: Engine, store: &S, root: TypedRef, path: &str, f: F) -> Result<TypedRef>
where
    S: Poster + Getter + Exister + Sync,
    F: Fn(TreeEntry) -> BoxFuture<'static, Result<TreeEntry>> + Sync,
{
    map_entry_at(&engine, store, root, path, &f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use glfs_store_memory::MemoryStore;
    use std::collections::BTreeMap;

    async fn blob(engine: &Engine, store: &MemoryStore, data: &[u8]) -> TypedRef {
        engine.post_typed_bytes(store, ObjectType::Blob, data).await.unwrap()
    }

    #[tokio::test]
    async fn filter_paths_keeps_only_matching_leaves_and_still_produces_a_tree() {
        let engine = Engine::new();
        let store = MemoryStore::new();
        let mut map = BTreeMap::new();
        map.insert("keep.txt".to_string(), blob(&engine, &store, b"k").await);
        map.insert("drop.txt".to_string(), blob(&engine, &store, b"d").await);
        let root = crate::tree::post_tree_map(engine.clone(), &store, map).await.unwrap();

        let filtered = filter_paths(engine.clone(), &store, root, |p| p.starts_with("keep")).await.unwrap();
        let entries = get_tree_slice(engine, &store, filtered, usize::MAX).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "keep.txt");
    }

    #[tokio::test]
    async fn filter_paths_matching_nothing_is_an_empty_tree_not_null() {
        let engine = Engine::new();
        let store = MemoryStore::new();
        let mut map = BTreeMap::new();
        map.insert("a.txt".to_string(), blob(&engine, &store, b"a").await);
        let root = crate::tree::post_tree_map(engine.clone(), &store, map).await.unwrap();

        let filtered = filter_paths(engine.clone(), &store, root, |_| false).await.unwrap();
        assert!(filtered.is_tree());
        let entries = get_tree_slice(engine, &store, filtered, usize::MAX).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn shard_leaves_partitions_every_leaf_into_exactly_one_bucket() {
        let engine = Engine::new();
        let store = Arc::new(MemoryStore::new());
        let mut map = BTreeMap::new();
        for i in 0..20 {
            map.insert(format!("file{i}.txt"), blob(&engine, &store, format!("data{i}").as_bytes()).await);
        }
        let root = crate::tree::post_tree_map(engine.clone(), store.as_ref(), map).await.unwrap();

        let sem = Arc::new(Semaphore::new(4));
        let shards = shard_leaves(engine.clone(), Arc::clone(&store), sem, CancellationToken::new(), root, 4)
            .await
            .unwrap();
        assert_eq!(shards.len(), 4);

        let mut total = 0usize;
        for shard in shards {
            let entries = get_tree_slice(engine.clone(), store.as_ref(), shard, usize::MAX).await.unwrap();
            total += entries.len();
        }
        assert_eq!(total, 20);
    }

    #[tokio::test]
    async fn map_leaves_rewrites_every_leaf_ref() {
        let engine = Engine::new();
        let store = MemoryStore::new();
        let mut map = BTreeMap::new();
        map.insert("a.txt".to_string(), blob(&engine, &store, b"a").await);
        let root = crate::tree::post_tree_map(engine.clone(), &store, map).await.unwrap();

        let replaced = blob(&engine, &store, b"replaced").await;
        let replaced_for_closure = replaced.clone();
        let mapped = map_leaves(engine.clone(), &store, root, move |_path, _old| {
            let replaced = replaced_for_closure.clone();
            Box::pin(async move { Ok(replaced) })
        })
        .await
        .unwrap();

        let entries = get_tree_slice(engine, &store, mapped, usize::MAX).await.unwrap();
        assert_eq!(entries[0].r#ref, replaced);
    }

    #[tokio::test]
    async fn map_entry_at_rewrites_one_nested_entry() {
        let engine = Engine::new();
        let store = MemoryStore::new();
        let leaf = blob(&engine, &store, b"leaf").await;
        let mut map = BTreeMap::new();
        map.insert("dir1/file1.txt".to_string(), leaf);
        let root = crate::tree::post_tree_map(engine.clone(), &store, map).await.unwrap();

        let new_leaf = blob(&engine, &store, b"new contents").await;
        let new_leaf_for_closure = new_leaf.clone();
        let updated = map_entry_at_root(engine.clone(), &store, root, "dir1/file1.txt", move |entry| {
            let new_leaf = new_leaf_for_closure.clone();
            Box::pin(async move { Ok(TreeEntry::new(entry.name, entry.mode, new_leaf)) })
        })
        .await
        .unwrap();

        let got = crate::tree::get_at_path(&engine, &store, updated, "dir1/file1.txt").await.unwrap();
        assert_eq!(got, new_leaf);
    }

    #[tokio::test]
    async fn map_blobs_rewrites_blob_content_and_passes_trees_through() {
        let engine = Engine::new();
        let store = Arc::new(MemoryStore::new());
        let mut map = BTreeMap::new();
        map.insert("a.txt".to_string(), blob(&engine, store.as_ref(), b"hello").await);
        let root = crate::tree::post_tree_map(engine.clone(), store.as_ref(), map).await.unwrap();

        let mapped = map_blobs(engine.clone(), Arc::clone(&store), root, |_path, store, mut reader, mut writer| {
            Box::pin(async move {
                let data = reader.read_all(store.as_ref()).await?;
                let upper = data.to_ascii_uppercase();
                writer.write(store.as_ref(), &upper).await?;
                Ok(writer)
            })
        })
        .await
        .unwrap();

        let entries = get_tree_slice(engine.clone(), store.as_ref(), mapped, usize::MAX).await.unwrap();
        assert_eq!(entries.len(), 1);
        let mut reader = crate::bigblob::Reader::new(engine, entries[0].r#ref.root.clone());
        let got = reader.read_all(store.as_ref()).await.unwrap();
        assert_eq!(&got[..], b"HELLO");
    }

    #[tokio::test]
    async fn map_entry_at_empty_path_is_bad_configuration() {
        let engine = Engine::new();
        let store = MemoryStore::new();
        let root = crate::tree::post_tree_map(engine.clone(), &store, BTreeMap::new()).await.unwrap();
        let err = map_entry_at_root(engine, &store, root, "", |entry| Box::pin(async move { Ok(entry) }))
            .await
            .unwrap_err();
        assert!(matches!(err, GlfsError::BadConfiguration(_)));
    }
}
