//! Path lookup, walking, and folding raw entries into a tree (§4.7).

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use glfs_store::{Exister, Getter, Poster};

use crate::engine::Engine;
use crate::error::{GlfsError, Result};
use crate::typed::{ObjectType, TypedRef};

use super::codec::TreeReader;
use super::entry::{clean_path, TreeEntry};

/// Fold a flat set of entries (whose names may be multi-component paths,
/// e.g. `"dir1/file1.txt"`) into a tree, bucketing by first path
/// component and recursing on the remainder (§4.7 `PostTree`). An entry
/// whose cleaned name is empty is a pass-through: `post_tree` returns that
/// entry's own ref immediately rather than building anything (matches the
/// original source's literal behavior for the "this ref itself" case).
pub fn post_tree<'a, S>(engine: Engine, store: &'a S, entries: Vec<TreeEntry>) -> BoxFuture<'a, Result<TypedRef>>
where
    S: Poster + Exister + Sync + 'a,
{
    Box::pin(async move {
        let mut root_entries: Vec<TreeEntry> = Vec::new();
        let mut subentries: BTreeMap<String, Vec<TreeEntry>> = BTreeMap::new();

        for entry in entries {
            let cleaned = clean_path(&entry.name);
            if cleaned.is_empty() {
                return Ok(entry.r#ref);
            }
            match cleaned.split_once('/') {
                None => root_entries.push(TreeEntry::new(cleaned, entry.mode, entry.r#ref)),
                Some((head, tail)) => subentries
                    .entry(head.to_string())
                    .or_default()
                    .push(TreeEntry::new(tail.to_string(), entry.mode, entry.r#ref)),
            }
        }

        for (name, sub_entries) in subentries {
            let sub_ref = post_tree(engine.clone(), store, sub_entries).await?;
            let mode = TreeEntry::default_mode_for(&sub_ref);
            root_entries.push(TreeEntry::new(name, mode, sub_ref));
        }

        root_entries.sort_by(|a, b| a.name.cmp(&b.name));
        let mut writer = super::codec::TreeWriter::new(engine, store);
        for entry in root_entries {
            writer.put(entry).await?;
        }
        writer.finish().await
    })
}

/// Convenience over [`post_tree`] for a ready-made `name -> ref` map; each
/// entry's mode defaults by the ref's own dynamic type (§4.7
/// `PostTreeMap`).
pub async fn post_tree_map<S>(engine: Engine, store: &S, entries: BTreeMap<String, TypedRef>) -> Result<TypedRef>
where
    S: Poster + Exister + Sync,
{
    let entries = entries
        .into_iter()
        .map(|(name, r#ref)| {
            let mode = TreeEntry::default_mode_for(&r#ref);
            TreeEntry::new(name, mode, r#ref)
        })
        .collect();
    post_tree(engine, store, entries).await
}

/// Strip leading/trailing `/`; empty subpath returns `ref` itself. Descends
/// one path component at a time, requiring `ref` be a tree at every step
/// that still has path left (§4.7 `GetAtPath`).
pub fn get_at_path<'a, G>(
    engine: &'a Engine,
    store: &'a G,
    r#ref: TypedRef,
    subpath: &'a str,
) -> BoxFuture<'a, Result<TypedRef>>
where
    G: Getter + Sync,
{
    Box::pin(async move {
        let trimmed = subpath.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(r#ref);
        }
        if !r#ref.is_tree() {
            return Err(GlfsError::WrongType {
                have: r#ref.ty.clone(),
                want: ObjectType::Tree,
            });
        }
        let (head, tail) = trimmed.split_once('/').unwrap_or((trimmed, ""));

        let mut reader = TreeReader::new(engine.clone(), store, r#ref)?;
        while let Some(entry) = reader.next().await? {
            match entry.name.as_str().cmp(head) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Equal => return get_at_path(engine, store, entry.r#ref, tail).await,
                std::cmp::Ordering::Greater => break,
            }
        }
        Err(GlfsError::NoEntry(head.to_string()))
    })
}

/// Materialise a tree's entries into a `Vec`, up to `max` (§4.7
/// `GetTreeSlice`). Prefer [`TreeReader`] directly for large trees.
pub async fn get_tree_slice<G>(engine: Engine, store: &G, r#ref: TypedRef, max: usize) -> Result<Vec<TreeEntry>>
where
    G: Getter + Sync,
{
    TreeReader::new(engine, store, r#ref)?.collect(max).await
}

/// DFS emitting `(prefix, entry)` in ascending-name order per level; a
/// directory's own entry fires before the walk descends into it (§4.7
/// `WalkTree`).
pub fn walk_tree<'a, G, F>(
    engine: &'a Engine,
    store: &'a G,
    r#ref: TypedRef,
    prefix: String,
    f: &'a mut F,
) -> BoxFuture<'a, Result<()>>
where
    G: Getter + Sync,
    F: FnMut(&str, &TreeEntry) -> Result<()> + Send,
{
    Box::pin(async move {
        let entries = get_tree_slice(engine.clone(), store, r#ref, usize::MAX).await?;
        for entry in entries {
            f(&prefix, &entry)?;
            if entry.r#ref.is_tree() {
                let child_prefix = if prefix.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{prefix}/{}", entry.name)
                };
                walk_tree(engine, store, entry.r#ref.clone(), child_prefix, f).await?;
            }
        }
        Ok(())
    })
}

/// Post-order over refs reachable through tree edges: every leaf ref,
/// then each subtree's own ref, finally the passed root (§4.7
/// `WalkRefs`).
pub fn walk_refs<'a, G, F>(
    engine: &'a Engine,
    store: &'a G,
    r#ref: TypedRef,
    f: &'a mut F,
) -> BoxFuture<'a, Result<()>>
where
    G: Getter + Sync,
    F: FnMut(&TypedRef) -> Result<()> + Send,
{
    Box::pin(async move {
        if r#ref.is_tree() {
            let entries = get_tree_slice(engine.clone(), store, r#ref.clone(), usize::MAX).await?;
            for entry in entries {
                walk_refs(engine, store, entry.r#ref, f).await?;
            }
        }
        f(&r#ref)
    })
}
