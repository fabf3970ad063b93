//! Right-biased, associative, non-commutative layer merge (§4.8 `Merge`).

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use glfs_store::{Exister, Getter, Poster};

use crate::engine::Engine;
use crate::error::{GlfsError, Result};
use crate::tree::{get_tree_slice, post_tree, TreeEntry};
use crate::typed::TypedRef;

/// `Merge(layers)`: later layers take precedence. A blob at any position
/// (not only the last) discards every entry accumulated before it —
/// matching the fold a literal `Merge(Merge(a, b), c)…` recursion would
/// produce, since a blob fully masks everything beneath it. A trailing
/// blob short-circuits without even building the entry map.
pub fn merge<'a, S>(engine: &'a Engine, store: &'a S, layers: Vec<TypedRef>) -> BoxFuture<'a, Result<TypedRef>>
where
    S: Poster + Getter + Exister + Sync,
{
    Box::pin(async move {
        if layers.is_empty() {
            return Err(GlfsError::BadConfiguration("merge of 0 layers".into()));
        }
        if layers.len() == 1 {
            return Ok(layers.into_iter().next().expect("len == 1"));
        }
        if !layers.last().expect("len > 1").is_tree() {
            return Ok(layers.into_iter().next_back().expect("len > 1"));
        }

        let mut by_name: BTreeMap<String, Vec<TreeEntry>> = BTreeMap::new();
        for layer in &layers {
            if layer.is_tree() {
                let entries = get_tree_slice(engine.clone(), store, layer.clone(), usize::MAX).await?;
                for entry in entries {
                    by_name.entry(entry.name.clone()).or_default().push(entry);
                }
            } else {
                by_name.clear();
            }
        }

        let mut root_entries = Vec::with_capacity(by_name.len());
        for (name, entries) in by_name {
            let mode = entries.last().expect("non-empty by construction").mode;
            let sub_layers: Vec<TypedRef> = entries.into_iter().map(|e| e.r#ref).collect();
            let merged_ref = merge(engine, store, sub_layers).await?;
            root_entries.push(TreeEntry::new(name, mode, merged_ref));
        }
        post_tree(engine.clone(), store, root_entries).await
    })
}
