//! Structural compare: same-type blobs/trees compared, mismatched types or
//! refs reported whole (§4.8 `Compare`).

use futures::future::BoxFuture;
use glfs_store::{Exister, Getter, Poster};

use crate::engine::Engine;
use crate::error::Result;
use crate::tree::{get_tree_slice, post_tree, TreeEntry};
use crate::typed::TypedRef;

/// The result of a [`compare`]: each bucket is `Some(tree-or-blob)` only
/// if non-empty (§4.8, §6.2 "Diff{leftOnly?, rightOnly?, both?}").
#[derive(Debug, Clone)]
pub struct Diff {
    pub left_only: Option<TypedRef>,
    pub right_only: Option<TypedRef>,
    pub both: Option<TypedRef>,
}

/// Compare `left` and `right`, which must both resolve against `store`.
/// Different dynamic types put the whole ref on its respective side.
/// Equal blobs land in `both`; unequal blobs split left/right. Trees are
/// compared by set-diff on entry name, recursing on names shared by both
/// sides (§4.8).
pub fn compare<'a, S>(engine: &'a Engine, store: &'a S, left: TypedRef, right: TypedRef) -> BoxFuture<'a, Result<Diff>>
where
    S: Poster + Getter + Exister + Sync,
{
    Box::pin(async move {
        if left.ty != right.ty {
            return Ok(Diff {
                left_only: Some(left),
                right_only: Some(right),
                both: None,
            });
        }
        if !left.is_tree() {
            return Ok(if left == right {
                Diff {
                    left_only: None,
                    right_only: None,
                    both: Some(left),
                }
            } else {
                Diff {
                    left_only: Some(left),
                    right_only: Some(right),
                    both: None,
                }
            });
        }
        compare_trees(engine, store, left, right).await
    })
}

async fn compare_trees<S>(engine: &Engine, store: &S, left: TypedRef, right: TypedRef) -> Result<Diff>
where
    S: Poster + Getter + Exister + Sync,
{
    let left_entries = get_tree_slice(engine.clone(), store, left, usize::MAX).await?;
    let right_entries = get_tree_slice(engine.clone(), store, right, usize::MAX).await?;

    let right_by_name: std::collections::BTreeMap<&str, &TreeEntry> =
        right_entries.iter().map(|e| (e.name.as_str(), e)).collect();
    let left_by_name: std::collections::BTreeMap<&str, &TreeEntry> =
        left_entries.iter().map(|e| (e.name.as_str(), e)).collect();

    let mut only_left = Vec::new();
    let mut only_right = Vec::new();
    let mut both = Vec::new();

    for l_ent in &left_entries {
        match right_by_name.get(l_ent.name.as_str()) {
            None => only_left.push(l_ent.clone()),
            Some(r_ent) => {
                let sub = compare(engine, store, l_ent.r#ref.clone(), (*r_ent).r#ref.clone()).await?;
                if let Some(lo) = sub.left_only {
                    only_left.push(TreeEntry::new(l_ent.name.clone(), l_ent.mode, lo));
                }
                if let Some(ro) = sub.right_only {
                    only_right.push(TreeEntry::new(l_ent.name.clone(), r_ent.mode, ro));
                }
                if let Some(b) = sub.both {
                    both.push(TreeEntry::new(l_ent.name.clone(), l_ent.mode, b));
                }
            }
        }
    }
    for r_ent in &right_entries {
        if !left_by_name.contains_key(r_ent.name.as_str()) {
            only_right.push(r_ent.clone());
        }
    }

    let left_only = post_bucket(engine, store, only_left).await?;
    let right_only = post_bucket(engine, store, only_right).await?;
    let both = post_bucket(engine, store, both).await?;
    Ok(Diff {
        left_only,
        right_only,
        both,
    })
}

async fn post_bucket<S>(engine: &Engine, store: &S, entries: Vec<TreeEntry>) -> Result<Option<TypedRef>>
where
    S: Poster + Exister + Sync,
{
    if entries.is_empty() {
        return Ok(None);
    }
    Ok(Some(post_tree(engine.clone(), store, entries).await?))
}
