//! DFS over a blob's internal index tree with bounded-parallel fan-out
//! (§4.5 `Traverse`).
//!
//! `store` is taken as an `Arc` rather than a borrow: children are spawned
//! onto the runtime via [`crate::concurrency::run_bounded`], which requires
//! `'static` futures, so callers share ownership of the store across the
//! whole traversal instead of threading a borrow through `tokio::spawn`.

use std::sync::Arc;

use futures::future::BoxFuture;
use glfs_store::{Cid, Getter};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::concurrency;
use crate::engine::Engine;
use crate::error::{GlfsError, Result};
use crate::index::IndexBlock;
use crate::ref_::Ref;
use crate::root::Root;

/// `enter` decides whether to recurse into a node (returning `false` skips
/// it and its subtree); `exit` fires post-order, after every child has been
/// visited, given the node's fan-out `level` (0 = raw leaf) and its `Ref`.
pub struct TraverseCallbacks<E, X>
where
    E: Fn(Cid) -> Result<bool> + Send + Sync,
    X: Fn(u32, Ref) -> Result<()> + Send + Sync,
{
    pub enter: E,
    pub exit: X,
}

/// DFS over `root`'s index tree, `enter`/`exit` firing as documented on
/// [`TraverseCallbacks`]. Children of an index node are visited with
/// bounded parallelism gated by `sem` (§5).
#[instrument(skip(engine, store, sem, cancel, callbacks), fields(cid = %root.r#ref.cid, depth = root.depth()))]
pub async fn traverse<G, E, X>(
    engine: Engine,
    store: Arc<G>,
    sem: Arc<Semaphore>,
    cancel: CancellationToken,
    root: Root,
    callbacks: Arc<TraverseCallbacks<E, X>>,
) -> Result<()>
where
    G: Getter + Sync + 'static,
    E: Fn(Cid) -> Result<bool> + Send + Sync + 'static,
    X: Fn(u32, Ref) -> Result<()> + Send + Sync + 'static,
{
    let level = root.depth();
    traverse_node(engine, store, sem, cancel, root.block_size, level, root.r#ref, callbacks).await
}

#[allow(clippy::too_many_arguments)]
fn traverse_node<G, E, X>(
    engine: Engine,
    store: Arc<G>,
    sem: Arc<Semaphore>,
    cancel: CancellationToken,
    block_size: u64,
    level: u32,
    node: Ref,
    callbacks: Arc<TraverseCallbacks<E, X>>,
) -> BoxFuture<'static, Result<()>>
where
    G: Getter + Sync + 'static,
    E: Fn(Cid) -> Result<bool> + Send + Sync + 'static,
    X: Fn(u32, Ref) -> Result<()> + Send + Sync + 'static,
{
    Box::pin(async move {
        if cancel.is_cancelled() {
            return Err(GlfsError::Cancelled);
        }
        if !(callbacks.enter)(node.cid)? {
            return Ok(());
        }
        if level > 0 {
            let data = engine.get(store.as_ref(), &node).await?;
            let idx = IndexBlock::from_bytes(block_size, &data);
            let children: Vec<Ref> = idx.iter().collect();
            let tasks: Vec<_> = children
                .into_iter()
                .map(|child| {
                    let engine = engine.clone();
                    let store = Arc::clone(&store);
                    let sem = Arc::clone(&sem);
                    let cancel = cancel.clone();
                    let callbacks = Arc::clone(&callbacks);
                    move || traverse_node(engine, store, sem, cancel, block_size, level - 1, child, callbacks)
                })
                .collect();
            concurrency::run_bounded(&sem, &cancel, tasks).await?;
        }
        (callbacks.exit)(level, node)
    })
}
