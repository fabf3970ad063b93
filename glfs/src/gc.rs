//! Mark-then-sweep garbage collection over a store's whole CID space
//! (§4.10).

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::StreamExt;
use glfs_store::{Cid, Deleter, Getter, Lister};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::bigblob::{traverse_blob, TraverseCallbacks};
use crate::concurrency;
use crate::engine::Engine;
use crate::error::Result;
use crate::tree::get_tree_slice;
use crate::typed::TypedRef;

/// Counts from a completed [`gc`] run (§4.10 "Result").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcResult {
    pub reachable: usize,
    pub scanned: usize,
    pub deleted: usize,
    /// CIDs the sweep tried and failed to delete. A non-empty list does not
    /// fail the run: one store error shouldn't abort collection of
    /// everything else (§4.10).
    pub delete_errors: Vec<Cid>,
}

/// Mark every CID reachable from `keep`, then delete everything in
/// `store`'s CID space that wasn't marked. An interrupted run may leave a
/// partial sweep; `Sync` against this store is unsafe until a full GC
/// completes (§4.10 "Failure semantics").
#[instrument(skip(engine, store, sem, cancel, keep), fields(roots = keep.len()))]
pub async fn gc<S>(
    engine: Engine,
    store: Arc<S>,
    sem: Arc<Semaphore>,
    cancel: CancellationToken,
    keep: Vec<TypedRef>,
) -> Result<GcResult>
where
    S: Getter + Lister + Deleter + Sync + 'static,
{
    let reachable: Arc<DashMap<Cid, ()>> = Arc::new(DashMap::new());
    mark(engine, Arc::clone(&store), sem, cancel, Arc::clone(&reachable), keep).await?;
    sweep(store.as_ref(), &reachable).await
}

#[instrument(skip(engine, store, sem, cancel, reachable, keep))]
async fn mark<S>(
    engine: Engine,
    store: Arc<S>,
    sem: Arc<Semaphore>,
    cancel: CancellationToken,
    reachable: Arc<DashMap<Cid, ()>>,
    keep: Vec<TypedRef>,
) -> Result<()>
where
    S: Getter + Sync + 'static,
{
    let tasks: Vec<_> = keep
        .into_iter()
        .map(|root| {
            let engine = engine.clone();
            let store = Arc::clone(&store);
            let sem = Arc::clone(&sem);
            let cancel = cancel.clone();
            let reachable = Arc::clone(&reachable);
            move || mark_ref(engine, store, sem, cancel, reachable, root)
        })
        .collect();
    concurrency::run_bounded(&sem, &cancel, tasks).await
}

/// Marks `node`'s own root CID plus everything its bigblob structure (and,
/// for trees, its entries) reach. Skips the whole subtree if the root CID
/// is already marked — since the graph is an immutable DAG, a previously
/// marked root was already walked in full.
fn mark_ref<S>(
    engine: Engine,
    store: Arc<S>,
    sem: Arc<Semaphore>,
    cancel: CancellationToken,
    reachable: Arc<DashMap<Cid, ()>>,
    node: TypedRef,
) -> BoxFuture<'static, Result<()>>
where
    S: Getter + Sync + 'static,
{
    Box::pin(async move {
        let root_cid = node.root.r#ref.cid;
        if reachable.insert(root_cid, ()).is_some() {
            return Ok(());
        }

        let enter_reachable = Arc::clone(&reachable);
        let callbacks = Arc::new(TraverseCallbacks {
            enter: move |cid| Ok(enter_reachable.insert(cid, ()).is_none()),
            exit: |_level, _ref| Ok(()),
        });
        traverse_blob(
            engine.clone(),
            Arc::clone(&store),
            Arc::clone(&sem),
            cancel.clone(),
            node.root,
            callbacks,
        )
        .await?;

        if node.is_tree() {
            let entries = get_tree_slice(engine.clone(), store.as_ref(), node, usize::MAX).await?;
            let tasks: Vec<_> = entries
                .into_iter()
                .map(|entry| {
                    let engine = engine.clone();
                    let store = Arc::clone(&store);
                    let sem = Arc::clone(&sem);
                    let cancel = cancel.clone();
                    let reachable = Arc::clone(&reachable);
                    move || mark_ref(engine, store, sem, cancel, reachable, entry.r#ref)
                })
                .collect();
            concurrency::run_bounded(&sem, &cancel, tasks).await?;
        }
        Ok(())
    })
}

#[instrument(skip(store, reachable), fields(reachable = reachable.len()))]
async fn sweep<S>(store: &S, reachable: &DashMap<Cid, ()>) -> Result<GcResult>
where
    S: Lister + Deleter,
{
    let mut scanned = 0usize;
    let mut deleted = 0usize;
    let mut delete_errors = Vec::new();
    let mut stream = store.list();
    while let Some(item) = stream.next().await {
        let cid = item?;
        scanned += 1;
        if !reachable.contains_key(&cid) {
            match store.delete(cid).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!(cid = %cid, error = %e, "sweep: failed to delete unreachable object");
                    delete_errors.push(cid);
                }
            }
        }
    }
    Ok(GcResult {
        reachable: reachable.len(),
        scanned,
        deleted,
        delete_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::ObjectType;
    use glfs_store_memory::MemoryStore;
    use std::collections::BTreeMap;

    async fn blob(engine: &Engine, store: &MemoryStore, data: &[u8]) -> TypedRef {
        engine.post_typed_bytes(store, ObjectType::Blob, data).await.unwrap()
    }

    #[tokio::test]
    async fn sweep_deletes_only_what_mark_did_not_reach() {
        let engine = Engine::new();
        let store = Arc::new(MemoryStore::new());
        let kept = blob(&engine, &store, b"kept").await;
        let orphan = blob(&engine, &store, b"orphan").await;
        let _ = orphan;

        let sem = Arc::new(Semaphore::new(4));
        let result = gc(engine, Arc::clone(&store), sem, CancellationToken::new(), vec![kept])
            .await
            .unwrap();

        assert_eq!(result.scanned, 2);
        assert_eq!(result.deleted, 1);
        assert_eq!(result.reachable, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn gc_keeps_every_blob_reachable_through_a_tree() {
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut map = BTreeMap::new();
        let big_data: Vec<u8> = (0..5000u32).map(|i| (i % 7) as u8).collect();
        map.insert("big.bin".to_string(), blob(&engine, &store, &big_data).await);
        map.insert("small.txt".to_string(), blob(&engine, &store, b"small").await);
        let tree = crate::tree::post_tree_map(engine.clone(), store.as_ref(), map).await.unwrap();

        let before = store.len();
        let sem = Arc::new(Semaphore::new(4));
        let result = gc(engine, Arc::clone(&store), sem, CancellationToken::new(), vec![tree])
            .await
            .unwrap();

        assert_eq!(result.deleted, 0);
        assert_eq!(store.len(), before);
    }

    #[tokio::test]
    async fn running_gc_twice_is_idempotent() {
        let engine = Engine::new();
        let store = Arc::new(MemoryStore::new());
        let kept = blob(&engine, &store, b"kept").await;

        let sem = Arc::new(Semaphore::new(4));
        let cancel = CancellationToken::new();
        gc(
            engine.clone(),
            Arc::clone(&store),
            Arc::clone(&sem),
            cancel.clone(),
            vec![kept.clone()],
        )
        .await
        .unwrap();
        let after_first = store.len();
        let result = gc(engine, Arc::clone(&store), sem, cancel, vec![kept]).await.unwrap();
        assert_eq!(result.deleted, 0);
        assert_eq!(store.len(), after_first);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_mark_phase() {
        let engine = Engine::new();
        let store = Arc::new(MemoryStore::new());
        let kept = blob(&engine, &store, b"kept").await;

        let sem = Arc::new(Semaphore::new(4));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gc(engine, store, sem, cancel, vec![kept]).await.unwrap_err();
        assert!(matches!(err, crate::error::GlfsError::Cancelled));
    }
}
