//! Existence-gated, post-order structural copy between two stores (§4.5
//! `Sync`).

use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use glfs_store::{Exister, Getter, Poster};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::concurrency;
use crate::engine::Engine;
use crate::error::Result;
use crate::index::IndexBlock;
use crate::ref_::Ref;
use crate::root::Root;

/// Copy every blob reachable from `root` out of `src` into `dst`, skipping
/// the whole subtree if `dst` already has the root CID (the precondition
/// callers must preserve: the existence of a root implies the existence
/// of everything beneath it).
#[instrument(skip(engine, dst, src, sem, cancel), fields(cid = %root.r#ref.cid, depth = root.depth()))]
pub async fn sync<D, S>(
    engine: Engine,
    dst: Arc<D>,
    src: Arc<S>,
    sem: Arc<Semaphore>,
    cancel: CancellationToken,
    root: Root,
) -> Result<()>
where
    D: Poster + Exister + 'static,
    S: Getter + 'static,
{
    if dst.exists(root.r#ref.cid).await? {
        return Ok(());
    }
    sync_node(engine, dst, src, sem, cancel, root.block_size, root.depth(), root.r#ref).await
}

#[allow(clippy::too_many_arguments)]
fn sync_node<D, S>(
    engine: Engine,
    dst: Arc<D>,
    src: Arc<S>,
    sem: Arc<Semaphore>,
    cancel: CancellationToken,
    block_size: u64,
    level: u32,
    node: Ref,
) -> BoxFuture<'static, Result<()>>
where
    D: Poster + Exister + 'static,
    S: Getter + 'static,
{
    Box::pin(async move {
        if level > 0 {
            let data = engine.get(src.as_ref(), &node).await?;
            let idx = IndexBlock::from_bytes(block_size, &data);
            let children: Vec<Ref> = idx.iter().collect();
            let tasks: Vec<_> = children
                .into_iter()
                .map(|child| {
                    let engine = engine.clone();
                    let dst = Arc::clone(&dst);
                    let src = Arc::clone(&src);
                    let sem = Arc::clone(&sem);
                    let cancel = cancel.clone();
                    move || sync_node(engine, dst, src, sem, cancel, block_size, level - 1, child)
                })
                .collect();
            concurrency::run_bounded(&sem, &cancel, tasks).await?;
        }
        // Copy post-order: every child is in `dst` before the parent's own
        // ciphertext lands, so a reader observing this CID in `dst` can
        // assume every transitive dependency is already there too (§5).
        let ciphertext: Bytes = src.get(node.cid).await?;
        dst.post(ciphertext).await?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bigblob::{Reader, Writer};
    use glfs_store_memory::MemoryStore;

    #[tokio::test]
    async fn sync_copies_every_reachable_blob() {
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let src = Arc::new(MemoryStore::new());
        let mut w = Writer::new(engine.clone());
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 7) as u8).collect();
        w.write(src.as_ref(), &data).await.unwrap();
        let root = w.finish(src.as_ref()).await.unwrap();

        let dst = Arc::new(MemoryStore::new());
        let sem = Arc::new(Semaphore::new(4));
        sync(engine.clone(), Arc::clone(&dst), Arc::clone(&src), sem, CancellationToken::new(), root)
            .await
            .unwrap();

        assert_eq!(dst.len(), src.len());
        let mut reader = Reader::new(engine, root);
        let got = reader.read_all(dst.as_ref()).await.unwrap();
        assert_eq!(&got[..], &data[..]);
    }

    #[tokio::test]
    async fn second_sync_posts_nothing_new() {
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let src = Arc::new(MemoryStore::new());
        let mut w = Writer::new(engine.clone());
        w.write(src.as_ref(), &vec![1u8; 5000]).await.unwrap();
        let root = w.finish(src.as_ref()).await.unwrap();

        let dst = Arc::new(MemoryStore::new());
        let sem = Arc::new(Semaphore::new(4));
        let cancel = CancellationToken::new();
        sync(engine.clone(), Arc::clone(&dst), Arc::clone(&src), Arc::clone(&sem), cancel.clone(), root)
            .await
            .unwrap();
        let after_first = dst.len();
        sync(engine, dst.clone(), src, sem, cancel, root).await.unwrap();
        assert_eq!(dst.len(), after_first);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_sync() {
        let engine = Engine::builder().block_size(1024).build().unwrap();
        let src = Arc::new(MemoryStore::new());
        let mut w = Writer::new(engine.clone());
        w.write(src.as_ref(), &vec![2u8; 16 * 1024]).await.unwrap();
        let root = w.finish(src.as_ref()).await.unwrap();

        let dst = Arc::new(MemoryStore::new());
        let sem = Arc::new(Semaphore::new(4));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = sync(engine, dst, src, sem, cancel, root).await.unwrap_err();
        assert!(matches!(err, crate::error::GlfsError::Cancelled));
    }
}
