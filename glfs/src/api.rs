//! [`Glfs`]: the facade gathering every module-level operation behind one
//! handle, organised by store capability (§6.3).

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use glfs_store::{Deleter, Exister, Getter, Lister, Poster};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::bigblob::{self, Reader as BlobReader, Writer as BlobWriter};
use crate::concat as concat_mod;
use crate::concurrency;
use crate::diff::{self, Diff};
use crate::engine::Engine;
use crate::error::Result;
use crate::gc::{self, GcResult};
use crate::merge as merge_mod;
use crate::transform;
use crate::tree::{self, TreeEntry, TreeReader, TreeWriter};
use crate::typed::{ObjectType, TypedRef};

/// Thin facade over an [`Engine`]: every method takes the store it needs
/// as a parameter rather than owning one, so callers with a read-only
/// store can still use the read-only subset (§6.3 "capability-typed").
#[derive(Clone)]
pub struct Glfs {
    engine: Engine,
}

impl Glfs {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// A [`BlobWriter`] bound to this facade's engine. Call
    /// [`BlobWriter::write`] any number of times, then
    /// [`BlobWriter::finish`] once.
    pub fn new_blob_writer(&self) -> BlobWriter {
        BlobWriter::new(self.engine.clone())
    }

    pub async fn post_blob(&self, store: &impl Poster, plaintext: &[u8]) -> Result<TypedRef> {
        self.post_typed(store, ObjectType::Blob, plaintext).await
    }

    pub async fn post_typed(&self, store: &impl Poster, ty: ObjectType, plaintext: &[u8]) -> Result<TypedRef> {
        self.engine.post_typed_bytes(store, ty, plaintext).await
    }

    /// A [`BlobReader`] positioned at the start of `typed`'s root.
    pub fn get_blob(&self, typed: &TypedRef) -> BlobReader {
        BlobReader::new(self.engine.clone(), typed.root)
    }

    pub async fn get_blob_bytes(&self, store: &impl Getter, typed: &TypedRef) -> Result<bytes::Bytes> {
        self.engine.get_typed_bytes(store, typed).await
    }

    pub async fn get_typed(&self, store: &impl Getter, typed: &TypedRef) -> Result<bytes::Bytes> {
        self.get_blob_bytes(store, typed).await
    }

    pub async fn post_tree(&self, store: &(impl Poster + Exister + Sync), entries: Vec<TreeEntry>) -> Result<TypedRef> {
        tree::post_tree(self.engine.clone(), store, entries).await
    }

    pub async fn post_tree_map(
        &self,
        store: &(impl Poster + Exister + Sync),
        entries: BTreeMap<String, TypedRef>,
    ) -> Result<TypedRef> {
        tree::post_tree_map(self.engine.clone(), store, entries).await
    }

    pub async fn get_tree_slice(&self, store: &(impl Getter + Sync), root: TypedRef, max: usize) -> Result<Vec<TreeEntry>> {
        tree::get_tree_slice(self.engine.clone(), store, root, max).await
    }

    pub fn new_tree_reader<'s, G: Getter>(&self, store: &'s G, root: TypedRef) -> Result<TreeReader<'s, G>> {
        TreeReader::new(self.engine.clone(), store, root)
    }

    pub fn new_tree_writer<'s, S: Poster + Exister>(&self, store: &'s S) -> TreeWriter<'s, S> {
        TreeWriter::new(self.engine.clone(), store)
    }

    pub async fn get_at_path(&self, store: &(impl Getter + Sync), root: TypedRef, subpath: &str) -> Result<TypedRef> {
        tree::get_at_path(&self.engine, store, root, subpath).await
    }

    pub async fn walk_tree<G, F>(&self, store: &G, root: TypedRef, mut f: F) -> Result<()>
    where
        G: Getter + Sync,
        F: FnMut(&str, &TreeEntry) -> Result<()> + Send,
    {
        tree::walk_tree(&self.engine, store, root, String::new(), &mut f).await
    }

    pub async fn walk_refs<G, F>(&self, store: &G, root: TypedRef, mut f: F) -> Result<()>
    where
        G: Getter + Sync,
        F: FnMut(&TypedRef) -> Result<()> + Send,
    {
        tree::walk_refs(&self.engine, store, root, &mut f).await
    }

    /// Structural traversal combining the bigblob layer's fan-out descent
    /// with the tree layer's entry recursion (§4.5, §4.7). `enter`/`exit`
    /// fire once per bigblob node reachable from `root` (leaves, index
    /// blocks, and every tree's own blob).
    pub async fn traverse<G, E, X>(
        &self,
        store: Arc<G>,
        sem: Arc<Semaphore>,
        cancel: CancellationToken,
        root: TypedRef,
        callbacks: Arc<bigblob::TraverseCallbacks<E, X>>,
    ) -> Result<()>
    where
        G: Getter + Sync + 'static,
        E: Fn(glfs_store::Cid) -> Result<bool> + Send + Sync + 'static,
        X: Fn(u32, crate::ref_::Ref) -> Result<()> + Send + Sync + 'static,
    {
        traverse_object(self.engine.clone(), store, sem, cancel, root, callbacks).await
    }

    pub async fn sync<D, S>(
        &self,
        dst: Arc<D>,
        src: Arc<S>,
        sem: Arc<Semaphore>,
        cancel: CancellationToken,
        root: TypedRef,
    ) -> Result<()>
    where
        D: Poster + Exister + 'static,
        S: Getter + 'static,
    {
        sync_object(self.engine.clone(), dst, src, sem, cancel, root).await
    }

    pub async fn compare<S>(&self, store: &S, left: TypedRef, right: TypedRef) -> Result<Diff>
    where
        S: Poster + Getter + Exister + Sync,
    {
        diff::compare(&self.engine, store, left, right).await
    }

    pub async fn merge<S>(&self, store: &S, layers: Vec<TypedRef>) -> Result<TypedRef>
    where
        S: Poster + Getter + Exister + Sync,
    {
        merge_mod::merge(&self.engine, store, layers).await
    }

    pub async fn concat<S>(&self, store: &S, layers: Vec<TypedRef>) -> Result<TypedRef>
    where
        S: Poster + Getter + Exister + Sync,
    {
        concat_mod::concat(self.engine.clone(), store, layers).await
    }

    pub async fn filter_paths<S, F>(&self, store: &S, root: TypedRef, pred: F) -> Result<TypedRef>
    where
        S: Poster + Getter + Exister + Sync,
        F: Fn(&str) -> bool + Sync,
    {
        transform::filter_paths(self.engine.clone(), store, root, pred).await
    }

    pub async fn shard_leaves<S>(
        &self,
        store: Arc<S>,
        sem: Arc<Semaphore>,
        cancel: CancellationToken,
        root: TypedRef,
        n: u32,
    ) -> Result<Vec<TypedRef>>
    where
        S: Poster + Getter + Exister + Sync + Send + 'static,
    {
        transform::shard_leaves(self.engine.clone(), store, sem, cancel, root, n).await
    }

    pub async fn map_leaves<S, F>(&self, store: &S, root: TypedRef, f: F) -> Result<TypedRef>
    where
        S: Poster + Getter + Exister + Sync,
        F: Fn(&str, TypedRef) -> BoxFuture<'static, Result<TypedRef>> + Sync,
    {
        transform::map_leaves(self.engine.clone(), store, root, f).await
    }

    pub async fn map_entry_at<S, F>(&self, store: &S, root: TypedRef, path: &str, f: F) -> Result<TypedRef>
    where
        S: Poster + Getter + Exister + Sync,
        F: Fn(TreeEntry) -> BoxFuture<'static, Result<TreeEntry>> + Sync,
    {
        transform::map_entry_at_root(self.engine.clone(), store, root, path, f).await
    }

    pub async fn map_blobs<S, F>(&self, store: Arc<S>, root: TypedRef, f: F) -> Result<TypedRef>
    where
        S: Poster + Getter + Exister + Sync + Send + 'static,
        F: Fn(String, Arc<S>, BlobReader, BlobWriter) -> BoxFuture<'static, Result<BlobWriter>> + Sync + Send + 'static,
    {
        transform::map_blobs(self.engine.clone(), store, root, f).await
    }

    pub async fn gc<S>(
        &self,
        store: Arc<S>,
        sem: Arc<Semaphore>,
        cancel: CancellationToken,
        keep: Vec<TypedRef>,
    ) -> Result<GcResult>
    where
        S: Getter + Lister + Deleter + Sync + 'static,
    {
        gc::gc(self.engine.clone(), store, sem, cancel, keep).await
    }
}

/// Recurses across tree-entry boundaries between calls to
/// [`bigblob::traverse_blob`], so `enter`/`exit` see every bigblob node of
/// every blob and tree reachable from `root`, not just `root`'s own.
#[allow(clippy::too_many_arguments)]
fn traverse_object<G, E, X>(
    engine: Engine,
    store: Arc<G>,
    sem: Arc<Semaphore>,
    cancel: CancellationToken,
    root: TypedRef,
    callbacks: Arc<bigblob::TraverseCallbacks<E, X>>,
) -> BoxFuture<'static, Result<()>>
where
    G: Getter + Sync + 'static,
    E: Fn(glfs_store::Cid) -> Result<bool> + Send + Sync + 'static,
    X: Fn(u32, crate::ref_::Ref) -> Result<()> + Send + Sync + 'static,
{
    Box::pin(async move {
        bigblob::traverse_blob(
            engine.clone(),
            Arc::clone(&store),
            Arc::clone(&sem),
            cancel.clone(),
            root.root,
            Arc::clone(&callbacks),
        )
        .await?;
        if root.is_tree() {
            let entries = tree::get_tree_slice(engine.clone(), store.as_ref(), root, usize::MAX).await?;
            for entry in entries {
                traverse_object(
                    engine.clone(),
                    Arc::clone(&store),
                    Arc::clone(&sem),
                    cancel.clone(),
                    entry.r#ref,
                    Arc::clone(&callbacks),
                )
                .await?;
            }
        }
        Ok(())
    })
}

/// Recurses across tree-entry boundaries between calls to
/// [`bigblob::sync_blob`], fanning child entries out under `sem` the same
/// way [`crate::bigblob::sync`] fans out index children (§4.5, §4.7).
fn sync_object<D, S>(
    engine: Engine,
    dst: Arc<D>,
    src: Arc<S>,
    sem: Arc<Semaphore>,
    cancel: CancellationToken,
    root: TypedRef,
) -> BoxFuture<'static, Result<()>>
where
    D: Poster + Exister + 'static,
    S: Getter + 'static,
{
    Box::pin(async move {
        bigblob::sync_blob(
            engine.clone(),
            Arc::clone(&dst),
            Arc::clone(&src),
            Arc::clone(&sem),
            cancel.clone(),
            root.root,
        )
        .await?;
        if root.is_tree() {
            let entries = tree::get_tree_slice(engine.clone(), src.as_ref(), root, usize::MAX).await?;
            let tasks: Vec<_> = entries
                .into_iter()
                .map(|entry| {
                    let engine = engine.clone();
                    let dst = Arc::clone(&dst);
                    let src = Arc::clone(&src);
                    let sem = Arc::clone(&sem);
                    let cancel = cancel.clone();
                    move || sync_object(engine, dst, src, sem, cancel, entry.r#ref)
                })
                .collect();
            concurrency::run_bounded(&sem, &cancel, tasks).await?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glfs_store_memory::MemoryStore;

    #[tokio::test]
    async fn facade_round_trips_a_blob() {
        let glfs = Glfs::new(Engine::new());
        let store = MemoryStore::new();
        let typed = glfs.post_blob(&store, b"hello facade").await.unwrap();
        let got = glfs.get_blob_bytes(&store, &typed).await.unwrap();
        assert_eq!(&got[..], b"hello facade");
    }

    #[tokio::test]
    async fn facade_walks_and_gcs_a_small_tree() {
        let glfs = Glfs::new(Engine::new());
        let store = Arc::new(MemoryStore::new());
        let mut entries = std::collections::BTreeMap::new();
        entries.insert("a.txt".to_string(), glfs.post_blob(store.as_ref(), b"a").await.unwrap());
        let root = glfs.post_tree_map(store.as_ref(), entries).await.unwrap();

        let mut names = Vec::new();
        glfs.walk_tree(store.as_ref(), root.clone(), |_prefix, entry| {
            names.push(entry.name.clone());
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(names, vec!["a.txt"]);

        let sem = Arc::new(Semaphore::new(2));
        let result = glfs
            .gc(Arc::clone(&store), sem, CancellationToken::new(), vec![root])
            .await
            .unwrap();
        assert_eq!(result.deleted, 0);
    }
}
