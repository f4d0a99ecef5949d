//! Closure engine and store path uploader.
//!
//! Pushing happens in two phases. The first phase expands the
//! reflexive-transitive closure of the requested roots and asks the
//! cache which members it already holds. The second phase walks the
//! closure bottom-up and uploads every missing path, with the ordering
//! guarantee the cache depends on: a path is only uploaded after all
//! of its references have finished uploading.
//!
//! Reference lookups are memoized in a [`PathTree`] that is persisted
//! across invocations (see [`barge::path_cache`]). One mutex guards
//! the tree together with the upload bookkeeping; critical sections
//! only touch maps, and all subprocess and HTTP work happens outside
//! the lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use futures::future::{try_join_all, BoxFuture, Shared};
use futures::stream::{self, StreamExt, TryStreamExt};
use futures::FutureExt;
use tokio::sync::Semaphore;

use crate::api::CacheClient;
use barge::nix_store::{NixStore, StorePath};
use barge::path_cache::{PathSet, PathTree};

/// The outcome of one path's upload, shareable between awaiting parents.
type SendResult = Result<(), SharedError>;
type SendFuture = Shared<BoxFuture<'static, SendResult>>;

/// Access to everything the engine needs from the outside world.
///
/// The seam exists so the ordering logic can be exercised against an
/// in-memory graph in the tests.
pub trait PushTarget: Send + Sync + 'static {
    /// Lists the immediate references of a path.
    fn direct_references<'a>(&'a self, path: &'a StorePath) -> BoxFuture<'a, Result<PathSet>>;

    /// Uploads one path.
    fn upload<'a>(&'a self, path: &'a StorePath) -> BoxFuture<'a, Result<()>>;
}

/// The real target: the local store and the remote cache.
pub struct CachePushTarget {
    pub store: Arc<NixStore>,
    pub api: CacheClient,
}

impl PushTarget for CachePushTarget {
    fn direct_references<'a>(&'a self, path: &'a StorePath) -> BoxFuture<'a, Result<PathSet>> {
        async move { Ok(self.store.query_references(path).await?) }.boxed()
    }

    fn upload<'a>(&'a self, path: &'a StorePath) -> BoxFuture<'a, Result<()>> {
        async move {
            let archive = self.store.export(path).await?;
            self.api.upload(path, archive).await
        }
        .boxed()
    }
}

/// The first phase's verdict on a closure.
#[derive(Debug)]
pub struct PushPlan {
    /// The full closure of the roots.
    pub closure: PathSet,

    /// Paths the cache reported missing.
    pub missing: PathSet,

    /// Paths the cache already holds.
    pub present: PathSet,
}

/// Shared state of one invocation.
struct State {
    /// Immediate references of every path seen so far.
    path_tree: PathTree,

    /// Upload state of every path handed to `send_closure`.
    ///
    /// A parent awaiting a reference awaits the reference's entry
    /// here, whether or not it was the one to start it. Entries are
    /// never removed.
    sends: HashMap<StorePath, SendFuture>,
}

/// A handle to expand closures and push store paths to a cache.
///
/// Cloning is cheap and clones share all state.
pub struct Pusher<T: PushTarget> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: PushTarget> {
    target: T,
    state: Mutex<State>,

    /// Bounds concurrent subprocess and HTTP work.
    permits: Semaphore,

    /// Fan-out for closure expansion.
    fan_out: usize,
}

impl<T: PushTarget> Clone for Pusher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: PushTarget> Pusher<T> {
    /// Creates a pusher, seeding the reference tree with previously
    /// cached entries.
    pub fn new(target: T, path_tree: PathTree, jobs: usize) -> Self {
        let jobs = jobs.max(1);

        Self {
            inner: Arc::new(Inner {
                target,
                state: Mutex::new(State {
                    path_tree,
                    sends: HashMap::new(),
                }),
                permits: Semaphore::new(jobs),
                fan_out: jobs,
            }),
        }
    }

    /// Returns the immediate references of a path, memoized.
    ///
    /// Two tasks may miss the tree at the same time and query the
    /// store twice; the answers are identical, so whichever insert
    /// runs second is a no-op.
    pub async fn get_refs(&self, path: &StorePath) -> Result<PathSet> {
        if let Some(references) = self.inner.state.lock().unwrap().path_tree.get(path) {
            return Ok(references.clone());
        }

        let mut references = {
            let _permit = self.inner.permits.acquire().await.unwrap();
            self.inner
                .target
                .direct_references(path)
                .await
                .with_context(|| {
                    format!("Failed to query references of {}", path.abbreviate())
                })?
        };

        // A path referencing itself would make the closure walk spin.
        references.remove(path);

        let mut state = self.inner.state.lock().unwrap();
        state
            .path_tree
            .entry(path.clone())
            .or_insert_with(|| references.clone());

        Ok(references)
    }

    /// Computes the reflexive-transitive closure of a set of roots.
    pub async fn closure(&self, roots: &[StorePath]) -> Result<PathSet> {
        let mut seen: PathSet = roots.iter().cloned().collect();
        let mut frontier: Vec<StorePath> = seen.iter().cloned().collect();

        while !frontier.is_empty() {
            let results: Vec<PathSet> = stream::iter(frontier.drain(..))
                .map(|path| async move { self.get_refs(&path).await })
                .buffer_unordered(self.inner.fan_out)
                .try_collect()
                .await?;

            for references in results {
                for reference in references {
                    if seen.insert(reference.clone()) {
                        frontier.push(reference);
                    }
                }
            }
        }

        Ok(seen)
    }

    /// Records paths as already uploaded, so `send_closure` skips them.
    pub fn mark_sent(&self, paths: impl IntoIterator<Item = StorePath>) {
        let mut state = self.inner.state.lock().unwrap();
        for path in paths {
            state
                .sends
                .entry(path)
                .or_insert_with(|| futures::future::ready(Ok(())).boxed().shared());
        }
    }

    /// Uploads the closures of all roots, references first.
    pub async fn send_all(&self, roots: &[StorePath]) -> Result<()> {
        let sends: Vec<SendFuture> = roots
            .iter()
            .map(|root| self.send_closure(root.clone()))
            .collect();

        try_join_all(sends).await.map_err(|e| e.to_anyhow())?;
        Ok(())
    }

    /// Uploads the closure of one path.
    ///
    /// The upload of a path begins only after the uploads of all its
    /// references have completed, and each path is uploaded at most
    /// once per invocation: a second request for an in-flight path
    /// awaits the first upload instead of re-sending.
    fn send_closure(&self, path: StorePath) -> SendFuture {
        let mut state = self.inner.state.lock().unwrap();

        if let Some(send) = state.sends.get(&path) {
            return send.clone();
        }

        let this = self.clone();
        let send = {
            let path = path.clone();
            async move {
                let result = async {
                    let references = this.get_refs(&path).await?;

                    let children: Vec<SendFuture> = references
                        .iter()
                        .map(|reference| this.send_closure(reference.clone()))
                        .collect();
                    try_join_all(children).await.map_err(|e| e.to_anyhow())?;

                    let _permit = this.inner.permits.acquire().await.unwrap();
                    this.inner
                        .target
                        .upload(&path)
                        .await
                        .with_context(|| format!("Failed to upload {}", path.abbreviate()))?;

                    tracing::info!("Pushed {}", path.abbreviate());
                    Ok(())
                };

                result.await.map_err(SharedError::new)
            }
            .boxed()
            .shared()
        };

        state.sends.insert(path, send.clone());
        send
    }

    /// Returns a snapshot of the reference tree for persistence.
    pub fn path_tree(&self) -> PathTree {
        self.inner.state.lock().unwrap().path_tree.clone()
    }
}

/// Expands the closure of the roots and partitions it by upstream
/// presence.
pub async fn query_store_paths<T: PushTarget>(
    pusher: &Pusher<T>,
    api: &CacheClient,
    store: &NixStore,
    roots: &[StorePath],
) -> Result<PushPlan> {
    let closure = pusher.closure(roots).await?;

    let by_full_path: HashMap<String, StorePath> = closure
        .iter()
        .map(|path| (store.get_full_path(path).to_string(), path.clone()))
        .collect();

    let full_paths: Vec<String> = by_full_path.keys().cloned().collect();
    let presence = api.query_paths(&full_paths).await?;

    let mut missing = PathSet::new();
    let mut present = PathSet::new();
    for (full_path, path) in by_full_path {
        // Anything the cache does not positively claim is treated as
        // missing; uploading an existing path is idempotent upstream.
        if presence.get(&full_path).copied().unwrap_or(false) {
            present.insert(path);
        } else {
            missing.insert(path);
        }
    }

    Ok(PushPlan {
        closure,
        missing,
        present,
    })
}

/// An error shared between every task awaiting the same upload.
#[derive(Debug, Clone)]
pub struct SharedError(Arc<anyhow::Error>);

impl SharedError {
    fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    fn to_anyhow(&self) -> anyhow::Error {
        anyhow!("{:#}", self.0)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An in-memory reference graph standing in for the store and the
    /// cache.
    struct FakeTarget {
        graph: HashMap<StorePath, PathSet>,
        uploads: Mutex<Vec<StorePath>>,
        reference_queries: Mutex<Vec<StorePath>>,
        failing: PathSet,
    }

    fn path(name: &str) -> StorePath {
        let prefix: String = name.chars().next().unwrap().to_string().repeat(32);
        StorePath::parse(&format!("{}-{}", prefix, name)).unwrap()
    }

    impl FakeTarget {
        fn new(edges: &[(&str, &[&str])]) -> Self {
            let mut graph = HashMap::new();
            for (from, to) in edges {
                graph.insert(
                    path(from),
                    to.iter().map(|name| path(name)).collect::<PathSet>(),
                );
            }

            Self {
                graph,
                uploads: Mutex::new(Vec::new()),
                reference_queries: Mutex::new(Vec::new()),
                failing: PathSet::new(),
            }
        }

        fn failing(mut self, names: &[&str]) -> Self {
            self.failing = names.iter().map(|name| path(name)).collect();
            self
        }

        fn uploads(&self) -> Vec<StorePath> {
            self.uploads.lock().unwrap().clone()
        }

        fn reference_queries(&self) -> Vec<StorePath> {
            self.reference_queries.lock().unwrap().clone()
        }
    }

    impl PushTarget for Arc<FakeTarget> {
        fn direct_references<'a>(
            &'a self,
            path: &'a StorePath,
        ) -> BoxFuture<'a, Result<PathSet>> {
            async move {
                self.reference_queries.lock().unwrap().push(path.clone());
                Ok(self.graph.get(path).cloned().unwrap_or_default())
            }
            .boxed()
        }

        fn upload<'a>(&'a self, path: &'a StorePath) -> BoxFuture<'a, Result<()>> {
            async move {
                if self.failing.contains(path) {
                    return Err(anyhow!("upload failed"));
                }
                self.uploads.lock().unwrap().push(path.clone());
                Ok(())
            }
            .boxed()
        }
    }

    fn position(uploads: &[StorePath], name: &str) -> usize {
        let needle = path(name);
        uploads
            .iter()
            .position(|p| *p == needle)
            .unwrap_or_else(|| panic!("{} was not uploaded", name))
    }

    #[tokio::test]
    async fn test_closure() {
        let target = Arc::new(FakeTarget::new(&[
            ("a", &["b", "c"]),
            ("b", &["d"]),
            ("c", &["d"]),
            ("d", &[]),
        ]));
        let pusher = Pusher::new(target.clone(), PathTree::new(), 4);

        let closure = pusher.closure(&[path("a")]).await.unwrap();

        let expected: PathSet = ["a", "b", "c", "d"].iter().map(|n| path(n)).collect();
        assert_eq!(expected, closure);

        // Each path is expanded exactly once.
        let mut queries = target.reference_queries();
        queries.sort();
        let expected: Vec<StorePath> = expected.into_iter().collect();
        assert_eq!(expected, queries);
    }

    #[tokio::test]
    async fn test_closure_uses_preloaded_tree() {
        let target = Arc::new(FakeTarget::new(&[("b", &[])]));

        let mut tree = PathTree::new();
        tree.insert(path("a"), [path("b")].into());

        let pusher = Pusher::new(target.clone(), tree, 4);
        let closure = pusher.closure(&[path("a")]).await.unwrap();

        assert_eq!(2, closure.len());
        // "a" was answered from the tree.
        assert_eq!(vec![path("b")], target.reference_queries());
    }

    #[tokio::test]
    async fn test_self_reference_filtered() {
        let target = Arc::new(FakeTarget::new(&[("a", &["a", "b"]), ("b", &[])]));
        let pusher = Pusher::new(target.clone(), PathTree::new(), 4);

        let references = pusher.get_refs(&path("a")).await.unwrap();

        assert_eq!(PathSet::from([path("b")]), references);
        assert!(!pusher.path_tree()[&path("a")].contains(&path("a")));
    }

    #[tokio::test]
    async fn test_upload_order() {
        let target = Arc::new(FakeTarget::new(&[
            ("a", &["b", "c"]),
            ("b", &["d"]),
            ("c", &["d"]),
            ("d", &[]),
        ]));
        let pusher = Pusher::new(target.clone(), PathTree::new(), 4);

        pusher.send_all(&[path("a")]).await.unwrap();

        let uploads = target.uploads();
        assert_eq!(4, uploads.len(), "every path uploaded exactly once");

        // References complete before their referrers start.
        assert!(position(&uploads, "d") < position(&uploads, "b"));
        assert!(position(&uploads, "d") < position(&uploads, "c"));
        assert!(position(&uploads, "b") < position(&uploads, "a"));
        assert!(position(&uploads, "c") < position(&uploads, "a"));
    }

    #[tokio::test]
    async fn test_present_paths_not_resent() {
        let target = Arc::new(FakeTarget::new(&[
            ("a", &["b", "c"]),
            ("b", &["d"]),
            ("c", &["d"]),
            ("d", &[]),
        ]));
        let pusher = Pusher::new(target.clone(), PathTree::new(), 4);

        pusher.mark_sent([path("d")]);
        pusher.send_all(&[path("a")]).await.unwrap();

        let uploads = target.uploads();
        assert_eq!(3, uploads.len());
        assert!(!uploads.contains(&path("d")));
        assert!(position(&uploads, "b") < position(&uploads, "a"));
        assert!(position(&uploads, "c") < position(&uploads, "a"));
    }

    #[tokio::test]
    async fn test_upload_failure_propagates() {
        let target = Arc::new(
            FakeTarget::new(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]).failing(&["b"]),
        );
        let pusher = Pusher::new(target.clone(), PathTree::new(), 4);

        let result = pusher.send_all(&[path("a")]).await;
        assert!(result.is_err());

        let uploads = target.uploads();
        // The reference below the failure still went out; nothing
        // above it did.
        assert!(uploads.contains(&path("c")));
        assert!(!uploads.contains(&path("a")));
    }

    #[tokio::test]
    async fn test_single_job_still_completes() {
        let target = Arc::new(FakeTarget::new(&[
            ("a", &["b", "c"]),
            ("b", &[]),
            ("c", &[]),
        ]));
        let pusher = Pusher::new(target.clone(), PathTree::new(), 1);

        pusher.send_all(&[path("a")]).await.unwrap();
        assert_eq!(3, target.uploads().len());
    }
}
