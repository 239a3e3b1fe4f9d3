//! Path resolution over the drive's id-addressed tree.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::api::DriveApi;
use crate::error::{DriveError, Result};
use crate::fs::cache::PathCache;
use crate::fs::node::RemoteNode;
use crate::fs::path::{join_path, split_path, validate_name};
use crate::fs::singleflight::SingleFlight;

/// Resolves absolute remote paths to nodes.
///
/// Folder listings are shared between concurrent resolutions of the same
/// folder and every listed child is cached under its path.
pub(crate) struct Resolver {
    api: Arc<dyn DriveApi>,
    root: RemoteNode,
    cache: PathCache,
    listings: SingleFlight<Vec<RemoteNode>>,
}

impl Resolver {
    pub fn new(api: Arc<dyn DriveApi>, root: RemoteNode, ttl: Option<Duration>) -> Self {
        Self {
            api,
            root,
            cache: PathCache::new(ttl),
            listings: SingleFlight::new(),
        }
    }

    /// Resolve a normalized absolute path.
    pub async fn resolve(&self, path: &str) -> Result<RemoteNode> {
        self.resolve_boxed(path).await
    }

    fn resolve_boxed<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<RemoteNode>> {
        async move {
            if path == "/" {
                return Ok(self.root.clone());
            }
            if let Some(node) = self.cache.get(path) {
                return Ok(node);
            }

            let (parent_path, name) = split_path(path);
            validate_name(name)?;

            let parent = self.resolve_boxed(parent_path).await?;
            if !parent.is_dir() {
                return Err(DriveError::NotFound(path.to_string()));
            }

            let children = self.list_children(parent_path, &parent).await?;
            children
                .into_iter()
                .find(|child| child.name == name)
                .ok_or_else(|| DriveError::NotFound(path.to_string()))
        }
        .boxed()
    }

    /// List a folder, caching each child under `dir_path/<name>`.
    ///
    /// Concurrent listings share one call only within a cache generation, and
    /// a listing that overlaps an invalidation is returned but not cached.
    pub async fn list_children(&self, dir_path: &str, dir: &RemoteNode) -> Result<Vec<RemoteNode>> {
        let generation = self.cache.generation();
        let key = format!("{}@{}", dir.file_id, generation);
        let api = Arc::clone(&self.api);
        let file_id = dir.file_id.clone();
        let children = self
            .listings
            .run(&key, move || {
                async move {
                    debug!(file_id = %file_id, "listing folder");
                    api.list_all(&file_id).await
                }
                .boxed()
            })
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    DriveError::NotFound(dir_path.to_string())
                } else {
                    e
                }
            })?;

        let entries = children
            .iter()
            .map(|child| (join_path(dir_path, &child.name), child.clone()));
        if !self.cache.insert_fresh(generation, entries) {
            debug!(path = dir_path, "listing overlapped a change, not cached");
        }
        Ok(children)
    }

    /// Record a node known to live at `path`.
    pub fn remember(&self, path: &str, node: RemoteNode) {
        self.cache.insert(path, node);
    }

    /// Forget `path` and everything below it.
    pub fn invalidate(&self, path: &str) {
        self.cache.invalidate(path);
    }

    #[cfg(test)]
    pub fn cached(&self, path: &str) -> Option<RemoteNode> {
        self.cache.get(path)
    }
}
