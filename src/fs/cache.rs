//! Path → node cache.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

use crate::fs::node::RemoteNode;
use crate::fs::path::is_within;

struct CacheEntry {
    node: RemoteNode,
    inserted: Instant,
}

/// Concurrent map from absolute remote path to node.
///
/// Entries live until invalidated, or until `ttl` passes when one is set.
/// Every invalidation bumps a generation, so results fetched before it can be
/// told apart and kept out of the cache.
pub(crate) struct PathCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Option<Duration>,
    generation: RwLock<u64>,
}

impl PathCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            generation: RwLock::new(0),
        }
    }

    pub fn get(&self, path: &str) -> Option<RemoteNode> {
        let ttl = {
            let entry = self.entries.get(path)?;
            match self.ttl {
                Some(ttl) if entry.inserted.elapsed() >= ttl => ttl,
                _ => return Some(entry.node.clone()),
            }
        };
        trace!(path, "cache entry expired");
        self.entries
            .remove_if(path, |_, entry| entry.inserted.elapsed() >= ttl);
        None
    }

    pub fn insert(&self, path: &str, node: RemoteNode) {
        self.entries.insert(
            path.to_string(),
            CacheEntry {
                node,
                inserted: Instant::now(),
            },
        );
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        *self.generation.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert `entries` only if nothing was invalidated since `generation`.
    ///
    /// Returns whether the entries were stored.
    pub fn insert_fresh<I>(&self, generation: u64, entries: I) -> bool
    where
        I: IntoIterator<Item = (String, RemoteNode)>,
    {
        let current = self.generation.read().unwrap_or_else(|e| e.into_inner());
        if *current != generation {
            return false;
        }
        for (path, node) in entries {
            self.insert(&path, node);
        }
        true
    }

    /// Drop `path` and everything below it. Invalidating `/` clears the cache.
    pub fn invalidate(&self, path: &str) {
        let mut generation = self.generation.write().unwrap_or_else(|e| e.into_inner());
        *generation += 1;
        self.entries.retain(|key, _| !is_within(key, path));
        trace!(path, generation = *generation, "cache invalidated");
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
