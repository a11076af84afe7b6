//! Diff result cache.
//!
//! Pure storage for the outcome of content comparisons, with a lifetime separate
//! from the metadata cache. Staleness is reported, not enforced: callers decide
//! whether a stale result is still good enough to display (for example while a
//! rescan is running). All keys go through [`canonical_key`], so a lookup by the
//! source file, its sidecar or any raw spelling of either finds the same entry.

use crate::core::{
    clock::{is_fresh, SharedClock},
    component::{canonical_key, CacheKey, ComponentIdentity},
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Outcome of comparing local content with the org's copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub identity: ComponentIdentity,
    pub has_difference: bool,
    /// Meaningful only when `has_difference` and `direction_known`
    pub is_remote_newer: bool,
    /// The component does not exist in the org
    pub is_new: bool,
    /// False when content differs but no remote timestamp was available
    pub direction_known: bool,
    pub compared_at: DateTime<Utc>,
}

impl DiffResult {
    pub fn in_sync(identity: ComponentIdentity, now: DateTime<Utc>) -> Self {
        Self {
            identity,
            has_difference: false,
            is_remote_newer: false,
            is_new: false,
            direction_known: true,
            compared_at: now,
        }
    }

    pub fn new_component(identity: ComponentIdentity, now: DateTime<Utc>) -> Self {
        Self {
            is_new: true,
            ..Self::in_sync(identity, now)
        }
    }

    pub fn changed(
        identity: ComponentIdentity,
        is_remote_newer: bool,
        direction_known: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            has_difference: true,
            is_remote_newer,
            direction_known,
            ..Self::in_sync(identity, now)
        }
    }
}

pub struct DiffResultCache {
    clock: SharedClock,
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, DiffResult>>,
}

impl DiffResultCache {
    pub fn new(clock: SharedClock, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, path: &Path) -> Option<DiffResult> {
        self.get_by_key(&canonical_key(path))
    }

    pub fn get_by_key(&self, key: &CacheKey) -> Option<DiffResult> {
        self.entries.read().get(key).cloned()
    }

    pub fn put(&self, path: &Path, result: DiffResult) {
        self.put_by_key(canonical_key(path), result);
    }

    pub fn put_by_key(&self, key: CacheKey, result: DiffResult) {
        self.entries.write().insert(key, result);
    }

    pub fn is_stale(&self, result: &DiffResult) -> bool {
        !is_fresh(result.compared_at, self.clock.now(), self.ttl)
    }

    pub fn invalidate(&self, path: &Path) {
        self.entries.write().remove(&canonical_key(path));
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn snapshot(&self) -> Vec<(CacheKey, DiffResult)> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
