//! Per-file sync status record.
//!
//! [`FileSyncStatus`] is what a decoration renderer reads: it is assembled from
//! whatever the caches hold right now and never triggers a remote call. A file
//! without a [`DiffResult`] is [`SyncState::NotCompared`], never `InSync`.

use crate::core::{
    component::{CacheKey, ComponentIdentity},
    diff_cache::DiffResult,
    error::ErrorKind,
    metadata::MetadataStatusEntry,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Not a tracked metadata file
    Unsupported,
    /// Known remotely (or not yet looked up) but no comparison has run
    NotCompared,
    InSync,
    LocalChanged,
    RemoteNewer,
    /// Content differs and no remote timestamp was available
    UnknownDirection,
    /// Absent from the org
    New,
    /// Last lookup failed transiently
    Error,
}

impl SyncState {
    pub const ALL: [SyncState; 8] = [
        SyncState::RemoteNewer,
        SyncState::LocalChanged,
        SyncState::UnknownDirection,
        SyncState::New,
        SyncState::Error,
        SyncState::NotCompared,
        SyncState::InSync,
        SyncState::Unsupported,
    ];

    /// Short marker for list output
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Unsupported => "--",
            SyncState::NotCompared => "..",
            SyncState::InSync => "=",
            SyncState::LocalChanged => "L",
            SyncState::RemoteNewer => "R",
            SyncState::UnknownDirection => "??",
            SyncState::New => "N",
            SyncState::Error => "!",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SyncState::Unsupported => "not tracked",
            SyncState::NotCompared => "not compared yet",
            SyncState::InSync => "in sync with org",
            SyncState::LocalChanged => "changed locally",
            SyncState::RemoteNewer => "newer in org",
            SyncState::UnknownDirection => "differs from org (direction unknown)",
            SyncState::New => "not in org",
            SyncState::Error => "status unavailable",
        }
    }

    /// States that need attention sort first
    pub fn sort_priority(&self) -> u8 {
        match self {
            SyncState::RemoteNewer => 0,
            SyncState::LocalChanged => 1,
            SyncState::UnknownDirection => 2,
            SyncState::New => 3,
            SyncState::Error => 4,
            SyncState::NotCompared => 5,
            SyncState::InSync => 6,
            SyncState::Unsupported => 7,
        }
    }

    pub fn from_diff(diff: &DiffResult) -> Self {
        if diff.is_new {
            SyncState::New
        } else if !diff.has_difference {
            SyncState::InSync
        } else if !diff.direction_known {
            SyncState::UnknownDirection
        } else if diff.is_remote_newer {
            SyncState::RemoteNewer
        } else {
            SyncState::LocalChanged
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSyncStatus {
    pub key: CacheKey,
    pub identity: Option<ComponentIdentity>,
    pub state: SyncState,
    pub metadata: Option<MetadataStatusEntry>,
    pub diff: Option<DiffResult>,
    pub is_compared: bool,
    /// The diff result is older than its TTL
    pub is_stale: bool,
    pub recently_modified: bool,
}

impl FileSyncStatus {
    pub fn unsupported(key: CacheKey) -> Self {
        Self {
            key,
            identity: None,
            state: SyncState::Unsupported,
            metadata: None,
            diff: None,
            is_compared: false,
            is_stale: false,
            recently_modified: false,
        }
    }

    /// Assemble the record from cache contents
    pub fn from_caches(
        key: CacheKey,
        identity: ComponentIdentity,
        metadata: Option<MetadataStatusEntry>,
        diff: Option<(DiffResult, bool)>,
        now: DateTime<Utc>,
        recent_window: Duration,
    ) -> Self {
        let recently_modified = metadata
            .as_ref()
            .and_then(|entry| entry.last_modified_at)
            .is_some_and(|at| now - at < recent_window);

        let (diff, is_stale) = match diff {
            Some((result, stale)) => (Some(result), stale),
            None => (None, false),
        };

        let state = match (&diff, metadata.as_ref().and_then(|m| m.error_kind())) {
            (Some(result), _) => SyncState::from_diff(result),
            (None, Some(ErrorKind::NotFound)) => SyncState::New,
            (None, Some(_)) => SyncState::Error,
            (None, None) => SyncState::NotCompared,
        };

        Self {
            key,
            identity: Some(identity),
            state,
            metadata,
            is_compared: diff.is_some(),
            diff,
            is_stale,
            recently_modified,
        }
    }

    pub fn last_modified_by(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.last_modified_by.as_deref())
    }
}
