//! Persisted cache snapshot.
//!
//! The caches live in memory, so the CLI writes what it learned to
//! `<cache dir>/sf-sync-tracker/<md5 of project root>/snapshot.json` and restores it
//! on the next invocation. Entries keep their original timestamps: a restored
//! entry older than its TTL is stale and will be refetched, but it can still be
//! shown until then.

use crate::core::{
    component::CacheKey,
    diff_cache::DiffResult,
    dirs::get_cache_directory,
    error::{Result, SyncError},
    metadata::MetadataStatusEntry,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const SNAPSHOT_FILE: &str = "snapshot.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub project_root: PathBuf,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<CacheKey, MetadataStatusEntry>,
    #[serde(default)]
    pub diffs: BTreeMap<CacheKey, DiffResult>,
}

impl CacheSnapshot {
    pub fn new(project_root: PathBuf, saved_at: DateTime<Utc>) -> Self {
        Self {
            project_root,
            saved_at,
            metadata: BTreeMap::new(),
            diffs: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.diffs.is_empty()
    }
}

/// Per-project folder under `cache_home`
pub fn project_cache_dir(cache_home: &Path, project_root: &Path) -> PathBuf {
    let project_hash = format!("{:x}", md5::compute(project_root.to_string_lossy().as_bytes()));
    cache_home.join(project_hash)
}

pub fn snapshot_path(project_root: &Path) -> Result<PathBuf> {
    let cache_home = get_cache_directory()?;
    Ok(project_cache_dir(&cache_home, project_root).join(SNAPSHOT_FILE))
}

pub fn save_snapshot(snapshot: &CacheSnapshot) -> Result<()> {
    let path = snapshot_path(&snapshot.project_root)?;
    save_snapshot_to(snapshot, &path)
}

pub fn save_snapshot_to(snapshot: &CacheSnapshot, path: &Path) -> Result<()> {
    log::debug!(
        "Saving snapshot with {} metadata entries and {} diff results to {}",
        snapshot.metadata.len(),
        snapshot.diffs.len(),
        path.display()
    );

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| {
            log::error!("Failed to create cache directory '{}': {e}", dir.display());
            SyncError::directory_creation_failed(dir, e)
        })?;
    }

    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn load_snapshot(project_root: &Path) -> Result<CacheSnapshot> {
    let path = snapshot_path(project_root)?;
    load_snapshot_from(&path)
}

pub fn load_snapshot_from(path: &Path) -> Result<CacheSnapshot> {
    if !path.exists() {
        log::debug!("No snapshot at {}", path.display());
        return Err(SyncError::snapshot_not_found(path));
    }

    let content = fs::read_to_string(path)?;
    let snapshot: CacheSnapshot = serde_json::from_str(&content).map_err(|e| {
        log::warn!("Failed to parse snapshot '{}': {e}", path.display());
        SyncError::snapshot_parse_failed(path, e)
    })?;

    log::debug!(
        "Loaded snapshot saved at {} ({} metadata, {} diffs)",
        snapshot.saved_at,
        snapshot.metadata.len(),
        snapshot.diffs.len()
    );
    Ok(snapshot)
}

/// Remove the project's snapshot; returns whether one existed
pub fn delete_snapshot(project_root: &Path) -> Result<bool> {
    let path = snapshot_path(project_root)?;
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(&path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::component::{canonical_key, ComponentIdentity, ComponentKind};
    use tempfile::TempDir;

    #[test]
    fn test_project_dirs_differ_per_root() {
        let home = Path::new("/cache");
        let a = project_cache_dir(home, Path::new("/work/a"));
        let b = project_cache_dir(home, Path::new("/work/b"));
        assert_ne!(a, b);
        assert!(a.starts_with(home));
    }

    #[test]
    fn test_save_and_load_keeps_timestamps() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested/snapshot.json");
        let saved_at = Utc::now() - chrono::Duration::minutes(10);
        let identity = ComponentIdentity::new(ComponentKind::ApexClass, "Foo");

        let mut snapshot = CacheSnapshot::new(PathBuf::from("/work/project"), saved_at);
        let key = canonical_key(Path::new("classes/Foo.cls"));
        snapshot
            .metadata
            .insert(key.clone(), MetadataStatusEntry::not_found(identity.clone(), saved_at));
        snapshot
            .diffs
            .insert(key.clone(), DiffResult::new_component(identity, saved_at));

        save_snapshot_to(&snapshot, &path)?;
        let loaded = load_snapshot_from(&path)?;
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.metadata[&key].cached_at, saved_at);
        Ok(())
    }

    #[test]
    fn test_missing_snapshot() {
        let err = load_snapshot_from(Path::new("/nonexistent/snapshot.json")).unwrap_err();
        assert!(matches!(err, SyncError::SnapshotNotFound { .. }));
    }

    #[test]
    fn test_corrupt_snapshot() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("snapshot.json");
        fs::write(&path, "{ not json")?;
        let err = load_snapshot_from(&path).unwrap_err();
        assert!(matches!(err, SyncError::SnapshotParseFailed { .. }));
        Ok(())
    }
}
