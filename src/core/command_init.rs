//! Shared setup for CLI commands.
//!
//! Every command needs the same things: the project root, the resolved
//! configuration, and a tracker primed with whatever the previous invocation
//! persisted. [`CommandContext`] does that once; [`CommandContext::persist`] writes
//! the tracker's caches back. Snapshot problems are logged and never fail a
//! command.

use crate::core::{
    config::TrackerConfig,
    dirs::find_project_root,
    error::{Result, SyncError},
    state::{load_snapshot, save_snapshot},
    tracker::SyncTracker,
};
use std::path::{Path, PathBuf};

/// Global options shared by all subcommands
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub project: Option<PathBuf>,
    pub target_org: Option<String>,
}

pub struct CommandContext {
    pub project_root: PathBuf,
    pub config: TrackerConfig,
    /// Directory relative paths on the command line are resolved against
    pub working_dir: PathBuf,
}

impl CommandContext {
    pub fn initialize(options: &GlobalOptions) -> Result<Self> {
        let working_dir = std::env::current_dir()?;
        let start = match &options.project {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => working_dir.join(dir),
            None => working_dir.clone(),
        };
        let project_root = find_project_root(&start)?;
        log::debug!("Project root: {}", project_root.display());

        let mut config = TrackerConfig::load_or_create().unwrap_or_else(|e| {
            log::warn!("Using default configuration ({e})");
            TrackerConfig::default()
        });
        if options.target_org.is_some() {
            config.target_org = options.target_org.clone();
        }

        Ok(Self {
            project_root,
            config,
            working_dir,
        })
    }

    /// Tracker for this project with the last persisted snapshot restored
    pub fn tracker(&self) -> SyncTracker {
        let tracker = SyncTracker::with_shell(self.project_root.clone(), self.config.clone());
        match load_snapshot(&self.project_root) {
            Ok(snapshot) => {
                let restored = tracker.restore(snapshot);
                log::debug!("Restored {restored} cached entries");
            }
            Err(SyncError::SnapshotNotFound { .. }) => {}
            Err(e) => log::warn!("Ignoring unreadable snapshot: {e}"),
        }
        tracker
    }

    pub fn persist(&self, tracker: &SyncTracker) {
        if let Err(e) = save_snapshot(&tracker.snapshot()) {
            log::warn!("Snapshot save failed (command result is unaffected): {e}");
        }
    }

    /// Command-line path resolved against the working directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Path shown to the user, relative to the project root when possible
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.project_root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}
