//! Predefined tracker scenarios
//!
//! A [`Harness`] wires a [`TestProject`], a [`FakeOrg`] and a [`ManualClock`]
//! into a [`SyncTracker`], so tests can move time and script the org freely.

#![allow(dead_code)]

use super::gateway::FakeOrg;
use super::project::{setup_test_project, TestProject};
use chrono::{DateTime, Duration, Utc};
use sf_sync_tracker::core::{
    CommandGateway, ManualClock, SharedClock, SyncTracker, TrackerConfig,
};
use std::sync::Arc;
use tempfile::TempDir;

pub struct Harness {
    pub project: TestProject,
    pub org: Arc<FakeOrg>,
    pub clock: Arc<ManualClock>,
    pub scratch: TempDir,
    pub tracker: SyncTracker,
}

/// Defaults with no pause between pipeline batches
pub fn test_config() -> TrackerConfig {
    TrackerConfig {
        batch_delay_ms: 0,
        ..TrackerConfig::default()
    }
}

pub fn harness() -> anyhow::Result<Harness> {
    harness_with(test_config())
}

pub fn harness_with(config: TrackerConfig) -> anyhow::Result<Harness> {
    let project = setup_test_project()?;
    let org = Arc::new(FakeOrg::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let scratch = TempDir::new()?;

    let gateway: Arc<dyn CommandGateway> = org.clone();
    let shared: SharedClock = clock.clone();
    let tracker = SyncTracker::new(project.path.clone(), config, gateway, shared)
        .with_scratch_root(scratch.path());

    Ok(Harness {
        project,
        org,
        clock,
        scratch,
        tracker,
    })
}

/// An org timestamp well after any file written by the test
pub fn remote_later() -> DateTime<Utc> {
    Utc::now() + Duration::days(1)
}

/// An org timestamp well before any file written by the test
pub fn remote_earlier() -> DateTime<Utc> {
    Utc::now() - Duration::days(30)
}

/// Scenario: three classes covering each direction plus one class missing remotely
///
/// - `Synced` matches the org apart from whitespace
/// - `RemoteEdit` was changed in the org after the local copy was written
/// - `LocalEdit` was changed locally after the org's last modification
/// - `Brand` exists only locally
pub fn create_mixed_project(h: &Harness) -> anyhow::Result<()> {
    h.project
        .add_class("Synced", "public class Synced {\n    void run() {}\n}\n")?;
    h.org.add_class(
        "Synced",
        "public class Synced {\r\n    void run() {}   \r\n}",
        remote_earlier(),
    );

    h.project.add_class("RemoteEdit", "public class RemoteEdit {}")?;
    h.org
        .add_class("RemoteEdit", "public class RemoteEdit { Integer x; }", remote_later());

    h.project
        .add_class("LocalEdit", "public class LocalEdit { String local; }")?;
    h.org
        .add_class("LocalEdit", "public class LocalEdit {}", remote_earlier());

    h.project.add_class("Brand", "public class Brand {}")?;
    Ok(())
}
