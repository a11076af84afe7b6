use chrono::Duration;
use sf_sync_tracker::core::{
    state::{load_snapshot_from, save_snapshot_to},
    Clock, CommandGateway, ManualClock, SharedClock, SyncEvent, SyncState, SyncTracker,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

mod common;
use common::{
    fixtures::*,
    gateway::{CommandClass, FakeOrg},
    project::SOURCE_DIR,
};

fn class_path(name: &str) -> PathBuf {
    PathBuf::from(format!("{SOURCE_DIR}/classes/{name}.cls"))
}

#[cfg(test)]
mod tracker_tests {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_restores_into_fresh_tracker() -> anyhow::Result<()> {
        let h = harness()?;
        create_mixed_project(&h)?;
        h.tracker.prefetch().await;

        let dir = TempDir::new()?;
        let file = dir.path().join("snapshot.json");
        save_snapshot_to(&h.tracker.snapshot(), &file)?;
        let snapshot = load_snapshot_from(&file)?;
        assert_eq!(snapshot.diffs.len(), 4);

        let org = Arc::new(FakeOrg::new());
        let gateway: Arc<dyn CommandGateway> = org.clone();
        let clock: SharedClock = h.clock.clone();
        let restored = SyncTracker::new(h.project.path.clone(), test_config(), gateway, clock);
        assert!(restored.restore(snapshot) > 0);

        for (name, state) in [
            ("Synced", SyncState::InSync),
            ("RemoteEdit", SyncState::RemoteNewer),
            ("Brand", SyncState::New),
        ] {
            assert_eq!(restored.file_status(&class_path(name)).state, state, "{name}");
        }
        restored.get_status(&class_path("Synced"), false).await;
        assert!(org.commands().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_snapshot_for_other_project_is_ignored() -> anyhow::Result<()> {
        let h = harness()?;
        create_mixed_project(&h)?;
        h.tracker.prefetch().await;
        let snapshot = h.tracker.snapshot();

        let other = harness()?;
        assert_eq!(other.tracker.restore(snapshot), 0);
        assert!(!other.tracker.file_status(&class_path("Synced")).is_compared);
        Ok(())
    }

    #[tokio::test]
    async fn test_results_turn_stale_but_stay_visible() -> anyhow::Result<()> {
        let h = harness()?;
        create_mixed_project(&h)?;
        h.tracker.compare(&class_path("Synced")).await;

        h.clock.advance(Duration::minutes(5));
        let status = h.tracker.file_status(&class_path("Synced"));

        assert_eq!(status.state, SyncState::InSync);
        assert!(status.is_compared);
        assert!(status.is_stale);
        Ok(())
    }

    #[tokio::test]
    async fn test_recent_remote_change_is_flagged() -> anyhow::Result<()> {
        let h = harness()?;
        h.project.add_class("Fresh", "public class Fresh {}")?;
        h.org.add_class("Fresh", "public class Fresh {}", h.clock.now() - Duration::hours(2));
        h.project.add_class("Old", "public class Old {}")?;
        h.org.add_class("Old", "public class Old {}", h.clock.now() - Duration::days(3));

        h.tracker.get_status(&class_path("Fresh"), false).await;
        h.tracker.get_status(&class_path("Old"), false).await;

        assert!(h.tracker.file_status(&class_path("Fresh")).recently_modified);
        assert!(!h.tracker.file_status(&class_path("Old")).recently_modified);
        Ok(())
    }

    #[tokio::test]
    async fn test_unsupported_file_status() -> anyhow::Result<()> {
        let h = harness()?;

        let status = h.tracker.file_status(&PathBuf::from("README.md"));

        assert_eq!(status.state, SyncState::Unsupported);
        assert!(status.identity.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_caches_forgets_everything() -> anyhow::Result<()> {
        let h = harness()?;
        create_mixed_project(&h)?;
        h.tracker.prefetch().await;
        let mut events = h.tracker.subscribe();

        h.tracker.clear_caches();

        assert!(matches!(events.try_recv()?, SyncEvent::DecorationChanged(None)));
        let status = h.tracker.file_status(&class_path("Synced"));
        assert!(status.metadata.is_none());
        assert!(!status.is_compared);

        h.org.reset_log();
        h.tracker.get_status(&class_path("Synced"), false).await;
        assert_eq!(h.org.count(CommandClass::Query), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_switch_org_discards_previous_results() -> anyhow::Result<()> {
        let mut h = harness()?;
        create_mixed_project(&h)?;
        h.tracker.prefetch().await;
        assert!(h.tracker.file_status(&class_path("Synced")).is_compared);

        h.tracker.switch_org(Some("staging".to_string()));

        assert!(!h.tracker.file_status(&class_path("Synced")).is_compared);
        assert_eq!(h.tracker.config().target_org.as_deref(), Some("staging"));
        Ok(())
    }

    #[tokio::test]
    async fn test_absolute_and_relative_paths_agree() -> anyhow::Result<()> {
        let h = harness()?;
        create_mixed_project(&h)?;
        let relative = class_path("RemoteEdit");
        let absolute = h.project.absolute(&relative);

        h.tracker.get_status(&absolute, false).await;
        h.tracker.compare(&absolute).await;

        assert_eq!(h.tracker.file_status(&relative).state, SyncState::RemoteNewer);
        assert_eq!(h.tracker.file_status(&absolute).state, SyncState::RemoteNewer);
        assert_eq!(h.org.count(CommandClass::Query), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_compare_batch_decorates_source_and_sidecar() -> anyhow::Result<()> {
        let h = harness()?;
        create_mixed_project(&h)?;
        let mut events = h.tracker.subscribe();

        h.tracker.compare_batch(&[class_path("Synced")]).await;

        let mut decorated = Vec::new();
        while let Ok(SyncEvent::DecorationChanged(Some(path))) = events.try_recv() {
            decorated.push(path);
        }
        assert!(decorated.contains(&class_path("Synced")));
        assert!(decorated.contains(&PathBuf::from(format!(
            "{SOURCE_DIR}/classes/Synced.cls-meta.xml"
        ))));
        Ok(())
    }

    #[tokio::test]
    async fn test_compare_batch_decorates_requested_bundle_file() -> anyhow::Result<()> {
        let h = harness()?;
        let files = [
            ("invoiceCard.js", "export default class InvoiceCard {}"),
            ("invoiceCard.html", "<template></template>"),
        ];
        h.project.add_lwc("invoiceCard", &files)?;
        h.org.add_lwc("invoiceCard", &files, remote_earlier());
        let js = PathBuf::from(format!("{SOURCE_DIR}/lwc/invoiceCard/invoiceCard.js"));
        let html = PathBuf::from(format!("{SOURCE_DIR}/lwc/invoiceCard/invoiceCard.html"));
        let mut events = h.tracker.subscribe();

        let results = h.tracker.compare_batch(&[js.clone(), html.clone()]).await;

        let mut decorated = Vec::new();
        while let Ok(SyncEvent::DecorationChanged(Some(path))) = events.try_recv() {
            decorated.push(path);
        }
        assert!(decorated.contains(&js), "{decorated:?}");
        assert!(decorated.contains(&html), "{decorated:?}");
        assert_eq!(results.len(), 2);
        // Both files share the bundle's single retrieval.
        assert_eq!(h.org.count(CommandClass::Retrieve), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_manual_clock_is_shared_with_caches() -> anyhow::Result<()> {
        // Entries written through one tracker age with its clock only.
        let project = common::project::setup_test_project()?;
        let org = Arc::new(FakeOrg::new());
        org.add_class("Solo", "public class Solo {}", remote_earlier());
        let clock = Arc::new(ManualClock::default());
        let gateway: Arc<dyn CommandGateway> = org.clone();
        let shared: SharedClock = clock.clone();
        let tracker = SyncTracker::new(project.path.clone(), test_config(), gateway, shared);

        tracker.get_status(&class_path("Solo"), false).await;
        clock.advance(Duration::seconds(61));
        tracker.get_status(&class_path("Solo"), false).await;

        assert_eq!(org.count(CommandClass::Query), 2);
        Ok(())
    }
}
