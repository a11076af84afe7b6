//! Change notifications for decoration consumers.
//!
//! Notifications carry no state of their own; receivers re-read the caches (for
//! example through `SyncTracker::file_status`) and may see them in any order.

use crate::core::connection::ConnectionState;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Discovering,
    Metadata,
    Compare,
    Finalizing,
}

impl ScanPhase {
    pub fn label(&self) -> &'static str {
        match self {
            ScanPhase::Discovering => "Discovering components",
            ScanPhase::Metadata => "Fetching org metadata",
            ScanPhase::Compare => "Comparing content",
            ScanPhase::Finalizing => "Finalizing",
        }
    }
}

/// Counts reported when a prefetch run finishes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchSummary {
    pub total: usize,
    pub synced: usize,
    pub local_changed: usize,
    pub remote_newer: usize,
    pub unknown_direction: usize,
    pub new: usize,
    /// Looked up but not compared (content comparison disabled)
    pub not_compared: usize,
    pub errors: usize,
    pub cancelled: bool,
}

impl PrefetchSummary {
    /// Components that reached a terminal comparison outcome
    pub fn resolved(&self) -> usize {
        self.synced
            + self.local_changed
            + self.remote_newer
            + self.unknown_direction
            + self.new
            + self.not_compared
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SyncEvent {
    /// Decoration for one path changed, or for every path when `None`
    DecorationChanged(Option<PathBuf>),
    Progress {
        phase: ScanPhase,
        completed: usize,
        total: usize,
        percent: u8,
    },
    ScanFinished(PrefetchSummary),
    ConnectionChanged(ConnectionState),
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers; having none is fine
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }

    pub fn decoration_changed(&self, path: impl Into<PathBuf>) {
        self.publish(SyncEvent::DecorationChanged(Some(path.into())));
    }

    pub fn all_decorations_changed(&self) {
        self.publish(SyncEvent::DecorationChanged(None));
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.all_decorations_changed();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.decoration_changed("classes/Foo.cls");
        bus.all_decorations_changed();

        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::DecorationChanged(Some(PathBuf::from("classes/Foo.cls")))
        );
        assert_eq!(rx.recv().await.unwrap(), SyncEvent::DecorationChanged(None));
    }

    #[test]
    fn test_summary_resolved_excludes_errors() {
        let summary = PrefetchSummary {
            total: 6,
            synced: 2,
            local_changed: 1,
            remote_newer: 1,
            new: 1,
            errors: 1,
            ..Default::default()
        };
        assert_eq!(summary.resolved() + summary.errors, summary.total);
    }
}
