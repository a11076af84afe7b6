//! Prefetch / reconciliation pipeline.
//!
//! A run walks the project, collapses files into components, and then for each
//! metadata batch (one kind, at most `metadata_batch_size` components) fetches the
//! org metadata and immediately hands the batch to the diff engine in
//! `compare_batch_size` chunks on background tasks, at most `compare_concurrency`
//! of them retrieving at once. The next metadata batch is
//! fetched while those comparisons run, so a scan costs roughly the larger of the
//! two sums instead of both.
//!
//! Every finished comparison publishes a decoration event for the component's
//! files. Starting a new run cancels the previous one; a cancelled run stops
//! issuing batches and none of its late results reach the caches.

use crate::core::{
    component::{classify, CacheKey, ComponentKind, ComponentRef},
    diff::{CompareOutcome, ContentDiffEngine},
    error::ErrorKind,
    events::{EventBus, PrefetchSummary, ScanPhase, SyncEvent},
    metadata::MetadataStatusCache,
    sync_status::SyncState,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

const SKIPPED_DIRS: [&str; 4] = [".git", ".sf", ".sfdx", "node_modules"];

const METADATA_WEIGHT: usize = 30;
const COMPARE_WEIGHT: usize = 70;

/// One logical component found in the project and the local files that make it up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredUnit {
    pub component: ComponentRef,
    pub members: Vec<PathBuf>,
}

/// Walk `root` and collapse tracked files into components, keyed by `(kind, name)`.
///
/// Paths are relative to `root`.
pub fn discover_components(root: &Path) -> Vec<DiscoveredUnit> {
    let mut units: BTreeMap<(ComponentKind, String), DiscoveredUnit> = BTreeMap::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Skipping unreadable entry during discovery: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let Some(component) = classify(relative) else {
            continue;
        };

        let unit = units
            .entry(component.identity.match_key())
            .or_insert_with(|| DiscoveredUnit {
                component: component.clone(),
                members: Vec::new(),
            });
        unit.members.push(relative.to_path_buf());
    }

    let mut units: Vec<DiscoveredUnit> = units.into_values().collect();
    for unit in &mut units {
        unit.members.sort();
    }
    log::debug!("Discovered {} component(s) under {}", units.len(), root.display());
    units
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub project_root: PathBuf,
    pub metadata_batch_size: usize,
    pub compare_batch_size: usize,
    pub compare_concurrency: usize,
    pub batch_delay: Duration,
    pub content_compare: bool,
}

struct Progress {
    events: EventBus,
    total: usize,
    metadata_done: AtomicUsize,
    compare_done: AtomicUsize,
    content_compare: bool,
}

impl Progress {
    fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let metadata = self.metadata_done.load(Ordering::SeqCst).min(self.total);
        let compare = self.compare_done.load(Ordering::SeqCst).min(self.total);
        let weighted = if self.content_compare {
            METADATA_WEIGHT * metadata + COMPARE_WEIGHT * compare
        } else {
            100 * metadata
        };
        (weighted / self.total).min(100) as u8
    }

    fn report(&self, phase: ScanPhase, completed: usize) {
        self.events.publish(SyncEvent::Progress {
            phase,
            completed,
            total: self.total,
            percent: self.percent(),
        });
    }

    fn metadata_finished(&self, count: usize) {
        let done = self.metadata_done.fetch_add(count, Ordering::SeqCst) + count;
        self.report(ScanPhase::Metadata, done);
    }

    fn compare_finished(&self) {
        let done = self.compare_done.fetch_add(1, Ordering::SeqCst) + 1;
        self.report(ScanPhase::Compare, done);
    }
}

#[derive(Default)]
struct Tally {
    summary: PrefetchSummary,
    counted: usize,
}

impl Tally {
    fn record_state(&mut self, state: SyncState) {
        self.counted += 1;
        match state {
            SyncState::InSync => self.summary.synced += 1,
            SyncState::LocalChanged => self.summary.local_changed += 1,
            SyncState::RemoteNewer => self.summary.remote_newer += 1,
            SyncState::UnknownDirection => self.summary.unknown_direction += 1,
            SyncState::New => self.summary.new += 1,
            SyncState::NotCompared => self.summary.not_compared += 1,
            SyncState::Error | SyncState::Unsupported => self.summary.errors += 1,
        }
    }

    fn record(&mut self, outcome: &CompareOutcome) {
        match outcome {
            Ok(result) => self.record_state(SyncState::from_diff(result)),
            Err(_) => self.record_state(SyncState::Error),
        }
    }
}

pub struct PrefetchPipeline {
    metadata: Arc<MetadataStatusCache>,
    engine: Arc<ContentDiffEngine>,
    events: EventBus,
    settings: PipelineSettings,
    current: Mutex<Option<(u64, CancellationToken)>>,
    generation: AtomicU64,
}

impl PrefetchPipeline {
    pub fn new(
        metadata: Arc<MetadataStatusCache>,
        engine: Arc<ContentDiffEngine>,
        events: EventBus,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            metadata,
            engine,
            events,
            settings,
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Cancel the active run, if any
    pub fn cancel(&self) {
        if let Some((generation, token)) = self.current.lock().take() {
            log::debug!("Cancelling prefetch run {generation}");
            token.cancel();
        }
    }

    fn begin_run(&self) -> (u64, CancellationToken) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        let previous = self.current.lock().replace((generation, token.clone()));
        if let Some((old, old_token)) = previous {
            log::info!("Prefetch run {generation} supersedes run {old}");
            old_token.cancel();
        }
        (generation, token)
    }

    fn end_run(&self, generation: u64) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|(g, _)| *g == generation) {
            *current = None;
        }
    }

    /// Discover every component under the project root and reconcile it
    pub async fn run(&self) -> PrefetchSummary {
        let (generation, token) = self.begin_run();
        self.events.publish(SyncEvent::Progress {
            phase: ScanPhase::Discovering,
            completed: 0,
            total: 0,
            percent: 0,
        });

        let root = self.settings.project_root.clone();
        let units = match tokio::task::spawn_blocking(move || discover_components(&root)).await {
            Ok(units) => units,
            Err(e) => {
                log::error!("Component discovery failed: {e}");
                Vec::new()
            }
        };

        let summary = self.reconcile(units, &token).await;
        self.end_run(generation);
        summary
    }

    /// Reconcile an explicit set of components as one run
    pub async fn run_units(&self, units: Vec<DiscoveredUnit>) -> PrefetchSummary {
        let (generation, token) = self.begin_run();
        let summary = self.reconcile(units, &token).await;
        self.end_run(generation);
        summary
    }

    async fn reconcile(&self, units: Vec<DiscoveredUnit>, token: &CancellationToken) -> PrefetchSummary {
        let total = units.len();
        let progress = Arc::new(Progress {
            events: self.events.clone(),
            total,
            metadata_done: AtomicUsize::new(0),
            compare_done: AtomicUsize::new(0),
            content_compare: self.settings.content_compare,
        });
        let mut tally = Tally::default();
        tally.summary.total = total;

        let mut by_kind: BTreeMap<ComponentKind, Vec<DiscoveredUnit>> = BTreeMap::new();
        for unit in units {
            by_kind
                .entry(unit.component.identity.kind)
                .or_default()
                .push(unit);
        }
        let batches: Vec<(ComponentKind, Vec<DiscoveredUnit>)> = by_kind
            .into_iter()
            .flat_map(|(kind, units)| {
                units
                    .chunks(self.settings.metadata_batch_size.max(1))
                    .map(|chunk| (kind, chunk.to_vec()))
                    .collect::<Vec<_>>()
            })
            .collect();

        log::info!(
            "Prefetching {total} component(s) in {} metadata batch(es)",
            batches.len()
        );

        let mut compares: JoinSet<HashMap<CacheKey, CompareOutcome>> = JoinSet::new();
        let slots = Arc::new(Semaphore::new(self.settings.compare_concurrency.max(1)));
        let batch_count = batches.len();

        for (index, (kind, batch)) in batches.into_iter().enumerate() {
            if token.is_cancelled() {
                break;
            }

            let components: Vec<ComponentRef> =
                batch.iter().map(|unit| unit.component.clone()).collect();
            let resolved = self
                .metadata
                .resolve_components(kind, &components, Some(token))
                .await;
            if token.is_cancelled() {
                break;
            }
            progress.metadata_finished(batch.len());

            let mut comparable = Vec::new();
            for unit in batch {
                let failed = resolved
                    .get(&unit.component.key)
                    .and_then(|entry| entry.error_kind())
                    .filter(|kind| *kind != ErrorKind::NotFound);
                if failed.is_some() {
                    tally.record_state(SyncState::Error);
                    self.notify_members(&unit.members);
                    progress.compare_finished();
                } else if !self.settings.content_compare {
                    let state = match resolved.get(&unit.component.key) {
                        Some(entry) if entry.is_not_found() => SyncState::New,
                        _ => SyncState::NotCompared,
                    };
                    tally.record_state(state);
                    self.notify_members(&unit.members);
                } else {
                    comparable.push(unit);
                }
            }

            for chunk in comparable.chunks(self.settings.compare_batch_size.max(1)) {
                self.spawn_compare(
                    &mut compares,
                    chunk.to_vec(),
                    slots.clone(),
                    token.clone(),
                    progress.clone(),
                );
            }

            if index + 1 < batch_count && !self.settings.batch_delay.is_zero() {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.batch_delay) => {}
                }
            }
        }

        progress.report(ScanPhase::Finalizing, progress.compare_done.load(Ordering::SeqCst));
        while let Some(joined) = compares.join_next().await {
            match joined {
                Ok(outcomes) => {
                    for outcome in outcomes.values() {
                        tally.record(outcome);
                    }
                }
                Err(e) => log::error!("Comparison task failed: {e}"),
            }
        }

        let mut summary = tally.summary;
        summary.cancelled = token.is_cancelled();
        if !summary.cancelled && tally.counted < total {
            summary.errors += total - tally.counted;
        }

        if summary.cancelled {
            log::info!(
                "Prefetch cancelled after {} of {total} component(s)",
                tally.counted
            );
        } else {
            log::info!(
                "Prefetch finished: {} synced, {} changed locally, {} newer in org, {} unknown direction, {} new, {} errors",
                summary.synced,
                summary.local_changed,
                summary.remote_newer,
                summary.unknown_direction,
                summary.new,
                summary.errors
            );
        }

        self.events.all_decorations_changed();
        self.events.publish(SyncEvent::ScanFinished(summary.clone()));
        summary
    }

    fn notify_members(&self, members: &[PathBuf]) {
        for path in members {
            self.events.decoration_changed(path.clone());
        }
    }

    fn spawn_compare(
        &self,
        compares: &mut JoinSet<HashMap<CacheKey, CompareOutcome>>,
        chunk: Vec<DiscoveredUnit>,
        slots: Arc<Semaphore>,
        token: CancellationToken,
        progress: Arc<Progress>,
    ) {
        let engine = self.engine.clone();
        let events = self.events.clone();
        let members: HashMap<CacheKey, Vec<PathBuf>> = chunk
            .iter()
            .map(|unit| (unit.component.key.clone(), unit.members.clone()))
            .collect();
        let components: Vec<ComponentRef> = chunk.into_iter().map(|unit| unit.component).collect();

        compares.spawn(async move {
            let _permit = tokio::select! {
                _ = token.cancelled() => return HashMap::new(),
                permit = slots.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        log::error!("Comparison slots closed: {e}");
                        return HashMap::new();
                    }
                },
            };
            engine
                .compare_components(&components, Some(&token), |component, _| {
                    if token.is_cancelled() {
                        return;
                    }
                    if let Some(paths) = members.get(&component.key) {
                        for path in paths {
                            events.decoration_changed(path.clone());
                        }
                    }
                    progress.compare_finished();
                })
                .await
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discovery_collapses_bundles_and_sidecars() -> crate::core::error::Result<()> {
        let dir = TempDir::new()?;
        let base = dir.path().join("force-app/main/default");
        fs::create_dir_all(base.join("classes"))?;
        fs::create_dir_all(base.join("lwc/myCard/__tests__"))?;
        fs::create_dir_all(dir.path().join("node_modules/lwc/junk"))?;
        fs::create_dir_all(dir.path().join(".sfdx/tools"))?;

        fs::write(base.join("classes/Foo.cls"), "public class Foo {}")?;
        fs::write(base.join("classes/Foo.cls-meta.xml"), "<xml/>")?;
        fs::write(base.join("lwc/myCard/myCard.js"), "")?;
        fs::write(base.join("lwc/myCard/myCard.html"), "")?;
        fs::write(base.join("lwc/myCard/__tests__/myCard.test.js"), "")?;
        fs::write(dir.path().join("node_modules/lwc/junk/junk.js"), "")?;
        fs::write(dir.path().join(".sfdx/tools/Bar.cls"), "")?;
        fs::write(dir.path().join("README.md"), "")?;

        let units = discover_components(dir.path());
        assert_eq!(units.len(), 2);

        let class = units
            .iter()
            .find(|u| u.component.identity.kind == ComponentKind::ApexClass)
            .unwrap();
        assert_eq!(class.members.len(), 2);

        let bundle = units
            .iter()
            .find(|u| u.component.identity.kind == ComponentKind::LwcBundle)
            .unwrap();
        assert_eq!(bundle.component.identity.name, "myCard");
        assert_eq!(bundle.members.len(), 2);
        Ok(())
    }

    #[test]
    fn test_progress_weights() {
        let progress = Progress {
            events: EventBus::new(),
            total: 10,
            metadata_done: AtomicUsize::new(10),
            compare_done: AtomicUsize::new(5),
            content_compare: true,
        };
        assert_eq!(progress.percent(), 65);

        progress.compare_done.store(10, Ordering::SeqCst);
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn test_progress_without_compare() {
        let progress = Progress {
            events: EventBus::new(),
            total: 4,
            metadata_done: AtomicUsize::new(2),
            compare_done: AtomicUsize::new(0),
            content_compare: false,
        };
        assert_eq!(progress.percent(), 50);
    }
}
