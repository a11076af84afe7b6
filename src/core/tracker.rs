//! Per-project facade over the caches, the diff engine and the pipeline.
//!
//! A [`SyncTracker`] owns exactly one instance of each cache for one project root.
//! Paths may be passed absolute or relative to the root; they are made relative
//! once here and every cache keys on that form.

use crate::core::{
    clock::{SharedClock, SystemClock},
    component::{classify, decoration_paths, ComponentIdentity, ComponentKind},
    config::TrackerConfig,
    connection::{ConnectionCache, ConnectionState},
    coverage::{CoverageCache, CoverageOutcome},
    diff::{CompareOutcome, ContentDiffEngine, DiffSettings},
    diff_cache::DiffResultCache,
    error::{ErrorKind, SyncFailure},
    events::{EventBus, PrefetchSummary, SyncEvent},
    gateway::{CommandGateway, ShellGateway},
    metadata::{MetadataStatusCache, MetadataStatusEntry},
    pipeline::{discover_components, DiscoveredUnit, PipelineSettings, PrefetchPipeline},
    query::CommandBuilder,
    state::CacheSnapshot,
    sync_status::FileSyncStatus,
};
use crate::core::component::canonical_key;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Parts {
    connection: Arc<ConnectionCache>,
    metadata: Arc<MetadataStatusCache>,
    diffs: Arc<DiffResultCache>,
    engine: Arc<ContentDiffEngine>,
    coverage: Arc<CoverageCache>,
    pipeline: Arc<PrefetchPipeline>,
}

impl Parts {
    fn assemble(
        project_root: &Path,
        config: &TrackerConfig,
        gateway: &Arc<dyn CommandGateway>,
        clock: &SharedClock,
        events: &EventBus,
        scratch_root: Option<PathBuf>,
    ) -> Self {
        let commands = CommandBuilder::new(config.cli_binary.clone(), config.target_org.clone());

        let connection = Arc::new(ConnectionCache::new(
            gateway.clone(),
            commands.clone(),
            clock.clone(),
            config.connection_ttl(),
            config.status_timeout(),
        ));
        let metadata = Arc::new(MetadataStatusCache::new(
            gateway.clone(),
            commands.clone(),
            clock.clone(),
            config.metadata_ttl(),
            config.query_timeout(),
            config.metadata_batch_size,
        ));
        let diffs = Arc::new(DiffResultCache::new(clock.clone(), config.diff_ttl()));
        let engine = Arc::new(ContentDiffEngine::new(
            gateway.clone(),
            commands.clone(),
            clock.clone(),
            metadata.clone(),
            diffs.clone(),
            DiffSettings {
                project_root: project_root.to_path_buf(),
                retrieve_timeout: config.retrieve_timeout(),
                batch_size: config.compare_batch_size,
                direction_policy: config.direction_policy,
                scratch_root,
            },
        ));
        let coverage = Arc::new(CoverageCache::new(
            gateway.clone(),
            commands,
            clock.clone(),
            config.coverage_ttl(),
            config.query_timeout(),
        ));
        let pipeline = Arc::new(PrefetchPipeline::new(
            metadata.clone(),
            engine.clone(),
            events.clone(),
            PipelineSettings {
                project_root: project_root.to_path_buf(),
                metadata_batch_size: config.metadata_batch_size,
                compare_batch_size: config.compare_batch_size,
                compare_concurrency: config.compare_concurrency,
                batch_delay: config.batch_delay(),
                content_compare: config.features.content_compare,
            },
        ));

        Self {
            connection,
            metadata,
            diffs,
            engine,
            coverage,
            pipeline,
        }
    }
}

pub struct SyncTracker {
    project_root: PathBuf,
    config: TrackerConfig,
    gateway: Arc<dyn CommandGateway>,
    clock: SharedClock,
    events: EventBus,
    scratch_root: Option<PathBuf>,
    parts: Parts,
}

impl SyncTracker {
    pub fn new(
        project_root: impl Into<PathBuf>,
        config: TrackerConfig,
        gateway: Arc<dyn CommandGateway>,
        clock: SharedClock,
    ) -> Self {
        let project_root = project_root.into();
        let events = EventBus::new();
        let parts = Parts::assemble(&project_root, &config, &gateway, &clock, &events, None);
        Self {
            project_root,
            config,
            gateway,
            clock,
            events,
            scratch_root: None,
            parts,
        }
    }

    /// Tracker talking to the real CLI through the shell
    pub fn with_shell(project_root: impl Into<PathBuf>, config: TrackerConfig) -> Self {
        let project_root = project_root.into();
        let gateway: Arc<dyn CommandGateway> = Arc::new(ShellGateway::new(project_root.clone()));
        Self::new(project_root, config, gateway, Arc::new(SystemClock))
    }

    /// Put comparison scratch directories under `dir` instead of the system temp dir
    pub fn with_scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(dir.into());
        self.rebuild();
        self
    }

    fn rebuild(&mut self) {
        self.parts.pipeline.cancel();
        self.parts = Parts::assemble(
            &self.project_root,
            &self.config,
            &self.gateway,
            &self.clock,
            &self.events,
            self.scratch_root.clone(),
        );
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// `path` relative to the project root when it lies inside it
    pub fn relative(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            if let Ok(rel) = path.strip_prefix(&self.project_root) {
                return rel.to_path_buf();
            }
        }
        path.to_path_buf()
    }

    pub async fn check_connection(&self) -> ConnectionState {
        let before = self.parts.connection.cached_connection();
        let state = self.parts.connection.check_connection().await;
        if before.connected != state.connected || before.error_kind() != state.error_kind() {
            self.events.publish(SyncEvent::ConnectionChanged(state.clone()));
        }
        state
    }

    pub fn cached_connection(&self) -> ConnectionState {
        self.parts.connection.cached_connection()
    }

    pub async fn get_status(&self, path: &Path, prefer_stale: bool) -> MetadataStatusEntry {
        self.parts
            .metadata
            .get_status(&self.relative(path), prefer_stale)
            .await
    }

    /// Batch lookup; the result is keyed by the paths as given
    pub async fn get_status_batch(
        &self,
        kind: ComponentKind,
        files: &[PathBuf],
    ) -> HashMap<PathBuf, MetadataStatusEntry> {
        let relative: Vec<PathBuf> = files.iter().map(|f| self.relative(f)).collect();
        let resolved = self.parts.metadata.get_status_batch(kind, &relative).await;
        files
            .iter()
            .zip(relative)
            .filter_map(|(original, rel)| resolved.get(&rel).map(|e| (original.clone(), e.clone())))
            .collect()
    }

    /// Status record for a decoration; reads the caches only
    pub fn file_status(&self, path: &Path) -> FileSyncStatus {
        let relative = self.relative(path);
        let Some(component) = classify(&relative) else {
            return FileSyncStatus::unsupported(canonical_key(&relative));
        };
        let metadata = self.parts.metadata.cached_by_key(&component.key);
        let diff = self
            .parts
            .diffs
            .get_by_key(&component.key)
            .map(|result| {
                let stale = self.parts.diffs.is_stale(&result);
                (result, stale)
            });
        FileSyncStatus::from_caches(
            component.key,
            component.identity,
            metadata,
            diff,
            self.clock.now(),
            self.config.recently_modified_window(),
        )
    }

    pub async fn compare(&self, path: &Path) -> CompareOutcome {
        let relative = self.relative(path);
        let outcome = self.parts.engine.compare(&relative).await;
        for decorated in requested_decorations(&relative) {
            self.events.decoration_changed(decorated);
        }
        outcome
    }

    /// Compare several files, publishing a decoration event as each result lands
    pub async fn compare_batch(&self, files: &[PathBuf]) -> HashMap<PathBuf, CompareOutcome> {
        let relative: Vec<PathBuf> = files.iter().map(|f| self.relative(f)).collect();
        let events = self.events.clone();
        let resolved = self
            .parts
            .engine
            .compare_batch(&relative, |path, _| {
                for decorated in requested_decorations(path) {
                    events.decoration_changed(decorated);
                }
            })
            .await;
        files
            .iter()
            .zip(relative)
            .filter_map(|(original, rel)| resolved.get(&rel).map(|o| (original.clone(), o.clone())))
            .collect()
    }

    /// Reconcile the whole project; a newer call cancels this one
    pub async fn prefetch(&self) -> PrefetchSummary {
        if !self.config.features.prefetch {
            log::info!("Prefetch is disabled in the configuration");
            let summary = PrefetchSummary::default();
            self.events.publish(SyncEvent::ScanFinished(summary.clone()));
            return summary;
        }
        self.parts.pipeline.run().await
    }

    /// Reconcile only the given components
    pub async fn prefetch_units(&self, units: Vec<DiscoveredUnit>) -> PrefetchSummary {
        self.parts.pipeline.run_units(units).await
    }

    pub fn cancel_prefetch(&self) {
        self.parts.pipeline.cancel();
    }

    pub fn is_prefetching(&self) -> bool {
        self.parts.pipeline.is_running()
    }

    pub fn discover(&self) -> Vec<DiscoveredUnit> {
        discover_components(&self.project_root)
    }

    /// Coverage for the component behind `path`
    pub async fn coverage(&self, path: &Path) -> CoverageOutcome {
        let relative = self.relative(path);
        let Some(component) = classify(&relative) else {
            return Err(SyncFailure::new(
                ErrorKind::UnsupportedFileType,
                format!("Unsupported file type: {}", relative.display()),
            ));
        };
        self.coverage_for(&component.identity).await
    }

    pub async fn coverage_for(&self, identity: &ComponentIdentity) -> CoverageOutcome {
        if !self.config.features.coverage {
            return Ok(None);
        }
        self.parts.coverage.get_coverage(identity).await
    }

    pub async fn coverage_batch(
        &self,
        identities: &[ComponentIdentity],
    ) -> Vec<(ComponentIdentity, CoverageOutcome)> {
        if !self.config.features.coverage {
            return identities.iter().map(|i| (i.clone(), Ok(None))).collect();
        }
        self.parts.coverage.get_coverage_batch(identities).await
    }

    /// A local save makes the last comparison meaningless
    pub fn file_saved(&self, path: &Path) {
        let relative = self.relative(path);
        self.parts.diffs.invalidate(&relative);
        match classify(&relative) {
            Some(component) => {
                log::debug!("Invalidated comparison for {}", component.identity);
                for decorated in decoration_paths(&component) {
                    self.events.decoration_changed(decorated);
                }
            }
            None => self.events.decoration_changed(relative),
        }
    }

    pub fn clear_caches(&self) {
        self.parts.pipeline.cancel();
        self.parts.metadata.clear();
        self.parts.diffs.clear();
        self.parts.coverage.clear();
        self.parts.connection.clear();
        log::info!("Cleared all caches for {}", self.project_root.display());
        self.events.all_decorations_changed();
    }

    /// Point at another org; nothing cached for the previous org survives
    pub fn switch_org(&mut self, target_org: Option<String>) {
        log::info!(
            "Switching target org to {}",
            target_org.as_deref().unwrap_or("<default>")
        );
        self.config.target_org = target_org;
        self.rebuild();
        self.events
            .publish(SyncEvent::ConnectionChanged(ConnectionState::default()));
        self.events.all_decorations_changed();
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let mut snapshot = CacheSnapshot::new(self.project_root.clone(), self.clock.now());
        snapshot.metadata = self.parts.metadata.snapshot().into_iter().collect();
        snapshot.diffs = self.parts.diffs.snapshot().into_iter().collect();
        snapshot
    }

    /// Load a snapshot taken for this project; returns the number of restored entries
    pub fn restore(&self, snapshot: CacheSnapshot) -> usize {
        if snapshot.project_root != self.project_root {
            log::warn!(
                "Ignoring snapshot for {} (tracker root is {})",
                snapshot.project_root.display(),
                self.project_root.display()
            );
            return 0;
        }
        let restored = snapshot.metadata.len() + snapshot.diffs.len();
        for (key, entry) in snapshot.metadata {
            self.parts.metadata.insert(key, entry);
        }
        for (key, result) in snapshot.diffs {
            self.parts.diffs.put_by_key(key, result);
        }
        restored
    }
}

/// Paths to redraw after `path` was compared: the file itself plus its component's
/// primary and sidecar paths.
fn requested_decorations(path: &Path) -> Vec<PathBuf> {
    let mut paths = vec![path.to_path_buf()];
    if let Some(component) = classify(path) {
        for decorated in decoration_paths(&component) {
            if !paths.contains(&decorated) {
                paths.push(decorated);
            }
        }
    }
    paths
}
