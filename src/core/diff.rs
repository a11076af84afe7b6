//! Content diff engine.
//!
//! Decides "who changed it" for a component: retrieves the org's copy of a batch
//! of components into a scratch directory with a single `project retrieve start`,
//! compares each against the local files after whitespace normalization, and uses
//! the cached remote `LastModifiedDate` against the local mtime to tell a local
//! edit from a newer remote version.
//!
//! # Outcomes
//! - Component absent from the org: `is_new`, no difference, cached.
//! - Identical after normalization: in sync, cached.
//! - Different: direction from timestamps, or per [`DirectionPolicy`] when the
//!   metadata cache has no remote timestamp; cached.
//! - Retrieval timeout / process / parse failure: returned as an error, never
//!   cached, so the next run retries.
//!
//! The scratch directory is a [`tempfile::TempDir`] owned by one batch and removed
//! on every exit path.

use crate::core::{
    clock::SharedClock,
    component::{classify, CacheKey, ComponentKind, ComponentRef, META_SUFFIX},
    config::DirectionPolicy,
    diff_cache::{DiffResult, DiffResultCache},
    error::{ErrorKind, Result, SyncError, SyncFailure},
    gateway::{parse_cli_result, CommandGateway},
    metadata::MetadataStatusCache,
    query::{CommandBuilder, RetrieveResult, RetrievedFile},
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

pub type CompareOutcome = std::result::Result<DiffResult, SyncFailure>;

/// CRLF → LF, strip trailing whitespace per line, trim the whole text
pub fn normalize_content(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.lines().map(str::trim_end).collect();
    lines.join("\n").trim().to_string()
}

pub fn contents_match(local: &str, remote: &str) -> bool {
    normalize_content(local) == normalize_content(remote)
}

/// Settings the engine reads once at construction
#[derive(Debug, Clone)]
pub struct DiffSettings {
    pub project_root: PathBuf,
    pub retrieve_timeout: std::time::Duration,
    pub batch_size: usize,
    pub direction_policy: DirectionPolicy,
    /// Parent for scratch directories; the system temp dir when `None`
    pub scratch_root: Option<PathBuf>,
}

pub struct ContentDiffEngine {
    gateway: Arc<dyn CommandGateway>,
    commands: CommandBuilder,
    clock: SharedClock,
    metadata: Arc<MetadataStatusCache>,
    results: Arc<DiffResultCache>,
    settings: DiffSettings,
}

impl ContentDiffEngine {
    pub fn new(
        gateway: Arc<dyn CommandGateway>,
        commands: CommandBuilder,
        clock: SharedClock,
        metadata: Arc<MetadataStatusCache>,
        results: Arc<DiffResultCache>,
        settings: DiffSettings,
    ) -> Self {
        Self {
            gateway,
            commands,
            clock,
            metadata,
            results,
            settings,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.settings.batch_size.max(1)
    }

    /// Compare one file against the org
    pub async fn compare(&self, path: &Path) -> CompareOutcome {
        let Some(component) = classify(path) else {
            return Err(SyncFailure::from(SyncError::unsupported_file_type(path)));
        };
        let key = component.key.clone();
        let mut outcomes = self.compare_components(&[component], None, |_, _| {}).await;
        outcomes.remove(&key).unwrap_or_else(|| {
            Err(SyncFailure::new(
                ErrorKind::ProcessFailure,
                "comparison produced no result",
            ))
        })
    }

    /// Compare many files, one retrieval per batch, reporting each result as it lands.
    ///
    /// `on_result` fires once per requested file, so two files of the same
    /// component each get their own callback.
    pub async fn compare_batch<F>(
        &self,
        files: &[PathBuf],
        mut on_result: F,
    ) -> HashMap<PathBuf, CompareOutcome>
    where
        F: FnMut(&Path, &CompareOutcome) + Send,
    {
        let mut results = HashMap::new();
        let mut wanted = Vec::new();
        let mut components: BTreeMap<CacheKey, ComponentRef> = BTreeMap::new();

        for file in files {
            match classify(file) {
                Some(component) => {
                    wanted.push((file.clone(), component.key.clone()));
                    components.entry(component.key.clone()).or_insert(component);
                }
                None => {
                    let outcome = Err(SyncFailure::from(SyncError::unsupported_file_type(file)));
                    on_result(file, &outcome);
                    results.insert(file.clone(), outcome);
                }
            }
        }

        let components: Vec<ComponentRef> = components.into_values().collect();
        let mut by_key = HashMap::new();
        for chunk in components.chunks(self.batch_size()) {
            let outcomes = self
                .compare_components(chunk, None, |component, outcome| {
                    for (file, key) in &wanted {
                        if *key == component.key {
                            on_result(file, outcome);
                        }
                    }
                })
                .await;
            by_key.extend(outcomes);
        }

        for (file, key) in wanted {
            if let Some(outcome) = by_key.get(&key) {
                results.insert(file, outcome.clone());
            }
        }
        results
    }

    /// Compare one batch of classified components with a single retrieval.
    ///
    /// Results are written to the diff cache unless `cancel` has fired by the
    /// time they are ready.
    pub async fn compare_components<F>(
        &self,
        components: &[ComponentRef],
        cancel: Option<&CancellationToken>,
        mut on_result: F,
    ) -> HashMap<CacheKey, CompareOutcome>
    where
        F: FnMut(&ComponentRef, &CompareOutcome) + Send,
    {
        let mut outcomes = HashMap::new();
        let mut to_retrieve = Vec::new();

        for component in components {
            if self.known_missing(&component.key) {
                let outcome = Ok(DiffResult::new_component(
                    component.identity.clone(),
                    self.clock.now(),
                ));
                self.finish(component, outcome, cancel, &mut on_result, &mut outcomes);
            } else {
                to_retrieve.push(component.clone());
            }
        }

        // A batch rejected because one member is missing is retried per component.
        let mut groups = vec![to_retrieve];
        while let Some(group) = groups.pop() {
            if group.is_empty() {
                continue;
            }
            if cancel.is_some_and(|token| token.is_cancelled()) {
                break;
            }

            match self.retrieve_and_compare(&group).await {
                Ok(group_outcomes) => {
                    for (component, outcome) in group.iter().zip(group_outcomes) {
                        self.finish(component, outcome, cancel, &mut on_result, &mut outcomes);
                    }
                }
                Err(err) if is_missing_component_error(&err) && group.len() > 1 => {
                    log::debug!(
                        "Retrieval of {} components rejected a missing member; retrying individually",
                        group.len()
                    );
                    groups.extend(group.into_iter().map(|component| vec![component]));
                }
                Err(err) if is_missing_component_error(&err) => {
                    let component = &group[0];
                    let outcome = Ok(DiffResult::new_component(
                        component.identity.clone(),
                        self.clock.now(),
                    ));
                    self.finish(component, outcome, cancel, &mut on_result, &mut outcomes);
                }
                Err(err) => {
                    log::warn!("Retrieval of {} component(s) failed: {err}", group.len());
                    let failure = SyncFailure::from(&err);
                    for component in &group {
                        self.finish(
                            component,
                            Err(failure.clone()),
                            cancel,
                            &mut on_result,
                            &mut outcomes,
                        );
                    }
                }
            }
        }

        outcomes
    }

    fn finish<F>(
        &self,
        component: &ComponentRef,
        outcome: CompareOutcome,
        cancel: Option<&CancellationToken>,
        on_result: &mut F,
        outcomes: &mut HashMap<CacheKey, CompareOutcome>,
    ) where
        F: FnMut(&ComponentRef, &CompareOutcome),
    {
        let superseded = cancel.is_some_and(|token| token.is_cancelled());
        if let Ok(result) = &outcome {
            if !superseded {
                self.results.put_by_key(component.key.clone(), result.clone());
            }
        }
        on_result(component, &outcome);
        outcomes.insert(component.key.clone(), outcome);
    }

    fn known_missing(&self, key: &CacheKey) -> bool {
        self.metadata
            .cached_by_key(key)
            .is_some_and(|entry| entry.is_not_found() && self.metadata.is_fresh_entry(&entry))
    }

    fn resolve_local(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.settings.project_root.join(path)
        }
    }

    fn create_scratch(&self) -> Result<tempfile::TempDir> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("sf-sync-compare-");
            builder
        };
        let scratch = match &self.settings.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)
                    .map_err(|e| SyncError::directory_creation_failed(root, e))?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(scratch)
    }

    /// One retrieval for `group`; outcomes are returned in `group` order.
    async fn retrieve_and_compare(&self, group: &[ComponentRef]) -> Result<Vec<CompareOutcome>> {
        let scratch = self.create_scratch()?;
        let output_dir = scratch.path().join("retrieved");
        let identities: Vec<_> = group.iter().map(|c| c.identity.clone()).collect();
        let command = self.commands.retrieve(&identities, &output_dir);

        let raw = self
            .gateway
            .execute(&command, self.settings.retrieve_timeout)
            .await?;
        let retrieved: RetrieveResult = parse_cli_result(&raw)?;

        let mut outcomes = Vec::with_capacity(group.len());
        for component in group {
            let files = matching_files(component, &retrieved.files, &output_dir);
            let outcome = if files.is_empty() {
                Ok(DiffResult::new_component(
                    component.identity.clone(),
                    self.clock.now(),
                ))
            } else {
                self.compare_retrieved(component, &files)
                    .await
                    .map_err(|err| SyncFailure::from(&err))
            };
            outcomes.push(outcome);
        }

        if let Err(e) = scratch.close() {
            log::warn!("Failed to remove scratch directory: {e}");
        }
        Ok(outcomes)
    }

    async fn compare_retrieved(
        &self,
        component: &ComponentRef,
        remote_files: &[PathBuf],
    ) -> Result<DiffResult> {
        let (differs, local_mtime) = if component.identity.kind.is_bundle() {
            self.compare_bundle(component, remote_files).await?
        } else {
            let local_path = self.resolve_local(&component.primary_path);
            let local = tokio::fs::read_to_string(&local_path).await?;
            let remote = tokio::fs::read_to_string(&remote_files[0]).await?;
            let mtime = modified_at(&local_path).await?;
            (!contents_match(&local, &remote), Some(mtime))
        };

        let now = self.clock.now();
        if !differs {
            return Ok(DiffResult::in_sync(component.identity.clone(), now));
        }

        let remote_modified = self
            .metadata
            .cached_by_key(&component.key)
            .and_then(|entry| entry.last_modified_at);
        let result = match (remote_modified, local_mtime) {
            (Some(remote), Some(local)) => {
                DiffResult::changed(component.identity.clone(), remote > local, true, now)
            }
            _ => match self.settings.direction_policy {
                DirectionPolicy::AssumeLocal => {
                    DiffResult::changed(component.identity.clone(), false, true, now)
                }
                DirectionPolicy::FlagUnknown => {
                    DiffResult::changed(component.identity.clone(), false, false, now)
                }
            },
        };
        Ok(result)
    }

    /// Compare every non-descriptor file of a bundle; returns (differs, newest local mtime)
    async fn compare_bundle(
        &self,
        component: &ComponentRef,
        remote_files: &[PathBuf],
    ) -> Result<(bool, Option<DateTime<Utc>>)> {
        let local_dir = self.resolve_local(&component.primary_path);
        let local_files = bundle_files(&local_dir);
        let remote_by_rel: BTreeMap<PathBuf, &PathBuf> = remote_files
            .iter()
            .map(|path| (bundle_relative(path, &component.identity.name), path))
            .collect();

        let mut newest: Option<DateTime<Utc>> = None;
        let mut differs = local_files.len() != remote_by_rel.len();

        for rel in &local_files {
            let local_path = local_dir.join(rel);
            let mtime = modified_at(&local_path).await?;
            newest = Some(newest.map_or(mtime, |n| n.max(mtime)));
            if differs {
                continue;
            }
            match remote_by_rel.get(rel) {
                Some(remote_path) => {
                    let local = tokio::fs::read_to_string(&local_path).await?;
                    let remote = tokio::fs::read_to_string(remote_path).await?;
                    if !contents_match(&local, &remote) {
                        differs = true;
                    }
                }
                None => differs = true,
            }
        }

        Ok((differs, newest))
    }
}

async fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(path).await?;
    Ok(DateTime::<Utc>::from(metadata.modified()?))
}

fn is_descriptor(path: &Path) -> bool {
    path.to_string_lossy().ends_with(META_SUFFIX)
}

/// Retrieved source files belonging to `component`, descriptors excluded
fn matching_files(
    component: &ComponentRef,
    files: &[RetrievedFile],
    output_dir: &Path,
) -> Vec<PathBuf> {
    let kind = component.identity.kind;
    let mut matched: Vec<PathBuf> = files
        .iter()
        .filter(|file| file.full_name.eq_ignore_ascii_case(&component.identity.name))
        .filter(|file| {
            file.component_type
                .as_deref()
                .map_or(true, |t| t.eq_ignore_ascii_case(kind.metadata_type()))
        })
        .filter_map(|file| file.file_path.as_deref().map(PathBuf::from))
        .filter(|path| kind == ComponentKind::Flow || !is_descriptor(path))
        .map(|path| {
            if path.is_absolute() {
                path
            } else {
                output_dir.join(path)
            }
        })
        .collect();
    matched.sort();
    matched.dedup();
    matched
}

/// Path of a retrieved bundle file relative to its bundle directory
fn bundle_relative(path: &Path, bundle: &str) -> PathBuf {
    let bundle_dir = path.ancestors().skip(1).find(|dir| {
        dir.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case(bundle))
    });
    match bundle_dir.and_then(|dir| path.strip_prefix(dir).ok()) {
        Some(rel) => rel.to_path_buf(),
        None => path.file_name().map(PathBuf::from).unwrap_or_default(),
    }
}

/// Local bundle files relative to the bundle directory, descriptors and tests excluded
fn bundle_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            entry.depth() == 0 || (!name.starts_with('.') && name != "__tests__")
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| !is_descriptor(entry.path()))
        .filter_map(|entry| entry.path().strip_prefix(dir).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}

fn is_missing_component_error(err: &SyncError) -> bool {
    let message = err.to_string().to_lowercase();
    err.kind() == ErrorKind::NotFound
        || (message.contains("entity of type") && message.contains("cannot be found"))
        || message.contains("no source-backed components")
        || message.contains("not found in org")
}
