//! Metadata status cache and batch query planner.
//!
//! Answers "who last modified this component in the org, and when" for local
//! files. Entries are keyed by the canonical [`CacheKey`], so a source file, its
//! sidecar and every file of a bundle share one entry. Cache misses are grouped by
//! [`ComponentKind`] and fetched with one `IN (...)` query per chunk of at most
//! `max_batch_size` names instead of one query per file.
//!
//! # Caching rules
//! - Successful lookups and `NotFound` are cached for the TTL.
//! - Timeouts, process and parse failures are returned but never cached.
//! - Unclassifiable files get an `UnsupportedFileType` entry without touching the
//!   cache or the org.
//! - Entries are replaced wholesale, never merged.

use crate::core::{
    clock::{is_fresh, SharedClock},
    component::{canonical_key, classify, CacheKey, ComponentIdentity, ComponentKind, ComponentRef},
    error::{ErrorKind, Result, SyncError, SyncFailure},
    gateway::{parse_cli_result, CommandGateway},
    query::{parse_org_datetime, CommandBuilder, MetadataRecord, QueryResult},
    single_flight::SingleFlight,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataStatusEntry {
    /// `None` only for unsupported files
    pub identity: Option<ComponentIdentity>,
    pub last_modified_by: Option<String>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub error: Option<SyncFailure>,
    pub cached_at: DateTime<Utc>,
}

impl MetadataStatusEntry {
    fn blank(identity: Option<ComponentIdentity>, now: DateTime<Utc>) -> Self {
        Self {
            identity,
            last_modified_by: None,
            last_modified_at: None,
            created_by: None,
            created_at: None,
            error: None,
            cached_at: now,
        }
    }

    pub fn from_record(
        identity: ComponentIdentity,
        record: &MetadataRecord,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            last_modified_by: record.last_modified_by.as_ref().and_then(|u| u.name.clone()),
            last_modified_at: record.last_modified_date.as_deref().and_then(parse_org_datetime),
            created_by: record.created_by.as_ref().and_then(|u| u.name.clone()),
            created_at: record.created_date.as_deref().and_then(parse_org_datetime),
            ..Self::blank(Some(identity), now)
        }
    }

    pub fn not_found(identity: ComponentIdentity, now: DateTime<Utc>) -> Self {
        let failure = SyncFailure::from(SyncError::not_found(identity.to_string()));
        Self {
            error: Some(failure),
            ..Self::blank(Some(identity), now)
        }
    }

    pub fn unsupported(path: &Path, now: DateTime<Utc>) -> Self {
        let failure = SyncFailure::from(SyncError::unsupported_file_type(path));
        Self {
            error: Some(failure),
            ..Self::blank(None, now)
        }
    }

    pub fn failed(identity: ComponentIdentity, failure: SyncFailure, now: DateTime<Utc>) -> Self {
        Self {
            error: Some(failure),
            ..Self::blank(Some(identity), now)
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn is_not_found(&self) -> bool {
        self.error_kind() == Some(ErrorKind::NotFound)
    }

    /// Whether this entry may be written to the cache
    pub fn is_cacheable(&self) -> bool {
        match self.error_kind() {
            None => self.identity.is_some(),
            Some(kind) => kind == ErrorKind::NotFound,
        }
    }
}

type EntryMap = Arc<RwLock<HashMap<CacheKey, MetadataStatusEntry>>>;

pub struct MetadataStatusCache {
    gateway: Arc<dyn CommandGateway>,
    commands: CommandBuilder,
    clock: SharedClock,
    ttl: Duration,
    query_timeout: std::time::Duration,
    max_batch_size: usize,
    entries: EntryMap,
    flight: SingleFlight<CacheKey, MetadataStatusEntry>,
}

impl MetadataStatusCache {
    pub fn new(
        gateway: Arc<dyn CommandGateway>,
        commands: CommandBuilder,
        clock: SharedClock,
        ttl: Duration,
        query_timeout: std::time::Duration,
        max_batch_size: usize,
    ) -> Self {
        Self {
            gateway,
            commands,
            clock,
            ttl,
            query_timeout,
            max_batch_size: max_batch_size.max(1),
            entries: Arc::new(RwLock::new(HashMap::new())),
            flight: SingleFlight::new(),
        }
    }

    /// Status for a single file.
    ///
    /// With `prefer_stale`, any cached entry is returned regardless of age; a
    /// query is only issued when nothing has been cached for the component yet.
    pub async fn get_status(&self, path: &Path, prefer_stale: bool) -> MetadataStatusEntry {
        let now = self.clock.now();
        let Some(component) = classify(path) else {
            return MetadataStatusEntry::unsupported(path, now);
        };

        if let Some(entry) = self.entries.read().get(&component.key) {
            if prefer_stale || is_fresh(entry.cached_at, now, self.ttl) {
                log::debug!("Metadata cache hit: {}", component.identity);
                return entry.clone();
            }
        }
        log::debug!("Metadata cache miss: {}", component.identity);

        let gateway = self.gateway.clone();
        let commands = self.commands.clone();
        let clock = self.clock.clone();
        let entries = self.entries.clone();
        let timeout = self.query_timeout;
        let key = component.key.clone();
        let identity = component.identity.clone();

        self.flight
            .run(key.clone(), move || async move {
                let names = vec![identity.name.clone()];
                let result =
                    query_records(gateway.as_ref(), &commands, timeout, identity.kind, &names)
                        .await;
                let entry = entry_for(&identity, &result, clock.now());
                if entry.is_cacheable() {
                    entries.write().insert(key, entry.clone());
                }
                entry
            })
            .await
    }

    /// Status for many files of one kind, one query per chunk of cache misses.
    ///
    /// The result holds an entry for every requested path. Paths that do not
    /// classify as `kind` get an `UnsupportedFileType` entry.
    pub async fn get_status_batch(
        &self,
        kind: ComponentKind,
        files: &[PathBuf],
    ) -> HashMap<PathBuf, MetadataStatusEntry> {
        let now = self.clock.now();
        let mut results = HashMap::new();
        let mut wanted = Vec::new();
        let mut components: BTreeMap<CacheKey, ComponentRef> = BTreeMap::new();

        for file in files {
            match classify(file) {
                Some(component) if component.identity.kind == kind => {
                    wanted.push((file.clone(), component.key.clone()));
                    components.entry(component.key.clone()).or_insert(component);
                }
                _ => {
                    results.insert(file.clone(), MetadataStatusEntry::unsupported(file, now));
                }
            }
        }

        let components: Vec<ComponentRef> = components.into_values().collect();
        let resolved = self.resolve_components(kind, &components, None).await;
        for (file, key) in wanted {
            if let Some(entry) = resolved.get(&key) {
                results.insert(file, entry.clone());
            }
        }
        results
    }

    /// Resolve already-classified components of one kind.
    ///
    /// When `cancel` is supplied and fires, no further chunks are queried and
    /// late results are returned without being written to the cache.
    pub async fn resolve_components(
        &self,
        kind: ComponentKind,
        components: &[ComponentRef],
        cancel: Option<&CancellationToken>,
    ) -> HashMap<CacheKey, MetadataStatusEntry> {
        let now = self.clock.now();
        let mut resolved = HashMap::new();
        let mut misses: Vec<&ComponentRef> = Vec::new();

        {
            let entries = self.entries.read();
            for component in components {
                match entries.get(&component.key) {
                    Some(entry) if is_fresh(entry.cached_at, now, self.ttl) => {
                        resolved.insert(component.key.clone(), entry.clone());
                    }
                    _ => misses.push(component),
                }
            }
        }

        log::debug!(
            "Metadata batch for {kind}: {} hits, {} misses",
            resolved.len(),
            misses.len()
        );

        for chunk in misses.chunks(self.max_batch_size) {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                log::debug!("Metadata batch for {kind} cancelled");
                break;
            }

            let mut names: Vec<String> = chunk.iter().map(|c| c.identity.name.clone()).collect();
            names.sort_by_key(|n| n.to_lowercase());
            names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));

            let result = query_records(
                self.gateway.as_ref(),
                &self.commands,
                self.query_timeout,
                kind,
                &names,
            )
            .await;
            if let Err(err) = &result {
                log::warn!("Metadata query for {} {kind} component(s) failed: {err}", names.len());
            }

            let fetched_at = self.clock.now();
            let commit = !cancel.is_some_and(|token| token.is_cancelled());
            let mut entries = self.entries.write();
            for component in chunk {
                let entry = entry_for(&component.identity, &result, fetched_at);
                if commit && entry.is_cacheable() {
                    entries.insert(component.key.clone(), entry.clone());
                }
                resolved.insert(component.key.clone(), entry);
            }
        }

        resolved
    }

    /// Cached entry of any age, without suspending
    pub fn cached(&self, path: &Path) -> Option<MetadataStatusEntry> {
        self.cached_by_key(&canonical_key(path))
    }

    pub fn cached_by_key(&self, key: &CacheKey) -> Option<MetadataStatusEntry> {
        self.entries.read().get(key).cloned()
    }

    pub fn is_fresh_entry(&self, entry: &MetadataStatusEntry) -> bool {
        is_fresh(entry.cached_at, self.clock.now(), self.ttl)
    }

    /// Replace the entry for `key` (used when restoring a snapshot)
    pub fn insert(&self, key: CacheKey, entry: MetadataStatusEntry) {
        if entry.is_cacheable() {
            self.entries.write().insert(key, entry);
        }
    }

    pub fn snapshot(&self) -> Vec<(CacheKey, MetadataStatusEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Drop the entry shared by `path` and its sidecar
    pub fn invalidate(&self, path: &Path) {
        self.entries.write().remove(&canonical_key(path));
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        self.flight.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Records returned for one kind, keyed by lower-cased API name
async fn query_records(
    gateway: &dyn CommandGateway,
    commands: &CommandBuilder,
    timeout: std::time::Duration,
    kind: ComponentKind,
    names: &[String],
) -> Result<HashMap<String, MetadataRecord>> {
    let command = commands.metadata_status_query(kind, names);
    let raw = gateway.execute(&command, timeout).await?;
    let result: QueryResult<MetadataRecord> = parse_cli_result(&raw)?;
    Ok(result
        .records
        .into_iter()
        .filter_map(|record| {
            let name = record.api_name()?.to_lowercase();
            Some((name, record))
        })
        .collect())
}

fn entry_for(
    identity: &ComponentIdentity,
    result: &Result<HashMap<String, MetadataRecord>>,
    now: DateTime<Utc>,
) -> MetadataStatusEntry {
    match result {
        Ok(records) => match records.get(&identity.name.to_lowercase()) {
            Some(record) => MetadataStatusEntry::from_record(identity.clone(), record, now),
            None => MetadataStatusEntry::not_found(identity.clone(), now),
        },
        Err(err) => MetadataStatusEntry::failed(identity.clone(), SyncFailure::from(err), now),
    }
}
