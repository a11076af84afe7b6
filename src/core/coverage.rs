//! Apex code coverage cache.
//!
//! Coverage is looked up in two steps: the component's record id, then the
//! aggregate coverage row for that id. Lookups are single-flight per identity and
//! cached for their own TTL (five minutes by default), independent of the sync
//! caches.

use crate::core::{
    clock::{is_fresh, SharedClock},
    component::{ComponentIdentity, ComponentKind},
    error::{Result, SyncFailure},
    gateway::{parse_cli_result, CommandGateway},
    query::{CommandBuilder, CoverageRecord, IdRecord, QueryResult},
    single_flight::SingleFlight,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageEntry {
    pub identity: ComponentIdentity,
    pub covered_lines: u32,
    pub uncovered_lines: u32,
    pub percentage: u8,
    pub covered_line_numbers: Vec<u32>,
    pub uncovered_line_numbers: Vec<u32>,
    pub cached_at: DateTime<Utc>,
}

impl CoverageEntry {
    pub fn new(
        identity: ComponentIdentity,
        record: &CoverageRecord,
        now: DateTime<Utc>,
    ) -> Self {
        let covered_lines = record.num_lines_covered.unwrap_or(0);
        let uncovered_lines = record.num_lines_uncovered.unwrap_or(0);
        let lines = record.coverage.clone().unwrap_or_default();
        Self {
            identity,
            covered_lines,
            uncovered_lines,
            percentage: coverage_percentage(covered_lines, uncovered_lines),
            covered_line_numbers: lines.covered_lines,
            uncovered_line_numbers: lines.uncovered_lines,
            cached_at: now,
        }
    }

    pub fn total_lines(&self) -> u32 {
        self.covered_lines + self.uncovered_lines
    }
}

/// `round(covered / total * 100)`, 0 when there are no lines
pub fn coverage_percentage(covered: u32, uncovered: u32) -> u8 {
    let total = covered as u64 + uncovered as u64;
    if total == 0 {
        return 0;
    }
    ((covered as f64 / total as f64) * 100.0).round() as u8
}

pub type CoverageOutcome = std::result::Result<Option<CoverageEntry>, SyncFailure>;

#[derive(Clone)]
struct Cached {
    entry: Option<CoverageEntry>,
    cached_at: DateTime<Utc>,
}

type CoverageKey = (ComponentKind, String);

pub struct CoverageCache {
    gateway: Arc<dyn CommandGateway>,
    commands: CommandBuilder,
    clock: SharedClock,
    ttl: Duration,
    timeout: std::time::Duration,
    entries: Arc<RwLock<HashMap<CoverageKey, Cached>>>,
    flight: SingleFlight<CoverageKey, CoverageOutcome>,
}

impl CoverageCache {
    pub fn new(
        gateway: Arc<dyn CommandGateway>,
        commands: CommandBuilder,
        clock: SharedClock,
        ttl: Duration,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            gateway,
            commands,
            clock,
            ttl,
            timeout,
            entries: Arc::new(RwLock::new(HashMap::new())),
            flight: SingleFlight::new(),
        }
    }

    /// Coverage for one class or trigger.
    ///
    /// `Ok(None)` means the component has no coverage data (never tested, absent
    /// from the org, or a kind without coverage).
    pub async fn get_coverage(&self, identity: &ComponentIdentity) -> CoverageOutcome {
        if !identity.kind.has_coverage() {
            return Ok(None);
        }

        let key = identity.match_key();
        let now = self.clock.now();
        if let Some(cached) = self.entries.read().get(&key) {
            if is_fresh(cached.cached_at, now, self.ttl) {
                log::debug!("Coverage cache hit: {identity}");
                return Ok(cached.entry.clone());
            }
        }
        log::debug!("Coverage cache miss: {identity}");

        let gateway = self.gateway.clone();
        let commands = self.commands.clone();
        let clock = self.clock.clone();
        let entries = self.entries.clone();
        let timeout = self.timeout;
        let identity = identity.clone();

        self.flight
            .run(key.clone(), move || async move {
                match fetch_coverage(gateway.as_ref(), &commands, timeout, &identity, &clock).await {
                    Ok(entry) => {
                        let cached_at = clock.now();
                        entries.write().insert(
                            key,
                            Cached {
                                entry: entry.clone(),
                                cached_at,
                            },
                        );
                        Ok(entry)
                    }
                    Err(err) => {
                        log::warn!("Coverage lookup for {identity} failed: {err}");
                        Err(SyncFailure::from(&err))
                    }
                }
            })
            .await
    }

    /// Coverage for several components, looked up one after another
    pub async fn get_coverage_batch(
        &self,
        identities: &[ComponentIdentity],
    ) -> Vec<(ComponentIdentity, CoverageOutcome)> {
        let mut results = Vec::with_capacity(identities.len());
        for identity in identities {
            let outcome = self.get_coverage(identity).await;
            results.push((identity.clone(), outcome));
        }
        results
    }

    pub fn invalidate(&self, identity: &ComponentIdentity) {
        self.entries.write().remove(&identity.match_key());
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

async fn fetch_coverage(
    gateway: &dyn CommandGateway,
    commands: &CommandBuilder,
    timeout: std::time::Duration,
    identity: &ComponentIdentity,
    clock: &SharedClock,
) -> Result<Option<CoverageEntry>> {
    let raw = gateway
        .execute(&commands.component_id_query(identity), timeout)
        .await?;
    let ids: QueryResult<IdRecord> = parse_cli_result(&raw)?;
    let Some(id) = ids.records.into_iter().next().map(|r| r.id) else {
        return Ok(None);
    };

    let raw = gateway.execute(&commands.coverage_query(&id), timeout).await?;
    let rows: QueryResult<CoverageRecord> = parse_cli_result(&raw)?;
    Ok(rows
        .records
        .first()
        .map(|record| CoverageEntry::new(identity.clone(), record, clock.now())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::CoverageLines;

    #[test]
    fn test_percentage_rounds() {
        assert_eq!(coverage_percentage(2, 1), 67);
        assert_eq!(coverage_percentage(1, 2), 33);
        assert_eq!(coverage_percentage(1, 1), 50);
        assert_eq!(coverage_percentage(10, 0), 100);
    }

    #[test]
    fn test_percentage_of_nothing_is_zero() {
        assert_eq!(coverage_percentage(0, 0), 0);
    }

    #[test]
    fn test_entry_from_record() {
        let record = CoverageRecord {
            num_lines_covered: Some(3),
            num_lines_uncovered: Some(1),
            coverage: Some(CoverageLines {
                covered_lines: vec![1, 2, 3],
                uncovered_lines: vec![7],
            }),
        };
        let entry = CoverageEntry::new(
            ComponentIdentity::new(ComponentKind::ApexClass, "Foo"),
            &record,
            Utc::now(),
        );
        assert_eq!(entry.percentage, 75);
        assert_eq!(entry.total_lines(), 4);
        assert_eq!(entry.uncovered_line_numbers, vec![7]);
    }
}
