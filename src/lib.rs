//! sf-sync-tracker - sync status between local Salesforce metadata and an org.
//!
//! The library is a cache-and-reconciliation layer in front of the Salesforce CLI:
//! it remembers who last modified each component in the org, compares local source
//! with the org's copy, and publishes per-file change events so a UI can decorate
//! files without re-querying the org on every paint.
//!
//! # Public API
//! The main entry point is [`SyncTracker`], re-exported from the [`core`] module
//! together with:
//! - The individual caches (connection, metadata, diff results, coverage)
//! - The content diff engine and the prefetch pipeline
//! - The gateway trait used to run CLI commands
//! - Error handling and result types

pub mod commands;
pub mod core;

pub use core::{
    canonical_key,
    classify,
    CacheKey,
    CommandGateway,
    ComponentIdentity,
    ComponentKind,
    DiffResult,
    // Error handling
    ErrorKind,
    EventBus,
    FileSyncStatus,
    MetadataStatusEntry,
    PrefetchSummary,
    Result,
    SyncError,
    SyncEvent,
    SyncFailure,
    SyncState,
    // Facade
    SyncTracker,
    TrackerConfig,
};
