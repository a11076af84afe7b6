//! Core functionality for sf-sync-tracker.
//!
//! This module provides the caches, the diff engine and the prefetch pipeline,
//! together with the error, configuration and output plumbing around them.

pub mod clock;
pub mod colors;
pub mod command_init;
pub mod component;
pub mod config;
pub mod connection;
pub mod coverage;
pub mod diff;
pub mod diff_cache;
pub mod dirs;
pub mod error;
pub mod events;
pub mod gateway;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod query;
pub mod single_flight;
pub mod state;
pub mod sync_status;
pub mod tracker;

// === Error handling ===
pub use error::{ErrorKind, Result, SyncError, SyncFailure};

// === Components and keys ===
// Path classification into remote components and the canonical cache key
pub use component::{canonical_key, classify, CacheKey, ComponentIdentity, ComponentKind, ComponentRef};

// === Remote access ===
pub use gateway::{CommandGateway, ShellGateway};
pub use query::CommandBuilder;

// === Caches ===
pub use connection::{ConnectionCache, ConnectionState};
pub use coverage::{CoverageCache, CoverageEntry};
pub use diff_cache::{DiffResult, DiffResultCache};
pub use metadata::{MetadataStatusCache, MetadataStatusEntry};

// === Reconciliation ===
pub use diff::{CompareOutcome, ContentDiffEngine};
pub use events::{EventBus, PrefetchSummary, SyncEvent};
pub use pipeline::{DiscoveredUnit, PrefetchPipeline};
pub use sync_status::{FileSyncStatus, SyncState};
pub use tracker::SyncTracker;

// === State management ===
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{DirectionPolicy, TrackerConfig};
pub use state::CacheSnapshot;

// === Output formatting ===
pub use output::{print_error, print_error_with_hint, print_info, print_success, print_warning};
