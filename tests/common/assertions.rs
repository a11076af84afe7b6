//! Common assertion helpers for test output validation
//!
//! Provides predicates for validating sf-sync command output and error
//! messages, plus a few checks on library results.

#![allow(dead_code)]

use predicates::prelude::*;
use sf_sync_tracker::core::{CompareOutcome, ErrorKind, SyncState};

/// Creates a predicate that checks for the missing project error
pub fn not_in_project() -> impl Predicate<str> {
    predicates::str::contains("Not in a Salesforce project")
}

/// Creates a predicate that checks for the missing CLI error
pub fn cli_missing() -> impl Predicate<str> {
    predicates::str::contains("Salesforce CLI not found")
}

/// Creates a predicate that checks for numbered file indices
pub fn has_file_index(index: u32) -> impl Predicate<str> {
    predicates::str::contains(format!("[{}]", index))
}

/// Creates a predicate that checks for a sync state section header
pub fn has_state(state: SyncState) -> impl Predicate<str> {
    predicates::str::contains(state.description())
}

/// The comparison succeeded and maps to `expected`
pub fn assert_state(outcome: &CompareOutcome, expected: SyncState) {
    match outcome {
        Ok(result) => assert_eq!(SyncState::from_diff(result), expected, "{result:?}"),
        Err(failure) => panic!("expected {expected:?}, comparison failed: {failure}"),
    }
}

/// The comparison failed with `expected`
pub fn assert_failure(outcome: &CompareOutcome, expected: ErrorKind) {
    match outcome {
        Ok(result) => panic!("expected {expected} failure, got {result:?}"),
        Err(failure) => assert_eq!(failure.kind, expected, "{failure}"),
    }
}
