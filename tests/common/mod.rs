//! Shared test utilities for sf-sync-tracker
//!
//! Integration tests run against an on-disk Salesforce project and a scripted
//! org that answers CLI commands in memory, so nothing here needs a real org.

pub mod assertions;
pub mod fixtures;
pub mod gateway;
pub mod project;
