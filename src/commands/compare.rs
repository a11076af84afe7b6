use crate::core::{
    colors::{aligned_marker, colored_path},
    command_init::{CommandContext, GlobalOptions},
    component::{classify, ComponentKind},
    error::Result,
    sync_status::SyncState,
};
use colored::*;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Compare specific files with the org and print one line per file
pub async fn execute_compare(options: &GlobalOptions, paths: Vec<PathBuf>) -> Result<()> {
    let context = CommandContext::initialize(options)?;
    let tracker = context.tracker();
    let files: Vec<PathBuf> = paths.iter().map(|p| context.resolve(p)).collect();

    // Fresh metadata first so differences get a direction
    let mut by_kind: BTreeMap<ComponentKind, Vec<PathBuf>> = BTreeMap::new();
    for file in &files {
        if let Some(component) = classify(&tracker.relative(file)) {
            by_kind
                .entry(component.identity.kind)
                .or_default()
                .push(file.clone());
        }
    }
    for (kind, kind_files) in by_kind {
        tracker.get_status_batch(kind, &kind_files).await;
    }

    let outcomes = tracker.compare_batch(&files).await;

    println!();
    let mut failures = 0;
    for file in &files {
        let shown = context.display_path(file);
        match outcomes.get(file) {
            Some(Ok(result)) => {
                let state = SyncState::from_diff(result);
                println!(
                    "{} {}  {}",
                    aligned_marker(state),
                    colored_path(state, &shown),
                    state.description().bright_black()
                );
            }
            Some(Err(failure)) => {
                failures += 1;
                println!(
                    "{} {}  {}",
                    aligned_marker(SyncState::Error),
                    colored_path(SyncState::Error, &shown),
                    failure.message.bright_black()
                );
            }
            None => {
                failures += 1;
                println!("{} {}", aligned_marker(SyncState::Error), shown);
            }
        }
    }
    println!();

    context.persist(&tracker);

    if failures == files.len() {
        if let Some(Err(failure)) = files.iter().find_map(|f| outcomes.get(f)) {
            return Err(failure.clone().into());
        }
    }
    Ok(())
}
