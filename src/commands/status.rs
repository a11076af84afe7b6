use crate::core::{
    colors::{format_file_line, state_style},
    command_init::{CommandContext, GlobalOptions},
    error::Result,
    output::{print_detail, print_info},
    sync_status::{FileSyncStatus, SyncState},
};
use colored::*;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Print every tracked file grouped by its last known state. Never calls the org.
pub async fn execute_status(options: &GlobalOptions) -> Result<()> {
    let context = CommandContext::initialize(options)?;
    let tracker = context.tracker();

    println!();
    print_detail("Project", &context.project_root.display().to_string());
    print_detail(
        "Org",
        context.config.target_org.as_deref().unwrap_or("default"),
    );

    let units = tracker.discover();
    if units.is_empty() {
        print_info("No Salesforce components found in this project");
        return Ok(());
    }

    let mut groups: BTreeMap<u8, Vec<(PathBuf, FileSyncStatus)>> = BTreeMap::new();
    for unit in &units {
        for member in &unit.members {
            let status = tracker.file_status(member);
            groups
                .entry(status.state.sort_priority())
                .or_default()
                .push((member.clone(), status));
        }
    }

    let mut index = 1;
    for files in groups.values() {
        let state = files[0].1.state;
        print_group_header(state, files.len());
        for (path, status) in files {
            let mut line = format_file_line(index, state, &path.display().to_string());
            if let Some(author) = status.last_modified_by() {
                let marker = if status.recently_modified { "*" } else { "" };
                line.push_str(&format!("  {}", format!("({author}{marker})").bright_black()));
            }
            if status.is_stale {
                line.push_str(&format!(" {}", "stale".bright_black()));
            }
            println!("{line}");
            index += 1;
        }
    }
    println!();

    if groups.len() == 1 && groups.contains_key(&SyncState::NotCompared.sort_priority()) {
        println!(
            "{}",
            "Nothing compared yet. Run `sf-sync scan` to check against the org.".bright_black()
        );
        println!();
    }

    Ok(())
}

fn print_group_header(state: SyncState, count: usize) {
    let style = state_style(state);
    let title = match state {
        SyncState::InSync => "In sync",
        SyncState::LocalChanged => "Changed locally",
        SyncState::RemoteNewer => "Newer in org",
        SyncState::UnknownDirection => "Different (direction unknown)",
        SyncState::New => "Not in org",
        SyncState::Error => "Status unavailable",
        SyncState::NotCompared => "Not compared",
        SyncState::Unsupported => "Untracked",
    };
    println!("\n{} {}", style(&format!("➤ {title}")), format!("({count})").bright_black());
}
