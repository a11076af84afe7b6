//! Color mapping for sync states.
//!
//! Every place that prints a state marker or a path goes through
//! [`state_style`], so a state has the same color in lists, legends and summaries.

use crate::core::sync_status::SyncState;
use colored::*;

/// Styling closure for a sync state
pub fn state_style(state: SyncState) -> Box<dyn Fn(&str) -> ColoredString> {
    match state {
        SyncState::InSync => Box::new(|text: &str| text.green()),
        SyncState::LocalChanged => Box::new(|text: &str| text.yellow()),
        SyncState::RemoteNewer => Box::new(|text: &str| text.red().bold()),
        SyncState::UnknownDirection => Box::new(|text: &str| text.magenta()),
        SyncState::New => Box::new(|text: &str| text.cyan()),
        SyncState::Error => Box::new(|text: &str| text.red()),
        SyncState::NotCompared => Box::new(|text: &str| text.bright_black()),
        SyncState::Unsupported => Box::new(|text: &str| text.bright_black()),
    }
}

/// State marker padded to two columns
pub fn aligned_marker(state: SyncState) -> ColoredString {
    let style = state_style(state);
    style(&format!("{:<2}", state.as_str()))
}

pub fn colored_path(state: SyncState, path: &str) -> ColoredString {
    state_style(state)(path)
}

/// `[index] marker path` line used by the status listing
pub fn format_file_line(index: usize, state: SyncState, path: &str) -> String {
    let index_colored = format!("[{index}]").cyan().bold();
    format!(
        "{index_colored} {}  {}",
        aligned_marker(state),
        colored_path(state, path)
    )
}

/// Coverage percentage colored by threshold (75% is the deployment minimum)
pub fn colored_percentage(percentage: u8) -> ColoredString {
    let text = format!("{percentage:>3}%");
    match percentage {
        75..=100 => text.green(),
        50..=74 => text.yellow(),
        _ => text.red(),
    }
}
