use crate::core::{
    command_init::{CommandContext, GlobalOptions},
    error::Result,
    events::{PrefetchSummary, SyncEvent},
    output::{print_success, print_warning},
};
use colored::*;
use tokio::sync::broadcast::error::RecvError;

/// Check the org connection, reconcile every component and persist the result
pub async fn execute_scan(options: &GlobalOptions) -> Result<()> {
    let context = CommandContext::initialize(options)?;
    let tracker = context.tracker();

    let connection = tracker.check_connection().await;
    if let Some(failure) = connection.error {
        return Err(failure.into());
    }

    let mut events = tracker.subscribe();
    let printer = tokio::spawn(async move {
        let mut last_step = None;
        loop {
            match events.recv().await {
                Ok(SyncEvent::Progress { phase, percent, .. }) => {
                    // At most one line per 10% step
                    let step = percent / 10;
                    if last_step != Some(step) {
                        last_step = Some(step);
                        println!("{} {}", format!("{percent:>3}%").bright_black(), phase.label());
                    }
                }
                Ok(SyncEvent::ScanFinished(_)) | Err(RecvError::Closed) => break,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
            }
        }
    });

    let summary = tracker.prefetch().await;
    if let Err(e) = printer.await {
        log::debug!("Progress printer stopped: {e}");
    }

    print_summary(&summary);
    context.persist(&tracker);
    Ok(())
}

fn print_summary(summary: &PrefetchSummary) {
    if summary.cancelled {
        print_warning("Scan was cancelled before it finished");
        return;
    }
    print_success(&format!("Scanned {} component(s)", summary.total));
    let rows = [
        ("In sync", summary.synced, "green"),
        ("Changed locally", summary.local_changed, "yellow"),
        ("Newer in org", summary.remote_newer, "red"),
        ("Direction unknown", summary.unknown_direction, "magenta"),
        ("Not in org", summary.new, "cyan"),
        ("Not compared", summary.not_compared, "white"),
        ("Errors", summary.errors, "red"),
    ];
    for (label, count, color) in rows {
        if count > 0 {
            println!("  {:<18} {}", label, count.to_string().color(color));
        }
    }
    println!();
}
