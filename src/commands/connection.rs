use crate::core::{
    command_init::{CommandContext, GlobalOptions},
    error::Result,
    output::{print_detail, print_success},
};

/// Check the org connection; a failure is returned so the process exits non-zero
pub async fn execute_connection(options: &GlobalOptions) -> Result<()> {
    let context = CommandContext::initialize(options)?;
    let tracker = context.tracker();
    let state = tracker.check_connection().await;

    if let Some(failure) = state.error {
        return Err(failure.into());
    }

    print_success("Connected");
    print_detail("Org", state.identity.as_deref().unwrap_or("unknown"));
    if let Some(checked) = state.last_checked {
        print_detail("Checked", &checked.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    }
    println!();
    Ok(())
}
