use crate::core::{
    command_init::{CommandContext, GlobalOptions},
    error::Result,
    output::{print_info, print_success},
    state::delete_snapshot,
};

pub fn execute_clear_cache(options: &GlobalOptions) -> Result<()> {
    let context = CommandContext::initialize(options)?;
    if delete_snapshot(&context.project_root)? {
        print_success("Cleared cached sync status");
        println!();
    } else {
        print_info("No cached sync status for this project");
    }
    Ok(())
}
