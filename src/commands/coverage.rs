use crate::core::{
    colors::colored_percentage,
    command_init::{CommandContext, GlobalOptions},
    component::classify,
    error::Result,
    output::print_warning,
};
use colored::*;
use std::path::PathBuf;

/// Print code coverage for each Apex class or trigger given
pub async fn execute_coverage(options: &GlobalOptions, paths: Vec<PathBuf>) -> Result<()> {
    let context = CommandContext::initialize(options)?;
    if !context.config.features.coverage {
        print_warning("Coverage is disabled in the configuration");
        return Ok(());
    }
    let tracker = context.tracker();

    let mut identities = Vec::new();
    for path in &paths {
        let relative = tracker.relative(&context.resolve(path));
        match classify(&relative) {
            Some(component) if component.identity.kind.has_coverage() => {
                if !identities.contains(&component.identity) {
                    identities.push(component.identity);
                }
            }
            _ => print_warning(&format!(
                "{} is not an Apex class or trigger",
                relative.display()
            )),
        }
    }

    println!();
    for (identity, outcome) in tracker.coverage_batch(&identities).await {
        let name = format!("{:<40}", identity.name);
        match outcome {
            Ok(Some(entry)) => println!(
                "{} {}  {}",
                name,
                colored_percentage(entry.percentage),
                format!("{}/{} lines", entry.covered_lines, entry.total_lines()).bright_black()
            ),
            Ok(None) => println!("{} {}", name, "no coverage data".bright_black()),
            Err(failure) => println!("{} {}", name, failure.message.red()),
        }
    }
    println!();
    Ok(())
}
