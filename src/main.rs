use clap::{Parser, Subcommand};
use sf_sync_tracker::commands::*;
use sf_sync_tracker::core::{
    command_init::GlobalOptions,
    error::{Result, SyncError},
    print_error, print_error_with_hint,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sf-sync")]
#[command(about = "Track whether local Salesforce metadata is in sync with an org")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Project directory (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    project: Option<PathBuf>,

    /// Org alias or username to use instead of the configured default
    #[arg(long, global = true, value_name = "ORG")]
    target_org: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show numbered files grouped by their last known sync state
    Status,
    /// Fetch org metadata and compare every component
    Scan,
    /// Compare specific files with the org
    Compare {
        /// Files to compare
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Show code coverage for Apex classes and triggers
    Coverage {
        /// Apex class or trigger files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Check the connection to the org
    Connection,
    /// Delete the cached sync status for this project
    ClearCache,
}

fn report(e: &SyncError) {
    match e {
        SyncError::NotInProject => print_error("Not in a Salesforce project"),
        _ => match e.remediation_hint() {
            Some(hint) => print_error_with_hint(&e.to_string(), hint),
            None => print_error(&e.to_string()),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let options = GlobalOptions {
        project: cli.project,
        target_org: cli.target_org,
    };

    let result = match cli.command {
        Commands::Status => execute_status(&options).await,
        Commands::Scan => execute_scan(&options).await,
        Commands::Compare { paths } => execute_compare(&options, paths).await,
        Commands::Coverage { paths } => execute_coverage(&options, paths).await,
        Commands::Connection => execute_connection(&options).await,
        Commands::ClearCache => execute_clear_cache(&options),
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(1);
    }

    Ok(())
}
