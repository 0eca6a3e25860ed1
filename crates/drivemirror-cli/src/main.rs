//! drivemirror - command-line front end for the sync engine

mod cli;
mod commands;
mod config;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::filter::Directive;

use crate::cli::{Cli, Commands};
use crate::commands::checkpoint::run_checkpoint;
use crate::commands::history::run_history;
use crate::commands::list::run_list;
use crate::commands::sync::{run_sync, SyncArgs};
use crate::config::{load_engine_config, resolve_db_path};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive: Directive = "drivemirror=info"
        .parse()
        .map_err(|error| CliError::Config(format!("Invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;

    match cli.command {
        Commands::Sync {
            root_id,
            listing,
            strategy,
            cleanup,
            dry_run,
            confirm_hard_delete,
            batch_size,
            max_depth,
            no_recursive,
            json,
        } => {
            let config = load_engine_config(cli.config)?;
            let args = SyncArgs {
                listing,
                strategy: strategy.map(Into::into),
                cleanup: cleanup.map(Into::into),
                dry_run,
                confirm_hard_delete,
                batch_size,
                max_depth,
                no_recursive,
            };
            run_sync(&root_id, &args, &config, json, &db_path).await?;
        }
        Commands::History { root, limit, json } => {
            run_history(root.as_deref(), limit, json, &db_path).await?;
        }
        Commands::Checkpoint { root_id, json } => run_checkpoint(&root_id, json, &db_path).await?,
        Commands::List {
            root_id,
            include_deleted,
            json,
        } => run_list(&root_id, include_deleted, json, &db_path).await?,
    }

    Ok(())
}
