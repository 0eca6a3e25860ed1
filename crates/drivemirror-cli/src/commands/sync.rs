use std::path::{Path, PathBuf};
use std::sync::Arc;

use drivemirror_core::provider::MemoryProvider;
use drivemirror_core::sync::SyncProgress;
use drivemirror_core::util::compact_text;
use drivemirror_core::{
    CleanupMode, ConflictStrategy, EngineConfig, SessionStatus, SyncEngine, SyncOptions,
};

use crate::commands::common::{format_session_summary, normalize_root_id, open_store, read_listing};
use crate::error::CliError;

#[derive(Debug, Clone, Default)]
pub struct SyncArgs {
    pub listing: PathBuf,
    pub strategy: Option<ConflictStrategy>,
    pub cleanup: Option<CleanupMode>,
    pub dry_run: bool,
    pub confirm_hard_delete: bool,
    pub batch_size: Option<usize>,
    pub max_depth: Option<usize>,
    pub no_recursive: bool,
}

/// Layer command-line flags over the engine config
pub fn build_sync_options(config: &EngineConfig, args: &SyncArgs) -> Result<SyncOptions, CliError> {
    let mut options = SyncOptions::from_config(config).with_dry_run(args.dry_run);
    if let Some(strategy) = args.strategy {
        options = options.with_strategy(strategy);
    }
    if let Some(cleanup) = args.cleanup {
        options = options.with_cleanup(cleanup);
    }
    if let Some(batch_size) = args.batch_size {
        options = options.with_batch_size(batch_size);
    }
    if let Some(max_depth) = args.max_depth {
        options.max_depth = max_depth;
    }
    if args.no_recursive {
        options.recursive = false;
    }
    options.confirm_hard_delete = args.confirm_hard_delete;
    options.validate()?;
    Ok(options)
}

pub async fn run_sync(
    root_id: &str,
    args: &SyncArgs,
    config: &EngineConfig,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let root_id = normalize_root_id(root_id)?;
    let options = build_sync_options(config, args)?.with_progress(|progress: SyncProgress| {
        tracing::debug!(
            phase = progress.phase.as_str(),
            current = progress.current,
            total = progress.total,
            "Sync progress"
        );
    });

    let nodes = read_listing(&args.listing)?;
    tracing::debug!(nodes = nodes.len(), listing = %args.listing.display(), "Listing loaded");
    let provider = Arc::new(MemoryProvider::from_listing(nodes));
    let store = Arc::new(open_store(db_path)?);
    let engine = SyncEngine::new(provider, store);

    let cancel = options.cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current batch");
            cancel.cancel();
        }
    });
    let outcome = engine.run_sync(&root_id, options).await;
    interrupt.abort();
    let record = outcome?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{}", format_session_summary(&record));
        for error in &record.errors {
            println!("  error: {}", compact_text(error));
        }
    }

    if record.status == SessionStatus::Failed {
        return Err(CliError::SessionFailed {
            session_id: record.session_id.to_string(),
        });
    }
    Ok(())
}
