//! Removal of mirror rows whose remote node is gone

use std::sync::Arc;

use crate::db::MirrorStore;
use crate::error::{Error, Result};
use crate::models::{CleanupMode, MirrorRecord};

use super::applier::BatchFailure;
use super::options::{SyncOptions, SyncPhase};
use super::retry::with_retry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupResult {
    pub mode: CleanupMode,
    pub dry_run: bool,
    /// Rows the cleanup touched, or would touch in a dry run
    pub affected: Vec<String>,
    /// Rows actually soft- or hard-deleted
    pub applied: usize,
    pub failures: Vec<BatchFailure>,
    pub aborted: bool,
    pub cancelled: bool,
}

impl CleanupResult {
    fn empty(mode: CleanupMode, dry_run: bool) -> Self {
        Self {
            mode,
            dry_run,
            affected: Vec::new(),
            applied: 0,
            failures: Vec::new(),
            aborted: false,
            cancelled: false,
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.aborted && !self.cancelled
    }
}

/// Applies the session's cleanup mode to deleted rows
pub struct CleanupReconciler {
    store: Arc<dyn MirrorStore>,
}

impl CleanupReconciler {
    #[must_use]
    pub fn new(store: Arc<dyn MirrorStore>) -> Self {
        Self { store }
    }

    pub async fn reconcile(
        &self,
        deleted: &[MirrorRecord],
        options: &SyncOptions,
    ) -> Result<CleanupResult> {
        let mode = options.cleanup_mode;
        let mut result = CleanupResult::empty(mode, options.dry_run);
        if mode == CleanupMode::None {
            return Ok(result);
        }
        if mode == CleanupMode::Hard && !options.dry_run && !options.confirm_hard_delete {
            return Err(Error::HardDeleteNotConfirmed);
        }

        result.affected = deleted.iter().map(|record| record.id.clone()).collect();
        if options.dry_run {
            tracing::info!(
                mode = mode.as_str(),
                rows = result.affected.len(),
                "Dry run: cleanup would affect rows"
            );
            return Ok(result);
        }

        let total = result.affected.len();
        let deleted_at = crate::util::unix_millis_now();
        let mut processed = 0;
        for (index, ids) in result
            .affected
            .clone()
            .chunks(options.batch_size.max(1))
            .enumerate()
        {
            if options.cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }
            let batch = index + 1;
            let outcome = with_retry(
                &options.retry,
                "cleanup_batch",
                |_: &Error| true,
                move || async move {
                    match mode {
                        CleanupMode::Hard => self.store.hard_delete_batch(ids).await,
                        _ => self.store.soft_delete_batch(ids, deleted_at).await,
                    }
                },
            )
            .await;

            processed += ids.len();
            match outcome {
                Ok(changed) => {
                    result.applied += changed;
                    tracing::debug!(batch, rows = changed, mode = mode.as_str(), "Cleanup batch applied");
                }
                Err(exhausted) => {
                    tracing::warn!(
                        batch,
                        attempts = exhausted.attempts,
                        error = %exhausted.error,
                        "Cleanup batch failed"
                    );
                    result.failures.push(BatchFailure {
                        batch,
                        ids: ids.to_vec(),
                        attempts: exhausted.attempts,
                        message: exhausted.error.to_string(),
                    });
                    if !options.continue_on_batch_error {
                        result.aborted = true;
                    }
                }
            }
            options.report(SyncPhase::Cleanup, processed, total);
            if result.aborted {
                break;
            }
        }

        Ok(result)
    }
}
