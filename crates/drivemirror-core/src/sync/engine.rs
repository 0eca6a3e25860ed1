//! Sync session orchestration

use std::fmt;
use std::sync::Arc;

use crate::db::MirrorStore;
use crate::error::{Error, Result};
use crate::models::{SessionStatus, SyncCheckpoint, SyncSessionRecord};
use crate::provider::RemoteProvider;

use super::applier::{plan_writes, BatchApplier, WriteOp};
use super::cleanup::CleanupReconciler;
use super::conflict::resolve_change_set;
use super::detector::{ChangeDetector, DetectOptions};
use super::lock::SessionLocks;
use super::options::SyncOptions;
use super::path::PathResolver;
use super::retry::with_retry;

/// Steps of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    LoadingCheckpoint,
    DetectingChanges,
    ResolvingConflicts,
    ApplyingBatches,
    ReconcilingDeletions,
    PersistingCheckpoint,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl SessionState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithErrors | Self::Failed)
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Self::Failed)
                | (Self::Idle, Self::LoadingCheckpoint)
                | (Self::LoadingCheckpoint, Self::DetectingChanges)
                | (Self::DetectingChanges, Self::ResolvingConflicts)
                | (Self::ResolvingConflicts, Self::ApplyingBatches)
                | (
                    Self::ApplyingBatches,
                    Self::ReconcilingDeletions | Self::CompletedWithErrors
                )
                | (
                    Self::ReconcilingDeletions,
                    Self::PersistingCheckpoint | Self::CompletedWithErrors
                )
                | (
                    Self::PersistingCheckpoint,
                    Self::Completed | Self::CompletedWithErrors
                )
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LoadingCheckpoint => "loading_checkpoint",
            Self::DetectingChanges => "detecting_changes",
            Self::ResolvingConflicts => "resolving_conflicts",
            Self::ApplyingBatches => "applying_batches",
            Self::ReconcilingDeletions => "reconciling_deletions",
            Self::PersistingCheckpoint => "persisting_checkpoint",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Tracker<'a> {
    root_id: &'a str,
    state: SessionState,
}

impl Tracker<'_> {
    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid session transition {} -> {next}",
            self.state
        );
        tracing::debug!(root_id = self.root_id, from = %self.state, to = %next, "Session state");
        self.state = next;
    }
}

fn ensure_not_cancelled(options: &SyncOptions) -> Result<()> {
    if options.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Runs sync sessions between one provider and one mirror store
#[derive(Clone)]
pub struct SyncEngine {
    provider: Arc<dyn RemoteProvider>,
    store: Arc<dyn MirrorStore>,
    locks: SessionLocks,
}

impl SyncEngine {
    /// Engine with its own session locks.
    ///
    /// Locks only exclude sessions of engines that share them; give every
    /// engine writing to the same store one [`SessionLocks`] via
    /// [`SyncEngine::with_locks`].
    #[must_use]
    pub fn new(provider: Arc<dyn RemoteProvider>, store: Arc<dyn MirrorStore>) -> Self {
        Self {
            provider,
            store,
            locks: SessionLocks::new(),
        }
    }

    /// Share session locks with other engines working on the same store
    #[must_use]
    pub fn with_locks(mut self, locks: SessionLocks) -> Self {
        self.locks = locks;
        self
    }

    #[must_use]
    pub const fn locks(&self) -> &SessionLocks {
        &self.locks
    }

    /// Run one sync session for `root_id`.
    ///
    /// Invalid options and lock contention are returned as errors before a
    /// session starts. Once started, every outcome (including failure) is
    /// reported through the returned record, which is also appended to the
    /// session history.
    pub async fn run_sync(&self, root_id: &str, options: SyncOptions) -> Result<SyncSessionRecord> {
        options.validate()?;
        let _lock = self.locks.try_acquire(root_id)?;

        let mut record =
            SyncSessionRecord::start(root_id, options.conflict_strategy, options.dry_run);
        tracing::info!(
            session_id = %record.session_id,
            root_id,
            strategy = options.conflict_strategy.as_str(),
            cleanup = options.cleanup_mode.as_str(),
            dry_run = options.dry_run,
            "Sync session started"
        );

        let mut tracker = Tracker {
            root_id,
            state: SessionState::Idle,
        };
        let status = match self.execute(root_id, &options, &mut record, &mut tracker).await {
            Ok(()) if record.errors.is_empty() => {
                tracker.advance(SessionState::Completed);
                SessionStatus::Completed
            }
            Ok(()) => {
                tracker.advance(SessionState::CompletedWithErrors);
                SessionStatus::CompletedWithErrors
            }
            Err(error) => {
                tracing::error!(
                    session_id = %record.session_id,
                    root_id,
                    state = %tracker.state,
                    error = %error,
                    "Sync session failed"
                );
                tracker.advance(SessionState::Failed);
                record.push_error(error.to_string());
                SessionStatus::Failed
            }
        };
        record.finish(status);

        if let Err(error) = self.store.append_session_record(&record).await {
            tracing::warn!(session_id = %record.session_id, error = %error, "Failed to append session record");
            record.push_error(format!("Failed to append session record: {error}"));
        }

        tracing::info!(
            session_id = %record.session_id,
            root_id,
            status = record.status.as_str(),
            detected = record.counts.detected,
            added = record.counts.added,
            updated = record.counts.updated,
            deleted = record.counts.deleted,
            skipped = record.counts.skipped,
            errors = record.counts.errors,
            "Sync session finished"
        );
        Ok(record)
    }

    async fn execute(
        &self,
        root_id: &str,
        options: &SyncOptions,
        record: &mut SyncSessionRecord,
        tracker: &mut Tracker<'_>,
    ) -> Result<()> {
        tracker.advance(SessionState::LoadingCheckpoint);
        let checkpoint = self.store.load_checkpoint(root_id).await?;
        ensure_not_cancelled(options)?;

        tracker.advance(SessionState::DetectingChanges);
        let detector = ChangeDetector::new(self.provider.as_ref(), self.store.as_ref());
        let detection = detector
            .detect_changes(
                root_id,
                checkpoint.as_ref(),
                &DetectOptions {
                    recursive: options.recursive,
                    max_depth: options.max_depth,
                    retry: options.retry,
                },
            )
            .await?;
        let change_set = &detection.change_set;
        record.counts.detected = change_set.len();
        tracing::info!(
            root_id,
            mode = detection.mode.as_str(),
            added = change_set.added.len(),
            modified = change_set.modified.len(),
            deleted = change_set.deleted.len(),
            "Changes detected"
        );
        ensure_not_cancelled(options)?;

        tracker.advance(SessionState::ResolvingConflicts);
        let synced_at = crate::util::unix_millis_now();
        let resolved = resolve_change_set(change_set, root_id, options.conflict_strategy, synced_at);
        record.counts.skipped = resolved.unchanged.len();
        let mut paths = PathResolver::new(root_id, options.max_depth);
        let plan = plan_writes(resolved, &detection.mirror, &change_set.deleted, &mut paths);
        for excluded in &plan.excluded {
            record.push_error(excluded.to_string());
        }
        ensure_not_cancelled(options)?;

        tracker.advance(SessionState::ApplyingBatches);
        let mut clean = true;
        if options.dry_run {
            record.counts.added = plan.count(WriteOp::Insert);
            record.counts.updated = plan.count(WriteOp::Update) + plan.count(WriteOp::Refresh);
            tracing::info!(root_id, writes = plan.len(), "Dry run: skipping mirror writes");
        } else {
            let applied = BatchApplier::new(Arc::clone(&self.store))
                .apply(plan, options)
                .await;
            record.counts.added = applied.inserted;
            record.counts.updated = applied.updated + applied.refreshed;
            if applied.cancelled {
                for failure in &applied.failures {
                    record.push_error(failure.to_error().to_string());
                }
                return Err(Error::Cancelled);
            }
            if let Some((first, rest)) = applied.failures.split_first() {
                for failure in rest {
                    record.push_error(failure.to_error().to_string());
                }
                if applied.aborted {
                    return Err(first.to_error());
                }
                record.push_error(first.to_error().to_string());
                clean = false;
            }
        }
        ensure_not_cancelled(options)?;

        tracker.advance(SessionState::ReconcilingDeletions);
        let cleanup = CleanupReconciler::new(Arc::clone(&self.store))
            .reconcile(&change_set.deleted, options)
            .await?;
        record.counts.deleted = if options.dry_run {
            cleanup.affected.len()
        } else {
            cleanup.applied
        };
        if cleanup.cancelled {
            return Err(Error::Cancelled);
        }
        if let Some((first, rest)) = cleanup.failures.split_first() {
            for failure in rest {
                record.push_error(failure.to_error().to_string());
            }
            if cleanup.aborted {
                return Err(first.to_error());
            }
            record.push_error(first.to_error().to_string());
            clean = false;
        }

        if !clean {
            tracing::warn!(root_id, "Batch failures absorbed, checkpoint left unchanged");
            return Ok(());
        }
        ensure_not_cancelled(options)?;

        tracker.advance(SessionState::PersistingCheckpoint);
        if options.dry_run {
            tracing::debug!(root_id, "Dry run: checkpoint left unchanged");
            return Ok(());
        }
        let next = SyncCheckpoint::new(
            root_id,
            crate::util::unix_millis_now(),
            detection.cursor.clone(),
        );
        with_retry(&options.retry, "save_checkpoint", |_: &Error| true, || {
            self.store.save_checkpoint(&next)
        })
        .await
        .map_err(|exhausted| Error::CheckpointPersist {
            root_id: root_id.to_string(),
            message: exhausted.error.to_string(),
        })?;
        tracing::debug!(root_id, cursor = ?next.last_cursor_token, "Checkpoint advanced");
        Ok(())
    }
}
