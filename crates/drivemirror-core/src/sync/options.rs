//! Per-session options and progress reporting

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{EngineConfig, RetryPolicy};
use crate::error::{Error, Result};
use crate::models::{CleanupMode, ConflictStrategy};

/// Which batched phase a progress report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Applying,
    Cleanup,
}

impl SyncPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applying => "applying",
            Self::Cleanup => "cleanup",
        }
    }
}

/// Cumulative progress, reported once per finished batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    pub phase: SyncPhase,
    /// Records handled so far in this phase
    pub current: usize,
    /// Records this phase will handle
    pub total: usize,
}

pub type ProgressCallback = Arc<dyn Fn(SyncProgress) + Send + Sync>;

/// Options for one `run_sync` call
#[derive(Clone)]
pub struct SyncOptions {
    pub recursive: bool,
    pub max_depth: usize,
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    pub conflict_strategy: ConflictStrategy,
    pub cleanup_mode: CleanupMode,
    pub dry_run: bool,
    /// Required for `CleanupMode::Hard` outside dry runs
    pub confirm_hard_delete: bool,
    pub continue_on_batch_error: bool,
    pub retry: RetryPolicy,
    pub on_progress: Option<ProgressCallback>,
    /// Checked between batches and between phases
    pub cancel: CancellationToken,
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncOptions")
            .field("recursive", &self.recursive)
            .field("max_depth", &self.max_depth)
            .field("batch_size", &self.batch_size)
            .field("max_concurrent_batches", &self.max_concurrent_batches)
            .field("conflict_strategy", &self.conflict_strategy)
            .field("cleanup_mode", &self.cleanup_mode)
            .field("dry_run", &self.dry_run)
            .field("confirm_hard_delete", &self.confirm_hard_delete)
            .field("continue_on_batch_error", &self.continue_on_batch_error)
            .field("retry", &self.retry)
            .field("on_progress", &self.on_progress.as_ref().map(|_| "<callback>"))
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl SyncOptions {
    /// Options seeded from process-wide defaults
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            recursive: config.recursive,
            max_depth: config.max_depth,
            batch_size: config.batch_size,
            max_concurrent_batches: config.max_concurrent_batches,
            conflict_strategy: config.conflict_strategy,
            cleanup_mode: config.cleanup_mode,
            dry_run: false,
            confirm_hard_delete: false,
            continue_on_batch_error: config.continue_on_batch_error,
            retry: config.retry,
            on_progress: None,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_cleanup(mut self, mode: CleanupMode) -> Self {
        self.cleanup_mode = mode;
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_concurrent_batches(mut self, max: usize) -> Self {
        self.max_concurrent_batches = max;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, callback: impl Fn(SyncProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidInput("batch_size must be at least 1".into()));
        }
        if self.max_concurrent_batches == 0 {
            return Err(Error::InvalidInput(
                "max_concurrent_batches must be at least 1".into(),
            ));
        }
        if self.max_depth == 0 {
            return Err(Error::InvalidInput("max_depth must be at least 1".into()));
        }
        if self.cleanup_mode == CleanupMode::Hard && !self.dry_run && !self.confirm_hard_delete {
            return Err(Error::HardDeleteNotConfirmed);
        }
        Ok(())
    }

    pub(crate) fn report(&self, phase: SyncPhase, current: usize, total: usize) {
        if let Some(callback) = &self.on_progress {
            callback(SyncProgress {
                phase,
                current,
                total,
            });
        }
    }
}
