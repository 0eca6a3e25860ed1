//! Sync reconciliation engine.
//!
//! One session, leaf-first:
//! - [`ChangeDetector`] diffs the remote subtree against the mirror
//!   (full listing or change feed)
//! - [`resolve`] decides per modified node what the mirror row becomes
//! - [`PathResolver`] derives full paths from parent chains
//! - [`BatchApplier`] writes rows in bounded, retried, concurrent batches
//! - [`CleanupReconciler`] soft- or hard-deletes rows whose node is gone
//! - [`SyncEngine`] runs the phases, guards the root with a lock and
//!   persists the checkpoint and the session record

mod applier;
mod cleanup;
mod conflict;
mod detector;
mod engine;
mod lock;
mod options;
mod path;
mod retry;


pub use applier::{
    plan_writes, ApplyResult, BatchApplier, BatchFailure, PendingWrite, WriteOp, WritePlan,
};
pub use cleanup::{CleanupReconciler, CleanupResult};
pub use conflict::{resolve, resolve_change_set, ResolvedChangeSet};
pub use detector::{
    ChangeDetector, ChangeSet, DetectOptions, Detection, DetectionMode, ModifiedEntry,
};
pub use engine::{SessionState, SyncEngine};
pub use lock::{SessionLockGuard, SessionLocks};
pub use options::{ProgressCallback, SyncOptions, SyncPhase, SyncProgress};
pub use path::{PathError, PathResolver};
pub use retry::{with_retry, RetryExhausted};
