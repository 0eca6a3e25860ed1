//! Batched, retried writes of resolved changes into the mirror store.
//!
//! Writes are grouped into waves: a row never shares a wave with its parent,
//! and every wave finishes before the next one starts, so a child is never
//! written before its parent. Batches inside a wave are independent and run
//! concurrently, bounded by a semaphore.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};

use crate::db::MirrorStore;
use crate::error::Error;
use crate::models::MirrorRecord;

use super::conflict::ResolvedChangeSet;
use super::options::{SyncOptions, SyncPhase};
use super::path::{PathError, PathResolver};
use super::retry::with_retry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    /// New row (or a soft-deleted row coming back)
    Insert,
    /// Remote-owned fields changed
    Update,
    /// Only the derived path changed, because an ancestor moved or was renamed
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub record: MirrorRecord,
    pub op: WriteOp,
}

/// Writes grouped into waves, plus the nodes left out of this pass
#[derive(Debug, Clone, Default)]
pub struct WritePlan {
    pub waves: Vec<Vec<PendingWrite>>,
    pub excluded: Vec<PathError>,
}

impl WritePlan {
    #[must_use]
    pub fn len(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waves.iter().all(Vec::is_empty)
    }

    /// Number of writes with the given op
    #[must_use]
    pub fn count(&self, op: WriteOp) -> usize {
        self.waves
            .iter()
            .flatten()
            .filter(|write| write.op == op)
            .count()
    }

    #[must_use]
    pub fn batch_count(&self, batch_size: usize) -> usize {
        let batch_size = batch_size.max(1);
        self.waves
            .iter()
            .map(|wave| wave.len().div_ceil(batch_size))
            .sum()
    }
}

/// Compute paths for every write and group the writes into waves.
///
/// `mirror` is the subtree as loaded before detection; `deleted` are the rows
/// about to be removed. Nodes whose path cannot be resolved are excluded.
#[must_use]
pub fn plan_writes(
    resolved: ResolvedChangeSet,
    mirror: &[MirrorRecord],
    deleted: &[MirrorRecord],
    paths: &mut PathResolver,
) -> WritePlan {
    let previous: HashMap<&str, &MirrorRecord> = mirror
        .iter()
        .map(|record| (record.id.as_str(), record))
        .collect();
    let deleted_ids: HashSet<&str> = deleted.iter().map(|record| record.id.as_str()).collect();

    for record in mirror.iter().filter(|record| record.is_active()) {
        paths.register_record(record);
    }
    for id in &deleted_ids {
        paths.forget(id);
    }
    let writes = resolved
        .inserts
        .into_iter()
        .map(|record| (record, WriteOp::Insert))
        .chain(resolved.updates.into_iter().map(|record| (record, WriteOp::Update)))
        .collect::<Vec<_>>();
    for (record, _) in &writes {
        paths.register_record(record);
    }

    let mut plan = WritePlan::default();
    let mut pending = Vec::with_capacity(writes.len());
    let mut hierarchy_moved = false;

    for (mut record, op) in writes {
        match paths.resolve_with_depth(&record.id) {
            Ok((path, depth)) => {
                if record.kind.is_folder() {
                    hierarchy_moved |= previous
                        .get(record.id.as_str())
                        .is_some_and(|old| old.path != path);
                }
                record.path = path;
                record.path_depth = i64::try_from(depth).unwrap_or(i64::MAX);
                pending.push(PendingWrite { record, op });
            }
            Err(error) => {
                tracing::warn!(node_id = %record.id, error = %error, "Excluding node from sync pass");
                plan.excluded.push(error);
            }
        }
    }

    if hierarchy_moved {
        let written: HashSet<String> = pending.iter().map(|w| w.record.id.clone()).collect();
        for record in mirror.iter().filter(|record| {
            record.is_active()
                && !written.contains(&record.id)
                && !deleted_ids.contains(record.id.as_str())
        }) {
            match paths.resolve_with_depth(&record.id) {
                Ok((path, depth)) => {
                    let depth = i64::try_from(depth).unwrap_or(i64::MAX);
                    if path != record.path || depth != record.path_depth {
                        let mut refreshed = record.clone();
                        refreshed.path = path;
                        refreshed.path_depth = depth;
                        pending.push(PendingWrite {
                            record: refreshed,
                            op: WriteOp::Refresh,
                        });
                    }
                }
                Err(error) => plan.excluded.push(error),
            }
        }
    }

    plan.waves = into_waves(pending);
    plan
}

/// Wave = distance from the nearest ancestor outside the write set
fn into_waves(mut pending: Vec<PendingWrite>) -> Vec<Vec<PendingWrite>> {
    pending.sort_by_key(|write| write.record.path_depth);

    let mut level: HashMap<String, usize> = HashMap::new();
    let mut waves: Vec<Vec<PendingWrite>> = Vec::new();
    for write in pending {
        let wave = write
            .record
            .parent_id
            .as_deref()
            .and_then(|parent| level.get(parent))
            .map_or(0, |parent_level| parent_level + 1);
        level.insert(write.record.id.clone(), wave);
        if waves.len() <= wave {
            waves.resize_with(wave + 1, Vec::new);
        }
        waves[wave].push(write);
    }
    waves
}

/// A batch that could not be written after all retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// 1-based batch number in scheduling order
    pub batch: usize,
    pub ids: Vec<String>,
    pub attempts: u32,
    pub message: String,
}

impl BatchFailure {
    #[must_use]
    pub fn to_error(&self) -> Error {
        Error::BatchApply {
            batch: self.batch,
            attempts: self.attempts,
            message: self.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyResult {
    pub total_batches: usize,
    pub succeeded_batches: usize,
    pub inserted: usize,
    pub updated: usize,
    pub refreshed: usize,
    pub failures: Vec<BatchFailure>,
    /// Stopped after a failure because `continue_on_batch_error` was off
    pub aborted: bool,
    /// Stopped because the session was cancelled
    pub cancelled: bool,
}

impl ApplyResult {
    /// Every scheduled batch was written
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.aborted && !self.cancelled
    }
}

struct BatchOutcome {
    batch: usize,
    writes: Vec<PendingWrite>,
    result: Result<(), (u32, String)>,
    _permit: OwnedSemaphorePermit,
}

/// Collects batch outcomes and reports progress
struct Tally<'a> {
    options: &'a SyncOptions,
    result: ApplyResult,
    processed: usize,
    total: usize,
    /// Batch number and row ids of every task still in the join set
    in_flight: HashMap<Id, (usize, Vec<String>)>,
}

impl Tally<'_> {
    fn record(&mut self, joined: Result<(Id, BatchOutcome), JoinError>) {
        let outcome = match joined {
            Ok((id, outcome)) => {
                self.in_flight.remove(&id);
                outcome
            }
            Err(error) => {
                let (batch, ids) = self.in_flight.remove(&error.id()).unwrap_or_default();
                tracing::error!(batch, error = %error, "Batch task did not complete");
                self.processed += ids.len();
                self.fail(BatchFailure {
                    batch,
                    ids,
                    attempts: 0,
                    message: error.to_string(),
                });
                self.options
                    .report(SyncPhase::Applying, self.processed, self.total);
                return;
            }
        };

        self.processed += outcome.writes.len();
        match outcome.result {
            Ok(()) => {
                self.result.succeeded_batches += 1;
                for write in &outcome.writes {
                    match write.op {
                        WriteOp::Insert => self.result.inserted += 1,
                        WriteOp::Update => self.result.updated += 1,
                        WriteOp::Refresh => self.result.refreshed += 1,
                    }
                }
                tracing::debug!(batch = outcome.batch, rows = outcome.writes.len(), "Batch applied");
            }
            Err((attempts, message)) => {
                tracing::warn!(batch = outcome.batch, attempts, error = %message, "Batch failed");
                self.fail(BatchFailure {
                    batch: outcome.batch,
                    ids: outcome.writes.iter().map(|w| w.record.id.clone()).collect(),
                    attempts,
                    message,
                });
            }
        }
        self.options
            .report(SyncPhase::Applying, self.processed, self.total);
    }

    fn fail(&mut self, failure: BatchFailure) {
        self.result.failures.push(failure);
        if !self.options.continue_on_batch_error {
            self.result.aborted = true;
        }
    }

    fn should_stop(&mut self) -> bool {
        if self.options.cancel.is_cancelled() {
            self.result.cancelled = true;
        }
        self.result.aborted || self.result.cancelled
    }
}

/// Runs a [`WritePlan`] against the mirror store
pub struct BatchApplier {
    store: Arc<dyn MirrorStore>,
}

impl BatchApplier {
    #[must_use]
    pub fn new(store: Arc<dyn MirrorStore>) -> Self {
        Self { store }
    }

    pub async fn apply(&self, plan: WritePlan, options: &SyncOptions) -> ApplyResult {
        let batch_size = options.batch_size.max(1);
        let semaphore = Arc::new(Semaphore::new(options.max_concurrent_batches.max(1)));
        let mut tally = Tally {
            options,
            result: ApplyResult {
                total_batches: plan.batch_count(batch_size),
                ..ApplyResult::default()
            },
            processed: 0,
            total: plan.len(),
            in_flight: HashMap::new(),
        };
        let mut batch = 0;

        'waves: for wave in plan.waves {
            let mut tasks: JoinSet<BatchOutcome> = JoinSet::new();
            let mut rows = wave.into_iter().peekable();

            while rows.peek().is_some() {
                let permit = loop {
                    while let Some(joined) = tasks.try_join_next_with_id() {
                        tally.record(joined);
                    }
                    if tally.should_stop() {
                        break None;
                    }
                    if let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() {
                        break Some(permit);
                    }
                    match tasks.join_next_with_id().await {
                        Some(joined) => tally.record(joined),
                        None => break None,
                    }
                };
                let Some(permit) = permit else {
                    break;
                };

                batch += 1;
                let writes: Vec<PendingWrite> = rows.by_ref().take(batch_size).collect();
                let ids = writes.iter().map(|w| w.record.id.clone()).collect();
                let store = Arc::clone(&self.store);
                let retry = options.retry;
                let handle = tasks.spawn(async move {
                    let records: Vec<MirrorRecord> =
                        writes.iter().map(|write| write.record.clone()).collect();
                    let result = with_retry(&retry, "upsert_batch", |_: &Error| true, || {
                        store.upsert_batch(&records)
                    })
                    .await
                    .map_err(|exhausted| (exhausted.attempts, exhausted.error.to_string()));
                    BatchOutcome {
                        batch,
                        writes,
                        result,
                        _permit: permit,
                    }
                });
                tally.in_flight.insert(handle.id(), (batch, ids));
            }

            while let Some(joined) = tasks.join_next_with_id().await {
                tally.record(joined);
            }
            if tally.should_stop() {
                break 'waves;
            }
        }

        tally.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::db::SqliteMirrorStore;
    use crate::models::{RemoteNode, SyncCheckpoint, SyncSessionRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Delegates to `SQLite`, tracking overlapping upserts and panicking on one id
    struct InstrumentedStore {
        inner: SqliteMirrorStore,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        panic_on: Option<&'static str>,
    }

    impl InstrumentedStore {
        fn new(panic_on: Option<&'static str>) -> Self {
            Self {
                inner: SqliteMirrorStore::open_in_memory().unwrap(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                panic_on,
            }
        }
    }

    #[async_trait]
    impl MirrorStore for InstrumentedStore {
        async fn upsert_batch(&self, records: &[MirrorRecord]) -> crate::Result<()> {
            if let Some(id) = self.panic_on {
                assert!(records.iter().all(|r| r.id != id), "store crashed on {id}");
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let result = self.inner.upsert_batch(records).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn soft_delete_batch(&self, ids: &[String], deleted_at: i64) -> crate::Result<usize> {
            self.inner.soft_delete_batch(ids, deleted_at).await
        }

        async fn hard_delete_batch(&self, ids: &[String]) -> crate::Result<usize> {
            self.inner.hard_delete_batch(ids).await
        }

        async fn query_by_root(&self, root_id: &str) -> crate::Result<Vec<MirrorRecord>> {
            self.inner.query_by_root(root_id).await
        }

        async fn load_checkpoint(&self, root_id: &str) -> crate::Result<Option<SyncCheckpoint>> {
            self.inner.load_checkpoint(root_id).await
        }

        async fn save_checkpoint(&self, checkpoint: &SyncCheckpoint) -> crate::Result<()> {
            self.inner.save_checkpoint(checkpoint).await
        }

        async fn append_session_record(&self, record: &SyncSessionRecord) -> crate::Result<()> {
            self.inner.append_session_record(record).await
        }

        async fn list_session_records(
            &self,
            root_id: Option<&str>,
            limit: usize,
        ) -> crate::Result<Vec<SyncSessionRecord>> {
            self.inner.list_session_records(root_id, limit).await
        }
    }

    fn flat_plan(count: usize) -> WritePlan {
        let inserts = (0..count)
            .map(|i| insert(&RemoteNode::file(&format!("f{i}"), Some("root"), &format!("f{i}"), 1, 1)))
            .collect();
        let mut paths = PathResolver::new("root", 20);
        plan_writes(
            ResolvedChangeSet {
                inserts,
                ..ResolvedChangeSet::default()
            },
            &[],
            &[],
            &mut paths,
        )
    }

    fn insert(node: &RemoteNode) -> MirrorRecord {
        MirrorRecord::from_remote(node, "root", 10)
    }

    fn stored(node: &RemoteNode, path: &str, depth: i64) -> MirrorRecord {
        let mut record = insert(node);
        record.path = path.to_string();
        record.path_depth = depth;
        record
    }

    #[test]
    fn plan_assigns_paths_and_orders_waves_parent_first() {
        let resolved = ResolvedChangeSet {
            inserts: vec![
                insert(&RemoteNode::folder("docs", Some("root"), "Docs", 1)),
                insert(&RemoteNode::folder("talks", Some("docs"), "Talks", 1)),
                insert(&RemoteNode::file("a", Some("talks"), "a.mp4", 1, 1)),
                insert(&RemoteNode::file("b", Some("root"), "b.txt", 1, 1)),
            ],
            ..ResolvedChangeSet::default()
        };
        let mut paths = PathResolver::new("root", 20);

        let plan = plan_writes(resolved, &[], &[], &mut paths);

        assert!(plan.excluded.is_empty());
        assert_eq!(plan.waves.len(), 3);
        let wave_ids: Vec<Vec<&str>> = plan
            .waves
            .iter()
            .map(|wave| wave.iter().map(|w| w.record.id.as_str()).collect())
            .collect();
        assert_eq!(wave_ids, vec![vec!["docs", "b"], vec!["talks"], vec!["a"]]);
        assert_eq!(plan.waves[2][0].record.path, "/Docs/Talks/a.mp4");
        assert_eq!(plan.waves[2][0].record.path_depth, 3);
    }

    #[test]
    fn plan_excludes_cycles_and_refreshes_moved_subtrees() {
        let docs = RemoteNode::folder("docs", Some("root"), "Docs", 1);
        let child = RemoteNode::file("c", Some("docs"), "c.txt", 1, 1);
        let mirror = vec![stored(&docs, "/Docs", 1), stored(&child, "/Docs/c.txt", 2)];

        let mut renamed = stored(&docs, "/Docs", 1);
        renamed.name = "Papers".to_string();
        let resolved = ResolvedChangeSet {
            inserts: vec![
                insert(&RemoteNode::folder("x", Some("y"), "X", 1)),
                insert(&RemoteNode::folder("y", Some("x"), "Y", 1)),
            ],
            updates: vec![renamed],
            unchanged: Vec::new(),
        };
        let mut paths = PathResolver::new("root", 20);

        let plan = plan_writes(resolved, &mirror, &[], &mut paths);

        assert_eq!(plan.excluded.len(), 2);
        assert!(plan
            .excluded
            .iter()
            .all(|error| matches!(error, PathError::Cycle { .. })));
        assert_eq!(plan.count(WriteOp::Update), 1);
        assert_eq!(plan.count(WriteOp::Refresh), 1);
        let refreshed = plan
            .waves
            .iter()
            .flatten()
            .find(|w| w.op == WriteOp::Refresh)
            .unwrap();
        assert_eq!(refreshed.record.path, "/Papers/c.txt");
    }

    #[test]
    fn batch_count_is_per_wave() {
        let plan = WritePlan {
            waves: vec![
                vec![
                    PendingWrite {
                        record: insert(&RemoteNode::file("a", Some("root"), "a", 1, 1)),
                        op: WriteOp::Insert,
                    };
                    3
                ],
                vec![PendingWrite {
                    record: insert(&RemoteNode::file("b", Some("a"), "b", 1, 1)),
                    op: WriteOp::Insert,
                }],
            ],
            excluded: Vec::new(),
        };
        assert_eq!(plan.batch_count(2), 3);
        assert_eq!(plan.len(), 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn apply_writes_every_batch_and_reports_progress_per_batch() {
        let store = Arc::new(SqliteMirrorStore::open_in_memory().unwrap());
        let inserts = (0..7)
            .map(|i| insert(&RemoteNode::file(&format!("f{i}"), Some("root"), &format!("f{i}"), 1, 1)))
            .collect();
        let mut paths = PathResolver::new("root", 20);
        let plan = plan_writes(
            ResolvedChangeSet {
                inserts,
                ..ResolvedChangeSet::default()
            },
            &[],
            &[],
            &mut paths,
        );

        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let options = SyncOptions::default()
            .with_batch_size(3)
            .with_max_concurrent_batches(2)
            .with_progress(move |progress| sink.lock().unwrap().push(progress.current));

        let result = BatchApplier::new(store.clone()).apply(plan, &options).await;

        assert!(result.is_clean());
        assert_eq!(result.total_batches, 3);
        assert_eq!(result.succeeded_batches, 3);
        assert_eq!(result.inserted, 7);
        let mut reports = reports.lock().unwrap().clone();
        reports.sort_unstable();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports.last(), Some(&7));
        assert_eq!(store.list_records("root", false).await.unwrap().len(), 7);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_apply_stops_before_next_batch() {
        let store = Arc::new(SqliteMirrorStore::open_in_memory().unwrap());
        let inserts = (0..10)
            .map(|i| insert(&RemoteNode::file(&format!("f{i}"), Some("root"), &format!("f{i}"), 1, 1)))
            .collect();
        let mut paths = PathResolver::new("root", 20);
        let plan = plan_writes(
            ResolvedChangeSet {
                inserts,
                ..ResolvedChangeSet::default()
            },
            &[],
            &[],
            &mut paths,
        );

        let options = SyncOptions::default()
            .with_batch_size(2)
            .with_max_concurrent_batches(1)
            .with_retry(RetryPolicy::none());
        let cancel = options.cancel.clone();
        let options = options.with_progress(move |progress| {
            if progress.current >= 4 {
                cancel.cancel();
            }
        });

        let result = BatchApplier::new(store.clone()).apply(plan, &options).await;

        assert!(result.cancelled);
        assert_eq!(result.total_batches, 5);
        assert_eq!(result.succeeded_batches, 2);
        assert_eq!(store.list_records("root", false).await.unwrap().len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn apply_never_exceeds_max_concurrent_batches() {
        let store = Arc::new(InstrumentedStore::new(None));
        let options = SyncOptions::default()
            .with_batch_size(1)
            .with_max_concurrent_batches(2);

        let result = BatchApplier::new(store.clone())
            .apply(flat_plan(8), &options)
            .await;

        assert!(result.is_clean());
        assert_eq!(result.succeeded_batches, 8);
        let peak = store.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak in-flight batches was {peak}");
        assert_eq!(store.inner.list_records("root", false).await.unwrap().len(), 8);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn crashed_batch_task_is_attributed_and_reported() {
        let store = Arc::new(InstrumentedStore::new(Some("f2")));
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let options = SyncOptions::default()
            .with_batch_size(2)
            .with_max_concurrent_batches(1)
            .with_retry(RetryPolicy::none())
            .with_progress(move |progress| sink.lock().unwrap().push(progress.current));

        let result = BatchApplier::new(store.clone())
            .apply(flat_plan(6), &options)
            .await;

        assert_eq!(result.total_batches, 3);
        assert_eq!(result.succeeded_batches, 2);
        assert_eq!(result.failures.len(), 1);
        let failure = &result.failures[0];
        assert_eq!(failure.batch, 2);
        assert_eq!(failure.ids, vec!["f2".to_string(), "f3".to_string()]);
        assert_eq!(failure.attempts, 0);
        assert_eq!(*reports.lock().unwrap(), vec![2, 4, 6]);
    }
}
