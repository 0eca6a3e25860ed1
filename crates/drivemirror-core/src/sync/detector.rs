//! Change detection: remote listing vs. mirror state

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::RetryPolicy;
use crate::db::MirrorStore;
use crate::error::{Error, Result};
use crate::models::{MirrorRecord, RemoteNode, SyncCheckpoint};
use crate::provider::{ProviderError, RemoteChange, RemoteProvider};

use super::retry::{with_retry, RetryExhausted};

/// A node present on both sides whose remote copy changed
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedEntry {
    pub remote: RemoteNode,
    pub mirror: MirrorRecord,
}

/// Differences found by one detection pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// New nodes, parent before child
    pub added: Vec<RemoteNode>,
    pub modified: Vec<ModifiedEntry>,
    /// Active mirror rows without a remote counterpart, deepest first
    pub deleted: Vec<MirrorRecord>,
}

impl ChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    Full,
    Incremental,
}

impl DetectionMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

/// Result of [`ChangeDetector::detect_changes`]
#[derive(Debug, Clone)]
pub struct Detection {
    pub change_set: ChangeSet,
    /// Cursor to store once the pass is fully applied
    pub cursor: Option<String>,
    pub mode: DetectionMode,
    /// Mirror rows of the subtree as loaded before detection
    pub mirror: Vec<MirrorRecord>,
}

#[derive(Debug, Clone, Copy)]
pub struct DetectOptions {
    pub recursive: bool,
    pub max_depth: usize,
    pub retry: RetryPolicy,
}

impl DetectOptions {
    /// Deepest level (root = 0) a pass looks at
    #[must_use]
    pub const fn depth_limit(&self) -> usize {
        if !self.recursive && self.max_depth > 1 {
            1
        } else {
            self.max_depth
        }
    }
}

/// Live nodes of a full listing and the folders whose children were listed
struct FullListing {
    nodes: Vec<RemoteNode>,
    expanded: HashSet<String>,
    cursor: Option<String>,
}

/// Diffs the remote subtree against the mirror
pub struct ChangeDetector<'a> {
    provider: &'a dyn RemoteProvider,
    store: &'a dyn MirrorStore,
}

fn fetch_error(exhausted: RetryExhausted<ProviderError>) -> Error {
    Error::ProviderFetch {
        attempts: exhausted.attempts,
        source: exhausted.error,
    }
}

impl<'a> ChangeDetector<'a> {
    #[must_use]
    pub fn new(provider: &'a dyn RemoteProvider, store: &'a dyn MirrorStore) -> Self {
        Self { provider, store }
    }

    /// Detect changes under `root_id`.
    ///
    /// Uses the change feed when the checkpoint carries a cursor, otherwise
    /// (or when the cursor has expired) lists the whole subtree.
    pub async fn detect_changes(
        &self,
        root_id: &str,
        checkpoint: Option<&SyncCheckpoint>,
        options: &DetectOptions,
    ) -> Result<Detection> {
        let mirror = self.store.query_by_root(root_id).await?;

        if let Some(cursor) = checkpoint.and_then(|c| c.last_cursor_token.as_deref()) {
            match self.incremental(root_id, cursor, &mirror, options).await {
                Ok((change_set, new_cursor)) => {
                    return Ok(Detection {
                        change_set,
                        cursor: Some(new_cursor),
                        mode: DetectionMode::Incremental,
                        mirror,
                    });
                }
                Err(Error::ProviderFetch {
                    source: ProviderError::CursorExpired,
                    ..
                }) => {
                    tracing::info!(root_id, "Change cursor expired, falling back to full listing");
                }
                Err(error) => return Err(error),
            }
        }

        let listing = self.full_listing(root_id, options).await?;
        let cursor = listing.cursor.clone();
        let change_set = diff_listing(listing, &mirror);
        Ok(Detection {
            change_set,
            cursor,
            mode: DetectionMode::Full,
            mirror,
        })
    }

    /// Every live node under `root_id` within the depth limit, plus the cursor
    /// marking the listing's start
    async fn full_listing(&self, root_id: &str, options: &DetectOptions) -> Result<FullListing> {
        let retry = &options.retry;
        // Taken before listing so changes made meanwhile are delivered again next time
        let cursor = with_retry(retry, "start_cursor", ProviderError::is_transient, || {
            self.provider.start_cursor(root_id)
        })
        .await
        .map_err(fetch_error)?;

        let root = with_retry(retry, "get_node", ProviderError::is_transient, || {
            self.provider.get_node(root_id)
        })
        .await
        .map_err(fetch_error)?;
        if root.is_deleted {
            return Err(Error::NotFound(format!("remote root {root_id} is trashed")));
        }

        let mut nodes = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut expanded: HashSet<String> = HashSet::from([root_id.to_string()]);
        let mut queue = VecDeque::from([(root_id.to_string(), 0usize)]);

        while let Some((folder_id, depth)) = queue.pop_front() {
            let mut page_token: Option<String> = None;
            loop {
                let page = with_retry(retry, "list_children", ProviderError::is_transient, || {
                    self.provider
                        .list_children(&folder_id, page_token.as_deref())
                })
                .await
                .map_err(fetch_error)?;

                for node in page.nodes {
                    if node.is_deleted || node.id == root_id || !seen.insert(node.id.clone()) {
                        continue;
                    }
                    let child_depth = depth + 1;
                    if node.kind.is_folder()
                        && child_depth < options.depth_limit()
                        && expanded.insert(node.id.clone())
                    {
                        queue.push_back((node.id.clone(), child_depth));
                    }
                    nodes.push(node);
                }

                match page.next_page_token {
                    Some(token) => page_token = Some(token),
                    None => break,
                }
            }
        }

        tracing::debug!(
            root_id,
            nodes = nodes.len(),
            expanded = expanded.len(),
            "Full listing complete"
        );
        Ok(FullListing {
            nodes,
            expanded,
            cursor,
        })
    }

    async fn incremental(
        &self,
        root_id: &str,
        cursor: &str,
        mirror: &[MirrorRecord],
        options: &DetectOptions,
    ) -> Result<(ChangeSet, String)> {
        let retry = &options.retry;
        let page = with_retry(retry, "get_changes_since", ProviderError::is_transient, || {
            self.provider.get_changes_since(root_id, cursor)
        })
        .await
        .map_err(fetch_error)?;

        let active: HashMap<&str, &MirrorRecord> = mirror
            .iter()
            .filter(|record| record.is_active())
            .map(|record| (record.id.as_str(), record))
            .collect();

        let mut current: Vec<RemoteNode> = Vec::new();
        let mut removed: Vec<String> = Vec::new();
        for change in dedupe_changes(page.changes) {
            if change.node_id == root_id {
                continue;
            }
            let node_id = change.node_id.clone();
            match self.current_node(change, retry).await? {
                Some(node) => current.push(node),
                None => removed.push(node_id),
            }
        }

        let live: HashSet<String> = current.iter().map(|node| node.id.clone()).collect();
        let changed: HashMap<&str, &RemoteNode> =
            current.iter().map(|node| (node.id.as_str(), node)).collect();
        let in_scope: Vec<bool> = current
            .iter()
            .map(|node| {
                node_depth(node, root_id, &changed, &active)
                    .is_none_or(|depth| depth <= options.depth_limit())
            })
            .collect();

        let mut change_set = ChangeSet::default();
        for (node, in_scope) in current.into_iter().zip(in_scope) {
            if !in_scope {
                tracing::debug!(node_id = %node.id, "Change beyond the depth limit, skipped");
                continue;
            }
            match active.get(node.id.as_str()) {
                Some(record) => change_set.modified.push(ModifiedEntry {
                    remote: node,
                    mirror: (*record).clone(),
                }),
                None => change_set.added.push(node),
            }
        }

        change_set.added = order_parent_first(change_set.added);
        change_set.deleted = cascade_removals(&removed, mirror, &live);
        Ok((change_set, page.new_cursor))
    }

    /// Live snapshot for a change, or `None` when the node is gone or trashed
    async fn current_node(
        &self,
        change: RemoteChange,
        retry: &RetryPolicy,
    ) -> Result<Option<RemoteNode>> {
        if change.removed {
            return Ok(None);
        }
        let node = match change.node {
            Some(node) => node,
            None => {
                let fetched = with_retry(retry, "get_node", ProviderError::is_transient, || {
                    self.provider.get_node(&change.node_id)
                })
                .await;
                match fetched {
                    Ok(node) => node,
                    Err(RetryExhausted {
                        error: ProviderError::NotFound(_),
                        ..
                    }) => return Ok(None),
                    Err(exhausted) => return Err(fetch_error(exhausted)),
                }
            }
        };
        Ok((!node.is_deleted).then_some(node))
    }
}

/// Depth below the root of a changed node, following parents through the
/// changed nodes first and the mirror after that.
///
/// `None` when the chain never reaches the root or loops.
fn node_depth(
    node: &RemoteNode,
    root_id: &str,
    changed: &HashMap<&str, &RemoteNode>,
    active: &HashMap<&str, &MirrorRecord>,
) -> Option<usize> {
    let mut steps = 1;
    let mut parent = node.parent_id.as_deref()?;
    while steps <= changed.len() + 1 {
        if parent == root_id {
            return Some(steps);
        }
        if let Some(next) = changed.get(parent) {
            parent = next.parent_id.as_deref()?;
            steps += 1;
        } else {
            let record = active.get(parent)?;
            return usize::try_from(record.path_depth)
                .ok()
                .map(|depth| depth + steps);
        }
    }
    None
}

/// Keep only the last change reported for each node, in feed order
fn dedupe_changes(changes: Vec<RemoteChange>) -> Vec<RemoteChange> {
    let last: HashMap<String, usize> = changes
        .iter()
        .enumerate()
        .map(|(index, change)| (change.node_id.clone(), index))
        .collect();
    changes
        .into_iter()
        .enumerate()
        .filter(|(index, change)| last.get(&change.node_id) == Some(index))
        .map(|(_, change)| change)
        .collect()
}

/// Diff a full listing against the mirror.
///
/// A mirror row missing from the listing is only deleted when the listing
/// could have seen it: rows below a listed folder that was not expanded are
/// out of scope and stay untouched.
fn diff_listing(listing: FullListing, mirror: &[MirrorRecord]) -> ChangeSet {
    let FullListing {
        nodes, expanded, ..
    } = listing;
    let by_id: HashMap<&str, &MirrorRecord> = mirror
        .iter()
        .map(|record| (record.id.as_str(), record))
        .collect();
    let listed: HashSet<String> = nodes.iter().map(|node| node.id.clone()).collect();

    let mut change_set = ChangeSet::default();
    for node in nodes {
        match by_id.get(node.id.as_str()) {
            Some(record) if record.is_active() => {
                let newer = match record.remote_modified_at {
                    Some(seen) => node.modified_at > seen,
                    None => true,
                };
                if newer {
                    change_set.modified.push(ModifiedEntry {
                        remote: node,
                        mirror: (*record).clone(),
                    });
                }
            }
            // Unknown, or soft-deleted and back again
            _ => change_set.added.push(node),
        }
    }

    change_set.added = order_parent_first(change_set.added);
    change_set.deleted = mirror
        .iter()
        .filter(|record| {
            record.is_active()
                && !listed.contains(&record.id)
                && !beyond_listing(record, &by_id, &listed, &expanded)
        })
        .cloned()
        .collect();
    sort_deepest_first(&mut change_set.deleted);
    change_set
}

/// Whether an unlisted row hangs below a listed folder whose children were not listed
fn beyond_listing(
    record: &MirrorRecord,
    by_id: &HashMap<&str, &MirrorRecord>,
    listed: &HashSet<String>,
    expanded: &HashSet<String>,
) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut parent = record.parent_id.as_deref();
    while let Some(id) = parent {
        if expanded.contains(id) || !visited.insert(id) {
            return false;
        }
        if listed.contains(id) {
            return true;
        }
        // Unlisted ancestor: out of scope only if it is itself out of scope
        match by_id.get(id) {
            Some(ancestor) if ancestor.is_active() => parent = ancestor.parent_id.as_deref(),
            _ => return false,
        }
    }
    false
}

/// Active mirror rows for removed ids, plus the active descendants of removed
/// folders that were not seen alive in the same pass
fn cascade_removals(
    removed: &[String],
    mirror: &[MirrorRecord],
    live: &HashSet<String>,
) -> Vec<MirrorRecord> {
    let mut active: HashMap<&str, &MirrorRecord> = HashMap::new();
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for record in mirror.iter().filter(|record| record.is_active()) {
        active.insert(record.id.as_str(), record);
        if let Some(parent_id) = record.parent_id.as_deref() {
            children
                .entry(parent_id)
                .or_default()
                .push(record.id.as_str());
        }
    }

    let mut deleted = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = removed.iter().map(String::as_str).collect();
    while let Some(id) = queue.pop_front() {
        if live.contains(id) || !visited.insert(id) {
            continue;
        }
        if let Some(record) = active.get(id) {
            deleted.push((*record).clone());
        }
        if let Some(kids) = children.get(id) {
            queue.extend(kids.iter().copied());
        }
    }

    sort_deepest_first(&mut deleted);
    deleted
}

fn sort_deepest_first(records: &mut [MirrorRecord]) {
    records.sort_by(|a, b| {
        b.path_depth
            .cmp(&a.path_depth)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Order nodes so that every parent precedes its children.
///
/// Nodes whose parent is not in the set start the order; nodes caught in a
/// parent cycle are appended last in their original order.
pub(crate) fn order_parent_first(nodes: Vec<RemoteNode>) -> Vec<RemoteNode> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(position, node)| (node.id.as_str(), position))
        .collect();

    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut queue = VecDeque::new();
    for (position, node) in nodes.iter().enumerate() {
        match node.parent_id.as_deref().and_then(|parent| index.get(parent)) {
            Some(&parent) if parent != position => {
                children.entry(parent).or_default().push(position);
            }
            _ => queue.push_back(position),
        }
    }

    let mut placed = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(position) = queue.pop_front() {
        if placed[position] {
            continue;
        }
        placed[position] = true;
        order.push(position);
        if let Some(kids) = children.get(&position) {
            queue.extend(kids.iter().copied());
        }
    }
    order.extend((0..nodes.len()).filter(|position| !placed[*position]));

    let mut slots: Vec<Option<RemoteNode>> = nodes.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|position| slots[position].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteMirrorStore;
    use crate::provider::MemoryProvider;
    use pretty_assertions::assert_eq;

    fn tree() -> MemoryProvider {
        let provider = MemoryProvider::new().with_page_size(1);
        provider.upsert_node(RemoteNode::folder("root", None, "Root", 1));
        provider.upsert_node(RemoteNode::folder("docs", Some("root"), "Docs", 1));
        provider.upsert_node(RemoteNode::file("a", Some("docs"), "a.txt", 1, 5));
        provider.upsert_node(RemoteNode::file("b", Some("root"), "b.txt", 1, 5));
        provider
    }

    fn options() -> DetectOptions {
        DetectOptions {
            recursive: true,
            max_depth: 20,
            retry: RetryPolicy {
                max_retries: 3,
                base_delay_ms: 1,
                multiplier: 2,
                max_delay_ms: 4,
            },
        }
    }

    async fn mirror_nodes(store: &SqliteMirrorStore, provider: &MemoryProvider, ids: &[&str]) {
        let records: Vec<MirrorRecord> = ids
            .iter()
            .filter_map(|id| provider.node(id))
            .map(|node| MirrorRecord::from_remote(&node, "root", 1))
            .collect();
        store.upsert_batch(&records).await.unwrap();
    }

    fn ids(nodes: &[RemoteNode]) -> Vec<&str> {
        nodes.iter().map(|node| node.id.as_str()).collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn full_listing_of_fresh_subtree_adds_everything_parent_first() {
        let provider = tree();
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        let detector = ChangeDetector::new(&provider, &store);

        let detection = detector.detect_changes("root", None, &options()).await.unwrap();

        assert_eq!(detection.mode, DetectionMode::Full);
        assert_eq!(detection.cursor.as_deref(), Some("4"));
        let added = ids(&detection.change_set.added);
        assert_eq!(added.len(), 3);
        let docs = added.iter().position(|id| *id == "docs").unwrap();
        let a = added.iter().position(|id| *id == "a").unwrap();
        assert!(docs < a);
        assert!(detection.change_set.modified.is_empty());
        assert!(detection.change_set.deleted.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn full_listing_respects_recursion_depth_and_trash() {
        let provider = tree();
        provider.upsert_node(RemoteNode::file("gone", Some("root"), "gone.txt", 1, 1));
        provider.trash_node("gone");
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        let detector = ChangeDetector::new(&provider, &store);

        let flat = DetectOptions {
            recursive: false,
            ..options()
        };
        let detection = detector.detect_changes("root", None, &flat).await.unwrap();
        assert_eq!(ids(&detection.change_set.added), vec!["docs", "b"]);

        let shallow = DetectOptions {
            max_depth: 1,
            ..options()
        };
        let detection = detector.detect_changes("root", None, &shallow).await.unwrap();
        assert_eq!(ids(&detection.change_set.added), vec!["docs", "b"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shallow_listing_only_deletes_rows_it_could_see() {
        let provider = tree();
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        mirror_nodes(&store, &provider, &["docs", "a", "b"]).await;
        provider.remove_node("b");
        let detector = ChangeDetector::new(&provider, &store);

        for scoped in [
            DetectOptions {
                recursive: false,
                ..options()
            },
            DetectOptions {
                max_depth: 1,
                ..options()
            },
        ] {
            let change_set = detector
                .detect_changes("root", None, &scoped)
                .await
                .unwrap()
                .change_set;
            let deleted: Vec<&str> = change_set.deleted.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(deleted, vec!["b"]);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn full_diff_classifies_against_mirror() {
        let provider = tree();
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        mirror_nodes(&store, &provider, &["docs", "a", "b"]).await;
        store
            .upsert_batch(&[MirrorRecord::from_remote(
                &RemoteNode::file("old", Some("root"), "old.txt", 1, 1),
                "root",
                1,
            )])
            .await
            .unwrap();
        store.soft_delete_batch(&["b".to_string()], 5).await.unwrap();

        provider.upsert_node(RemoteNode::file("a", Some("docs"), "a.txt", 9, 6));

        let detector = ChangeDetector::new(&provider, &store);
        let change_set = detector
            .detect_changes("root", None, &options())
            .await
            .unwrap()
            .change_set;

        // Soft-deleted rows that reappear are added again
        assert_eq!(ids(&change_set.added), vec!["b"]);
        assert_eq!(change_set.modified.len(), 1);
        assert_eq!(change_set.modified[0].remote.modified_at, 9);
        assert_eq!(change_set.modified[0].mirror.remote_modified_at, Some(1));
        assert_eq!(change_set.deleted.len(), 1);
        assert_eq!(change_set.deleted[0].id, "old");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn incremental_classifies_feed_changes() {
        let provider = tree();
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        mirror_nodes(&store, &provider, &["docs", "a", "b"]).await;
        let cursor = provider.start_cursor("root").await.unwrap();
        let checkpoint = SyncCheckpoint::new("root", 1, cursor);

        provider.upsert_node(RemoteNode::file("a", Some("root"), "a.txt", 7, 5));
        provider.remove_node("b");
        provider.upsert_node(RemoteNode::file("c", Some("docs"), "c.txt", 7, 1));

        let detector = ChangeDetector::new(&provider, &store);
        let detection = detector
            .detect_changes("root", Some(&checkpoint), &options())
            .await
            .unwrap();

        assert_eq!(detection.mode, DetectionMode::Incremental);
        assert_eq!(detection.cursor.as_deref(), Some("7"));
        let change_set = detection.change_set;
        assert_eq!(ids(&change_set.added), vec!["c"]);
        assert_eq!(change_set.modified.len(), 1);
        // Moved and modified: the new parent travels with the snapshot
        assert_eq!(change_set.modified[0].remote.parent_id.as_deref(), Some("root"));
        assert_eq!(change_set.deleted.len(), 1);
        assert_eq!(change_set.deleted[0].id, "b");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn expired_cursor_falls_back_to_full_listing() {
        let provider = tree();
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        let checkpoint = SyncCheckpoint::new("root", 1, Some("999".to_string()));

        let detector = ChangeDetector::new(&provider, &store);
        let detection = detector
            .detect_changes("root", Some(&checkpoint), &options())
            .await
            .unwrap();

        assert_eq!(detection.mode, DetectionMode::Full);
        assert_eq!(detection.change_set.added.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_provider_failures_are_retried() {
        let provider = tree();
        provider.fail_next_calls(2, &ProviderError::Request("503".to_string()));
        let store = SqliteMirrorStore::open_in_memory().unwrap();

        let detector = ChangeDetector::new(&provider, &store);
        let detection = detector.detect_changes("root", None, &options()).await.unwrap();
        assert_eq!(detection.change_set.added.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exhausted_or_permanent_failures_fail_detection() {
        let provider = tree();
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        let detector = ChangeDetector::new(&provider, &store);

        provider.fail_next_calls(4, &ProviderError::Request("503".to_string()));
        let error = detector.detect_changes("root", None, &options()).await.unwrap_err();
        assert!(matches!(error, Error::ProviderFetch { attempts: 4, .. }));

        provider.fail_next_calls(1, &ProviderError::Rejected("403".to_string()));
        let error = detector.detect_changes("root", None, &options()).await.unwrap_err();
        assert!(matches!(error, Error::ProviderFetch { attempts: 1, .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_root_fails_detection() {
        let provider = MemoryProvider::new();
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        let detector = ChangeDetector::new(&provider, &store);

        let error = detector.detect_changes("root", None, &options()).await.unwrap_err();
        assert!(matches!(
            error,
            Error::ProviderFetch {
                source: ProviderError::NotFound(_),
                ..
            }
        ));
    }

    #[test]
    fn parent_first_ordering_handles_reversed_input_and_cycles() {
        let nodes = vec![
            RemoteNode::file("leaf", Some("mid"), "leaf", 1, 1),
            RemoteNode::folder("mid", Some("top"), "mid", 1),
            RemoteNode::folder("top", Some("root"), "top", 1),
            RemoteNode::folder("x", Some("y"), "x", 1),
            RemoteNode::folder("y", Some("x"), "y", 1),
        ];
        let ordered = order_parent_first(nodes);
        assert_eq!(ids(&ordered), vec!["top", "mid", "leaf", "x", "y"]);
    }

    #[test]
    fn removed_folder_cascades_to_descendants_not_seen_alive() {
        let record = |id: &str, parent: &str, depth: i64| {
            let mut record =
                MirrorRecord::from_remote(&RemoteNode::file(id, Some(parent), id, 1, 1), "root", 1);
            record.path_depth = depth;
            record
        };
        let mirror = vec![
            record("f", "root", 1),
            record("f1", "f", 2),
            record("f2", "f", 2),
            record("f1a", "f1", 3),
        ];
        let live = HashSet::from(["f2".to_string()]);

        let deleted = cascade_removals(&["f".to_string()], &mirror, &live);
        let deleted: Vec<&str> = deleted.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(deleted, vec!["f1a", "f1", "f"]);
    }
}
