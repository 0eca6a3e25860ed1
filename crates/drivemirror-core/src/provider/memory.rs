//! In-memory remote provider

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{ChangePage, ChildPage, ProviderError, RemoteChange, RemoteProvider};
use crate::models::RemoteNode;

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Default)]
struct MemoryState {
    nodes: BTreeMap<String, RemoteNode>,
    /// `(revision, node id)` for every mutation
    log: Vec<(u64, String)>,
    revision: u64,
    injected_failures: VecDeque<ProviderError>,
    calls: usize,
}

impl MemoryState {
    fn record(&mut self, id: &str) {
        self.revision += 1;
        self.log.push((self.revision, id.to_string()));
    }

    fn take_failure(&mut self) -> Result<(), ProviderError> {
        self.calls += 1;
        self.injected_failures.pop_front().map_or(Ok(()), Err)
    }

    fn descendants(&self, id: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut queue = VecDeque::from([id.to_string()]);
        let mut seen = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            for node in self.nodes.values() {
                if node.parent_id.as_deref() == Some(current.as_str()) {
                    found.push(node.id.clone());
                    queue.push_back(node.id.clone());
                }
            }
        }
        found
    }

    fn is_within(&self, id: &str, root_id: &str) -> bool {
        let mut current = self.nodes.get(id).and_then(|node| node.parent_id.clone());
        for _ in 0..=self.nodes.len() {
            match current {
                Some(parent) if parent == root_id => return true,
                Some(parent) => {
                    current = self.nodes.get(&parent).and_then(|node| node.parent_id.clone());
                }
                None => return false,
            }
        }
        false
    }
}

/// Remote tree held in memory, with a revision-numbered change log.
pub struct MemoryProvider {
    state: Mutex<MemoryState>,
    page_size: usize,
    change_feed: bool,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    /// Empty provider with a change feed
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            page_size: DEFAULT_PAGE_SIZE,
            change_feed: true,
        }
    }

    /// Provider built from a static listing, without a change feed.
    ///
    /// Every session against it performs a full listing.
    #[must_use]
    pub fn from_listing(nodes: impl IntoIterator<Item = RemoteNode>) -> Self {
        let provider = Self {
            change_feed: false,
            ..Self::new()
        };
        {
            let mut state = provider.lock();
            for node in nodes {
                state.nodes.insert(node.id.clone(), node);
            }
        }
        provider
    }

    /// Set the listing page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a node
    pub fn upsert_node(&self, node: RemoteNode) {
        let mut state = self.lock();
        let id = node.id.clone();
        state.nodes.insert(id.clone(), node);
        state.record(&id);
    }

    /// Remove a node and everything below it
    pub fn remove_node(&self, id: &str) {
        let mut state = self.lock();
        let mut removed = state.descendants(id);
        removed.push(id.to_string());
        for node_id in removed {
            if state.nodes.remove(&node_id).is_some() {
                state.record(&node_id);
            }
        }
    }

    /// Flag a node as trashed, keeping it in listings
    pub fn trash_node(&self, id: &str) {
        let mut state = self.lock();
        if let Some(node) = state.nodes.get_mut(id) {
            node.is_deleted = true;
            state.record(id);
        }
    }

    /// Make the next `count` calls fail with `error`
    pub fn fail_next_calls(&self, count: usize, error: &ProviderError) {
        let mut state = self.lock();
        for _ in 0..count {
            state.injected_failures.push_back(error.clone());
        }
    }

    /// Number of provider calls served so far
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    /// Snapshot of a node, if present
    pub fn node(&self, id: &str) -> Option<RemoteNode> {
        self.lock().nodes.get(id).cloned()
    }
}

#[async_trait]
impl RemoteProvider for MemoryProvider {
    async fn list_children(
        &self,
        node_id: &str,
        page_token: Option<&str>,
    ) -> Result<ChildPage, ProviderError> {
        let mut state = self.lock();
        state.take_failure()?;

        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ProviderError::Rejected(format!("invalid page token '{token}'")))?,
            None => 0,
        };

        let mut children = state
            .nodes
            .values()
            .filter(|node| node.parent_id.as_deref() == Some(node_id))
            .cloned()
            .collect::<Vec<_>>();
        children.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let end = (offset + self.page_size).min(children.len());
        let nodes = children.get(offset..end).unwrap_or_default().to_vec();
        let next_page_token = (end < children.len()).then(|| end.to_string());

        Ok(ChildPage {
            nodes,
            next_page_token,
        })
    }

    async fn get_changes_since(
        &self,
        root_id: &str,
        cursor: &str,
    ) -> Result<ChangePage, ProviderError> {
        let mut state = self.lock();
        state.take_failure()?;

        if !self.change_feed {
            return Err(ProviderError::CursorExpired);
        }
        let since = cursor
            .parse::<u64>()
            .map_err(|_| ProviderError::CursorExpired)?;
        if since > state.revision {
            return Err(ProviderError::CursorExpired);
        }

        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for (_, id) in state.log.iter().rev().filter(|(rev, _)| *rev > since) {
            if seen.insert(id.clone()) {
                ordered.push(id.clone());
            }
        }
        ordered.reverse();

        let changes = ordered
            .into_iter()
            .map(|id| match state.nodes.get(&id) {
                Some(node) if state.is_within(&id, root_id) => RemoteChange::updated(node.clone()),
                _ => RemoteChange::removed(id),
            })
            .collect();

        Ok(ChangePage {
            changes,
            new_cursor: state.revision.to_string(),
        })
    }

    async fn get_node(&self, node_id: &str) -> Result<RemoteNode, ProviderError> {
        let mut state = self.lock();
        state.take_failure()?;
        state
            .nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(node_id.to_string()))
    }

    async fn start_cursor(&self, _root_id: &str) -> Result<Option<String>, ProviderError> {
        let mut state = self.lock();
        state.take_failure()?;
        Ok(self.change_feed.then(|| state.revision.to_string()))
    }
}
