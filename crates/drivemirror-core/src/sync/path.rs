//! Full path reconstruction from parent chains.
//!
//! A [`PathResolver`] lives for exactly one session. It knows the hierarchy
//! registered into it (mirror rows overlaid with this pass's changes) and
//! memoizes every path it computes, so siblings resolve in O(1) once their
//! ancestors are known. Registering a changed entry drops the memo.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::models::MirrorRecord;

/// Path resolution failures; both are non-fatal for the session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The parent chain loops back on itself before reaching the root
    #[error("Cycle in parent chain of {node_id} (revisited {repeated_id})")]
    Cycle {
        node_id: String,
        repeated_id: String,
    },
    /// The parent chain is deeper than allowed
    #[error("Parent chain of {node_id} exceeds maximum depth {max_depth}")]
    DepthExceeded { node_id: String, max_depth: usize },
    /// The node was never registered
    #[error("Unknown node {0}")]
    UnknownNode(String),
}

impl PathError {
    /// Node the error is about
    #[must_use]
    pub fn node_id(&self) -> &str {
        match self {
            Self::Cycle { node_id, .. } | Self::DepthExceeded { node_id, .. } => node_id,
            Self::UnknownNode(node_id) => node_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PathEntry {
    parent_id: Option<String>,
    name: String,
}

/// Session-scoped path builder with memoization and cycle detection
#[derive(Debug)]
pub struct PathResolver {
    root_id: String,
    max_depth: usize,
    entries: HashMap<String, PathEntry>,
    /// node id -> (path, depth)
    memo: HashMap<String, (String, usize)>,
}

impl PathResolver {
    #[must_use]
    pub fn new(root_id: impl Into<String>, max_depth: usize) -> Self {
        Self {
            root_id: root_id.into(),
            max_depth,
            entries: HashMap::new(),
            memo: HashMap::new(),
        }
    }

    /// Register (or replace) a node in the hierarchy
    pub fn register(&mut self, id: &str, parent_id: Option<&str>, name: &str) {
        let entry = PathEntry {
            parent_id: parent_id.map(str::to_string),
            name: name.to_string(),
        };
        if self.entries.get(id) != Some(&entry) {
            self.entries.insert(id.to_string(), entry);
            self.memo.clear();
        }
    }

    pub fn register_record(&mut self, record: &MirrorRecord) {
        self.register(&record.id, record.parent_id.as_deref(), &record.name);
    }

    /// Drop a node from the hierarchy
    pub fn forget(&mut self, id: &str) {
        if self.entries.remove(id).is_some() {
            self.memo.clear();
        }
    }

    /// Number of memoized paths
    #[must_use]
    pub fn memoized(&self) -> usize {
        self.memo.len()
    }

    /// Resolve the full path of `node_id`, e.g. `/Folder/file.txt`
    pub fn resolve(&mut self, node_id: &str) -> Result<String, PathError> {
        self.resolve_with_depth(node_id).map(|(path, _)| path)
    }

    /// Resolve the full path of `node_id` together with its segment count
    pub fn resolve_with_depth(&mut self, node_id: &str) -> Result<(String, usize), PathError> {
        if node_id == self.root_id {
            return Ok(("/".to_string(), 0));
        }
        if let Some(hit) = self.memo.get(node_id) {
            return Ok(hit.clone());
        }
        if !self.entries.contains_key(node_id) {
            return Err(PathError::UnknownNode(node_id.to_string()));
        }

        // Walk upwards until the root, a parentless node, an unknown parent,
        // or an ancestor whose path is already memoized.
        let mut chain: Vec<String> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut prefix = (String::new(), 0usize);
        let mut current = Some(node_id.to_string());

        while let Some(id) = current.take() {
            if id == self.root_id {
                break;
            }
            if let Some(hit) = self.memo.get(&id) {
                prefix = hit.clone();
                break;
            }
            let Some(entry) = self.entries.get(&id) else {
                // Parent outside the known hierarchy; treat the chain as top-level
                tracing::debug!(node_id, missing = %id, "Parent chain ends at unknown node");
                break;
            };
            if !visited.insert(id.clone()) {
                return Err(PathError::Cycle {
                    node_id: node_id.to_string(),
                    repeated_id: id,
                });
            }
            if chain.len() >= self.max_depth {
                return Err(PathError::DepthExceeded {
                    node_id: node_id.to_string(),
                    max_depth: self.max_depth,
                });
            }
            chain.push(id);
            current.clone_from(&entry.parent_id);
        }

        if prefix.1 + chain.len() > self.max_depth {
            return Err(PathError::DepthExceeded {
                node_id: node_id.to_string(),
                max_depth: self.max_depth,
            });
        }

        let (mut path, mut depth) = prefix;
        for id in chain.iter().rev() {
            let name = self
                .entries
                .get(id)
                .map(|entry| entry.name.as_str())
                .unwrap_or_default();
            path.push('/');
            path.push_str(name);
            depth += 1;
            self.memo.insert(id.clone(), (path.clone(), depth));
        }

        Ok((path, depth))
    }
}
