//! Remote file-storage provider contract.
//!
//! The engine only consumes these operations; real API clients live outside
//! this crate. [`MemoryProvider`] backs tests and JSON listing files.

mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::RemoteNode;

pub use memory::MemoryProvider;

/// Errors reported by a provider call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The requested node does not exist remotely
    #[error("Remote node not found: {0}")]
    NotFound(String),
    /// Transient failure (network, rate limit, server error)
    #[error("Remote request failed: {0}")]
    Request(String),
    /// Permanent failure; retrying will not help
    #[error("Remote request rejected: {0}")]
    Rejected(String),
    /// The change-feed cursor is no longer valid; a full listing is required
    #[error("Change cursor expired")]
    CursorExpired,
}

impl ProviderError {
    /// Whether retrying the same call may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Request(_))
    }
}

/// One page of children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildPage {
    pub nodes: Vec<RemoteNode>,
    pub next_page_token: Option<String>,
}

/// One change reported by the change feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChange {
    pub node_id: String,
    /// The node was removed from the subtree (deleted or moved out)
    pub removed: bool,
    /// Current snapshot, when the provider includes one
    pub node: Option<RemoteNode>,
}

impl RemoteChange {
    #[must_use]
    pub fn updated(node: RemoteNode) -> Self {
        Self {
            node_id: node.id.clone(),
            removed: node.is_deleted,
            node: Some(node),
        }
    }

    #[must_use]
    pub fn removed(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            removed: true,
            node: None,
        }
    }
}

/// Changes since a cursor plus the cursor to resume from next time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangePage {
    pub changes: Vec<RemoteChange>,
    pub new_cursor: String,
}

/// Remote hierarchical storage provider
#[async_trait]
pub trait RemoteProvider: Send + Sync {
    /// List direct children of `node_id`, one page at a time
    async fn list_children(
        &self,
        node_id: &str,
        page_token: Option<&str>,
    ) -> Result<ChildPage, ProviderError>;

    /// Changes within the subtree of `root_id` since `cursor`
    async fn get_changes_since(
        &self,
        root_id: &str,
        cursor: &str,
    ) -> Result<ChangePage, ProviderError>;

    /// Metadata for a single node
    async fn get_node(&self, node_id: &str) -> Result<RemoteNode, ProviderError>;

    /// Cursor marking "now" for the subtree, to be stored after a full listing.
    ///
    /// Providers without a change feed return `None`.
    async fn start_cursor(&self, _root_id: &str) -> Result<Option<String>, ProviderError> {
        Ok(None)
    }
}
