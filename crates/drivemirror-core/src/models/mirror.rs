//! Mirror record model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{NodeKind, RemoteNode};

/// Fields owned by the mirror independently of the remote (tags, classification, ...)
pub type LocalFields = BTreeMap<String, serde_json::Value>;

/// The local row shadowing a [`RemoteNode`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorRecord {
    /// Same identifier as the remote node
    pub id: String,
    /// Parent identifier
    pub parent_id: Option<String>,
    /// Display name
    pub name: String,
    /// File or folder
    pub kind: NodeKind,
    /// Remote modification time last accepted into the mirror (Unix ms)
    pub remote_modified_at: Option<i64>,
    /// Size in bytes
    pub size_bytes: Option<i64>,
    /// Provider mime type
    pub mime_type: Option<String>,
    /// Mirror-owned fields, never touched by sync
    pub local_fields: LocalFields,
    /// Denormalized full path, derived from the parent chain
    pub path: String,
    /// Number of segments in `path`
    pub path_depth: i64,
    /// Top-level subtree this record belongs to
    pub root_id: String,
    /// Soft delete flag
    pub is_deleted: bool,
    /// When the row was soft-deleted (Unix ms)
    pub deleted_at: Option<i64>,
    /// Last time sync wrote this row (Unix ms)
    pub last_synced_at: i64,
}

impl MirrorRecord {
    /// Build a fresh record from a remote node.
    ///
    /// `path` is left empty; the batch applier fills it in from the path resolver.
    #[must_use]
    pub fn from_remote(remote: &RemoteNode, root_id: &str, synced_at: i64) -> Self {
        Self {
            id: remote.id.clone(),
            parent_id: remote.parent_id.clone(),
            name: remote.name.clone(),
            kind: remote.kind,
            remote_modified_at: Some(remote.modified_at),
            size_bytes: remote.size_bytes,
            mime_type: remote.mime_type.clone(),
            local_fields: LocalFields::new(),
            path: String::new(),
            path_depth: 0,
            root_id: root_id.to_string(),
            is_deleted: false,
            deleted_at: None,
            last_synced_at: synced_at,
        }
    }

    /// Whether every remote-owned field matches `other`
    #[must_use]
    pub fn same_remote_fields(&self, other: &Self) -> bool {
        self.parent_id == other.parent_id
            && self.name == other.name
            && self.kind == other.kind
            && self.remote_modified_at == other.remote_modified_at
            && self.size_bytes == other.size_bytes
            && self.mime_type == other.mime_type
    }

    /// Active (not soft-deleted)
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_deleted
    }
}
