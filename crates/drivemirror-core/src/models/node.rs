//! Remote node model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mime type the remote provider reports for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Whether a node is a file or a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Regular file
    #[default]
    File,
    /// Folder that may contain other nodes
    Folder,
}

impl NodeKind {
    /// Derive the kind from a provider mime type
    #[must_use]
    pub fn from_mime_type(mime_type: &str) -> Self {
        if mime_type.trim() == FOLDER_MIME_TYPE {
            Self::Folder
        } else {
            Self::File
        }
    }

    /// Database/string representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
        }
    }

    #[must_use]
    pub const fn is_folder(self) -> bool {
        matches!(self, Self::Folder)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "folder" => Ok(Self::Folder),
            other => Err(format!("unknown node kind '{other}'")),
        }
    }
}

/// A node as reported by the remote provider.
///
/// Immutable snapshot for one sync pass; the engine never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNode {
    /// Opaque, stable provider identifier
    pub id: String,
    /// Parent identifier (`None` for a top-level node)
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Display name
    pub name: String,
    /// File or folder
    pub kind: NodeKind,
    /// Remote modification time (Unix ms)
    pub modified_at: i64,
    /// Size in bytes, when the provider reports one
    #[serde(default)]
    pub size_bytes: Option<i64>,
    /// Provider mime type
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Provider-reported tombstone (trashed)
    #[serde(default)]
    pub is_deleted: bool,
}

impl RemoteNode {
    /// Create a folder node
    #[must_use]
    pub fn folder(
        id: impl Into<String>,
        parent_id: Option<&str>,
        name: impl Into<String>,
        modified_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            name: name.into(),
            kind: NodeKind::Folder,
            modified_at,
            size_bytes: None,
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            is_deleted: false,
        }
    }

    /// Create a file node
    #[must_use]
    pub fn file(
        id: impl Into<String>,
        parent_id: Option<&str>,
        name: impl Into<String>,
        modified_at: i64,
        size_bytes: i64,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            name: name.into(),
            kind: NodeKind::File,
            modified_at,
            size_bytes: Some(size_bytes),
            mime_type: None,
            is_deleted: false,
        }
    }
}
