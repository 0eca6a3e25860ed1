//! Data models for drivemirror

mod mirror;
mod node;
mod session;
mod strategy;

pub use mirror::{LocalFields, MirrorRecord};
pub use node::{NodeKind, RemoteNode, FOLDER_MIME_TYPE};
pub use session::{SessionCounts, SessionId, SessionStatus, SyncCheckpoint, SyncSessionRecord};
pub use strategy::{CleanupMode, ConflictStrategy};
