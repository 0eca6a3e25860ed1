//! drivemirror-core - Core library for drivemirror
//!
//! This crate keeps a local `SQLite` mirror consistent with a remote
//! hierarchical file store. It contains the shared models, the mirror store,
//! the remote provider contract, and the sync reconciliation engine used by
//! the CLI.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod provider;
pub mod sync;
pub mod util;

pub use config::{EngineConfig, RetryPolicy};
pub use error::{Error, Result};
pub use models::{
    CleanupMode, ConflictStrategy, MirrorRecord, NodeKind, RemoteNode, SessionCounts,
    SessionStatus, SyncCheckpoint, SyncSessionRecord,
};
pub use sync::{SyncEngine, SyncOptions};
