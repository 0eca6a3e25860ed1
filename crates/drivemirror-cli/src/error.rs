use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] drivemirror_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Failed to read listing {path}: {message}")]
    Listing { path: PathBuf, message: String },
    #[error("Root ID cannot be empty")]
    EmptyRootId,
    #[error("No checkpoint stored for root {0}")]
    NoCheckpoint(String),
    #[error("Sync session {session_id} failed")]
    SessionFailed { session_id: String },
}
