//! Error types for drivemirror-core

use thiserror::Error;

use crate::provider::ProviderError;

/// Result type alias using drivemirror-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in drivemirror-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Single remote provider call failed
    #[error("Remote provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Remote listing or change feed failed after all retries
    #[error("Remote fetch failed after {attempts} attempts: {source}")]
    ProviderFetch {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// A mirror store batch could not be written
    #[error("Batch {batch} failed after {attempts} attempts: {message}")]
    BatchApply {
        batch: usize,
        attempts: u32,
        message: String,
    },

    /// Another session holds the lock for this root
    #[error("A sync session is already running for root {0}")]
    SessionAlreadyRunning(String),

    /// The new checkpoint could not be stored
    #[error("Failed to persist checkpoint for root {root_id}: {message}")]
    CheckpointPersist { root_id: String, message: String },

    /// Hard delete requested without the explicit confirmation flag
    #[error("Hard delete requires explicit confirmation")]
    HardDeleteNotConfirmed,

    /// The session was cancelled between batches
    #[error("Sync session cancelled")]
    Cancelled,

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
