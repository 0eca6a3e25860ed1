//! Checkpoint and session history models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ConflictStrategy;

/// A unique identifier for a sync session, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new unique session ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Per-subtree cursor state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCheckpoint {
    pub root_id: String,
    /// Unix ms of the last fully completed pass
    pub last_successful_sync_at: i64,
    /// Provider change-feed cursor; `None` forces a full listing
    pub last_cursor_token: Option<String>,
}

impl SyncCheckpoint {
    #[must_use]
    pub fn new(root_id: impl Into<String>, at: i64, cursor: Option<String>) -> Self {
        Self {
            root_id: root_id.into(),
            last_successful_sync_at: at,
            last_cursor_token: cursor,
        }
    }
}

/// Final state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl SessionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "completed_with_errors" => Ok(Self::CompletedWithErrors),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

/// Per-session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounts {
    /// Entries in the detected change set
    pub detected: usize,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Modified entries the conflict strategy left unchanged
    pub skipped: usize,
    pub errors: usize,
}

/// Append-only audit entry for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSessionRecord {
    pub session_id: SessionId,
    pub root_id: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub status: SessionStatus,
    pub counts: SessionCounts,
    pub conflict_strategy_used: ConflictStrategy,
    pub dry_run: bool,
    /// Every error the session absorbed or failed on
    pub errors: Vec<String>,
}

impl SyncSessionRecord {
    /// Start a new running session record
    #[must_use]
    pub fn start(root_id: impl Into<String>, strategy: ConflictStrategy, dry_run: bool) -> Self {
        Self {
            session_id: SessionId::new(),
            root_id: root_id.into(),
            started_at: crate::util::unix_millis_now(),
            finished_at: None,
            status: SessionStatus::Running,
            counts: SessionCounts::default(),
            conflict_strategy_used: strategy,
            dry_run,
            errors: Vec::new(),
        }
    }

    /// Record an error and bump the error counter
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.counts.errors += 1;
    }

    /// Close the record with a terminal status
    pub fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.finished_at = Some(crate::util::unix_millis_now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_parse() {
        let id = SessionId::new();
        let parsed: SessionId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn status_serialization_matches_as_str() {
        for status in [
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::CompletedWithErrors,
            SessionStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn push_error_counts() {
        let mut record = SyncSessionRecord::start("root", ConflictStrategy::Newer, false);
        record.push_error("cycle at n1");
        record.push_error("depth exceeded at n2");
        assert_eq!(record.counts.errors, 2);
        assert_eq!(record.errors.len(), 2);
        assert_eq!(record.status, SessionStatus::Running);

        record.finish(SessionStatus::CompletedWithErrors);
        assert!(record.finished_at.is_some());
    }
}
