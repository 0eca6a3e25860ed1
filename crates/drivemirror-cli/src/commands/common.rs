use std::path::Path;

use drivemirror_core::db::SqliteMirrorStore;
use drivemirror_core::util::normalize_text_option;
use drivemirror_core::{MirrorRecord, RemoteNode, SyncCheckpoint, SyncSessionRecord};

use crate::error::CliError;

pub fn open_store(db_path: &Path) -> Result<SqliteMirrorStore, CliError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(SqliteMirrorStore::open(db_path)?)
}

pub fn normalize_root_id(root_id: &str) -> Result<String, CliError> {
    normalize_text_option(Some(root_id.to_string())).ok_or(CliError::EmptyRootId)
}

/// Parse a listing export: a JSON array of remote nodes
pub fn parse_listing(payload: &str, path: &Path) -> Result<Vec<RemoteNode>, CliError> {
    serde_json::from_str(payload).map_err(|error| CliError::Listing {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}

pub fn read_listing(path: &Path) -> Result<Vec<RemoteNode>, CliError> {
    let payload = std::fs::read_to_string(path).map_err(|error| CliError::Listing {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    parse_listing(&payload, path)
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

pub fn format_session_summary(record: &SyncSessionRecord) -> String {
    let counts = &record.counts;
    format!(
        "{} {} [{}{}] detected={} added={} updated={} deleted={} skipped={} errors={}",
        record.session_id,
        record.status,
        record.conflict_strategy_used,
        if record.dry_run { ", dry run" } else { "" },
        counts.detected,
        counts.added,
        counts.updated,
        counts.deleted,
        counts.skipped,
        counts.errors,
    )
}

pub fn format_session_lines(records: &[SyncSessionRecord], now_ms: i64) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            format!(
                "{} ({})  {}  {}",
                format_sync_timestamp(record.started_at),
                format_relative_time(record.started_at, now_ms),
                record.root_id,
                format_session_summary(record),
            )
        })
        .collect()
}

pub fn format_checkpoint_lines(checkpoint: &SyncCheckpoint) -> Vec<String> {
    vec![
        format!("Root:        {}", checkpoint.root_id),
        format!(
            "Last sync:   {}",
            format_sync_timestamp(checkpoint.last_successful_sync_at)
        ),
        format!(
            "Cursor:      {}",
            checkpoint
                .last_cursor_token
                .as_deref()
                .unwrap_or("(none, next sync lists the full tree)")
        ),
    ]
}

pub fn format_record_lines(records: &[MirrorRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let marker = if record.is_deleted { " (deleted)" } else { "" };
            let suffix = if record.kind.is_folder() { "/" } else { "" };
            format!("{:<12} {}{suffix}{marker}", record.id, record.path)
        })
        .collect()
}
