use std::path::Path;

use drivemirror_core::db::MirrorStore;
use drivemirror_core::util::unix_millis_now;

use crate::commands::common::{format_session_lines, normalize_root_id, open_store};
use crate::error::CliError;

pub async fn run_history(
    root: Option<&str>,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let root = root.map(normalize_root_id).transpose()?;
    let store = open_store(db_path)?;
    let records = store.list_session_records(root.as_deref(), limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No sync sessions recorded.");
        return Ok(());
    }

    for line in format_session_lines(&records, unix_millis_now()) {
        println!("{line}");
    }
    Ok(())
}
