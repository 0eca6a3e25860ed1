use std::path::Path;

use drivemirror_core::db::MirrorStore;

use crate::commands::common::{format_checkpoint_lines, normalize_root_id, open_store};
use crate::error::CliError;

pub async fn run_checkpoint(root_id: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let root_id = normalize_root_id(root_id)?;
    let store = open_store(db_path)?;
    let checkpoint = store
        .load_checkpoint(&root_id)
        .await?
        .ok_or_else(|| CliError::NoCheckpoint(root_id.clone()))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
    } else {
        for line in format_checkpoint_lines(&checkpoint) {
            println!("{line}");
        }
    }
    Ok(())
}
