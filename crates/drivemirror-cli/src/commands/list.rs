use std::path::Path;

use crate::commands::common::{format_record_lines, normalize_root_id, open_store};
use crate::error::CliError;

pub async fn run_list(
    root_id: &str,
    include_deleted: bool,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let root_id = normalize_root_id(root_id)?;
    let store = open_store(db_path)?;
    let records = store.list_records(&root_id, include_deleted).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No mirror rows for root {root_id}.");
        return Ok(());
    }

    for line in format_record_lines(&records) {
        println!("{line}");
    }
    Ok(())
}
