use std::env;
use std::path::{Path, PathBuf};

use drivemirror_core::EngineConfig;

use crate::error::CliError;

const APP_DIR_NAME: &str = "drivemirror";
const CONFIG_FILE_NAME: &str = "config.json";
const DB_FILE_NAME: &str = "mirror.db";

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(DB_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match cli_db_path.or_else(|| env::var_os("DRIVEMIRROR_DB_PATH").map(PathBuf::from)) {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

/// Engine config from `--config`, `DRIVEMIRROR_CONFIG`, or the default location.
///
/// An explicitly named file must exist. A missing default file means defaults.
pub fn load_engine_config(cli_config: Option<PathBuf>) -> Result<EngineConfig, CliError> {
    let explicit = cli_config.or_else(|| env::var_os("DRIVEMIRROR_CONFIG").map(PathBuf::from));
    if let Some(path) = explicit {
        return read_engine_config(&path);
    }

    let path = default_config_path()?;
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using engine defaults");
        return Ok(EngineConfig::default());
    }
    read_engine_config(&path)
}

pub fn read_engine_config(path: &Path) -> Result<EngineConfig, CliError> {
    let payload = std::fs::read_to_string(path).map_err(|error| {
        CliError::Config(format!("Failed to read {}: {error}", path.display()))
    })?;
    EngineConfig::from_json(&payload)
        .map_err(|error| CliError::Config(format!("Invalid config {}: {error}", path.display())))
}
