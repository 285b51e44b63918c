/// Canonical file paths for WallSwitch data files.
///
/// Both files live in the per-user configuration directory
/// (%APPDATA%\WallSwitch\ on Windows, ~/.config/WallSwitch/ on Linux):
///   - config.toml  Written by the user or a UI, read by the daemon.
///   - status.toml  Written by the daemon, read by UIs.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "WallSwitch";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the WallSwitch application data directory.
pub fn app_data_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine the user config directory")?;
    Ok(base.join(APP_DIR_NAME))
}

/// Returns the full path to the config file inside `app_dir`.
pub fn config_file_path(app_dir: &Path) -> PathBuf {
    app_dir.join(CONFIG_FILE_NAME)
}

/// Returns the full path to the status file inside `app_dir`.
pub fn status_file_path(app_dir: &Path) -> PathBuf {
    app_dir.join(STATUS_FILE_NAME)
}
