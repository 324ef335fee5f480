//! Centralized app data directory management
//!
//! All persistent data (logs, config) lives under the directory returned
//! by `get_app_data_dir` so a single env var can relocate everything.

use std::path::PathBuf;

const APP_IDENTIFIER: &str = "com.bsmanager.app";

/// Overrides the data directory (portable installs, tests)
const DATA_DIR_ENV: &str = "BSMANAGER_DATA_DIR";

pub const LOG_FILE_NAME: &str = "bsmanager.log";

/// Get the app data directory for persistent storage
///
/// - Windows: %LOCALAPPDATA%\com.bsmanager.app
/// - macOS: ~/Library/Application Support/com.bsmanager.app
/// - Linux: $XDG_DATA_HOME/com.bsmanager.app or ~/.local/share/com.bsmanager.app
pub fn get_app_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    dirs::data_local_dir()
        .map(|dir| dir.join(APP_IDENTIFIER))
        // Fallback to current directory
        .unwrap_or_else(|| PathBuf::from(".").join(APP_IDENTIFIER))
}

pub fn get_logs_dir() -> PathBuf {
    get_app_data_dir().join("logs")
}

pub fn get_config_path() -> PathBuf {
    get_app_data_dir().join("config.json")
}
