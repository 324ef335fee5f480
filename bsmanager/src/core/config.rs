//! Persisted user configuration
//!
//! Only the game root folder is stored. The library root is derived from it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::app_dirs;
use crate::logger;

/// Default CDN serving map archives as `{base}/{hash}.zip`
pub const DEFAULT_CDN_BASE: &str = "https://r2cdn.beatsaver.com";

const CDN_BASE_ENV: &str = "BSMANAGER_CDN_URL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Folder containing the game executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beat_saber_root: Option<PathBuf>,
}

impl AppConfig {
    /// Load the config from the app data directory; an unreadable file yields defaults
    pub fn load() -> Self {
        Self::load_from(&app_dirs::get_config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                logger::log_error(
                    &format!("Ignoring unreadable config {}: {}", path.display(), e),
                    Some("config"),
                );
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&app_dirs::get_config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Resolve (and create) the library root for the configured game folder
    pub fn library_root(&self) -> Result<Option<PathBuf>> {
        match &self.beat_saber_root {
            Some(root) if root.is_dir() => custom_levels_path(root).map(Some),
            _ => Ok(None),
        }
    }
}

/// `<game root>/Beat Saber_Data/CustomLevels`, created when missing
pub fn custom_levels_path(game_root: &Path) -> Result<PathBuf> {
    let levels = game_root.join("Beat Saber_Data").join("CustomLevels");
    fs::create_dir_all(&levels)
        .with_context(|| format!("Failed to create {}", levels.display()))?;
    Ok(levels)
}

pub fn cdn_base() -> String {
    std::env::var(CDN_BASE_ENV)
        .ok()
        .map(|url| url.trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_CDN_BASE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_yields_default() {
        let temp = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&temp.path().join("config.json"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_garbage_config_yields_default() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }

    #[test]
    fn test_round_trip_and_library_root() {
        let temp = tempfile::tempdir().unwrap();
        let game = temp.path().join("Beat Saber");
        fs::create_dir_all(&game).unwrap();

        let path = temp.path().join("data").join("config.json");
        let config = AppConfig {
            beat_saber_root: Some(game.clone()),
        };
        config.save_to(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("beatSaberRoot"));

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded, config);

        let levels = loaded.library_root().unwrap().unwrap();
        assert!(levels.ends_with("Beat Saber_Data/CustomLevels"));
        assert!(levels.is_dir());
    }

    #[test]
    fn test_library_root_absent_when_folder_missing() {
        let temp = tempfile::tempdir().unwrap();
        let config = AppConfig {
            beat_saber_root: Some(temp.path().join("gone")),
        };
        assert!(config.library_root().unwrap().is_none());
        assert!(AppConfig::default().library_root().unwrap().is_none());
    }
}
