mod endpoint;
mod types;

pub use endpoint::ConfigStore;
pub use types::*;

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".nc_backup_uploader"))
        .unwrap_or_else(|| PathBuf::from(".nc_backup_uploader"))
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn load_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        debug!("Config file not found at {:?}, using defaults", path);
        return Ok(AppConfig::default());
    }

    info!("Loading configuration from {:?}", path);
    let contents = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&contents)?;
    Ok(config)
}

pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> Settings;
}

impl SettingsProvider for Settings {
    fn settings(&self) -> Settings {
        self.clone()
    }
}

// Re-reads the `[settings]` table on every call.
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsProvider for FileSettings {
    fn settings(&self) -> Settings {
        match load_from(&self.path) {
            Ok(config) => config.settings,
            Err(e) => {
                warn!("Failed to read settings from {:?}: {}", self.path, e);
                Settings::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig {
            temp_dir: PathBuf::from("/tmp/archives"),
            remote_root: "/Nightly".to_string(),
            settings: Settings {
                auto_clean_backup: true,
                auto_clean_local: false,
                auto_clean_local_keep: 3,
            },
            ..AppConfig::default()
        };

        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
        let loaded = load_from(&path).unwrap();

        assert_eq!(loaded.temp_dir, PathBuf::from("/tmp/archives"));
        assert_eq!(loaded.remote_root, "/Nightly");
        assert_eq!(loaded.webdav_root, "/remote.php/webdav");
        assert_eq!(loaded.settings.auto_clean_local_keep, 3);
        assert!(loaded.settings.auto_clean_backup);
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let loaded = load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.settings, Settings::default());
        assert_eq!(loaded.settings.auto_clean_local_keep, DEFAULT_KEEP);
    }

    #[test]
    fn test_partial_settings_default_keep() {
        let config: AppConfig = toml::from_str("[settings]\nauto_clean_backup = true\n").unwrap();
        assert!(config.settings.auto_clean_backup);
        assert!(!config.settings.auto_clean_local);
        assert_eq!(config.settings.auto_clean_local_keep, 5);
    }

    #[test]
    fn test_file_settings_follow_edits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let provider = FileSettings::new(&path);
        assert!(!provider.settings().auto_clean_local);

        fs::write(&path, "[settings]\nauto_clean_local = true\nauto_clean_local_keep = 2\n").unwrap();
        let settings = provider.settings();
        assert!(settings.auto_clean_local);
        assert_eq!(settings.auto_clean_local_keep, 2);
    }
}
