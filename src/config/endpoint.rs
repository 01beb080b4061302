use super::types::RemoteEndpointConfig;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<RemoteEndpointConfig>> {
        if !self.path.exists() {
            debug!("Endpoint config not found at {:?}", self.path);
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        let config: RemoteEndpointConfig = serde_json::from_str(&contents)?;
        Ok(Some(config))
    }

    pub fn save(&self, config: &RemoteEndpointConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(&self.path, serde_json::to_string(config)?)?;
        info!("Endpoint config saved to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scheme;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_no_config() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("webdav_conf.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("webdav_conf.json"));
        let config = RemoteEndpointConfig::new(Scheme::Https, "nc.example.com", "u", "p");

        store.save(&config).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.validate().is_some());
    }

    #[test]
    fn test_null_field_fails_validation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("webdav_conf.json");
        fs::write(
            &path,
            r#"{"scheme":"https","host":"nc.example.com","username":null,"password":"p"}"#,
        )
        .unwrap();

        let loaded = ConfigStore::new(&path).load().unwrap().unwrap();
        assert_eq!(loaded.host.as_deref(), Some("nc.example.com"));
        assert!(loaded.validate().is_none());
    }

    #[test]
    fn test_absent_field_fails_validation() {
        let config: RemoteEndpointConfig =
            serde_json::from_str(r#"{"scheme":"http","host":"h","username":"u"}"#).unwrap();
        assert!(config.validate().is_none());
    }
}
