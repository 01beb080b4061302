use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_KEEP: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

impl std::str::FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(format!("unknown scheme '{}'", other)),
        }
    }
}

/// Endpoint record as persisted. Any field may be absent on disk; use
/// [`RemoteEndpointConfig::validate`] before connecting.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoteEndpointConfig {
    pub scheme: Option<Scheme>,
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub username: String,
    pub password: String,
}

impl RemoteEndpointConfig {
    pub fn new(scheme: Scheme, host: &str, username: &str, password: &str) -> Self {
        Self {
            scheme: Some(scheme),
            host: Some(host.to_string()),
            username: Some(username.to_string()),
            password: Some(password.to_string()),
        }
    }

    pub fn validate(&self) -> Option<Endpoint> {
        Some(Endpoint {
            scheme: self.scheme?,
            host: self.host.clone()?,
            username: self.username.clone()?,
            password: self.password.clone()?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub auto_clean_backup: bool,
    #[serde(default)]
    pub auto_clean_local: bool,
    #[serde(default = "default_keep")]
    pub auto_clean_local_keep: usize,
}

fn default_keep() -> usize {
    DEFAULT_KEEP
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_clean_backup: false,
            auto_clean_local: false,
            auto_clean_local_keep: DEFAULT_KEEP,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default = "default_endpoint_config")]
    pub endpoint_config: PathBuf,
    #[serde(default = "default_webdav_root")]
    pub webdav_root: String,
    #[serde(default = "default_remote_root")]
    pub remote_root: String,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub local_backup_dir: Option<PathBuf>,
    #[serde(default)]
    pub settings: Settings,
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_endpoint_config() -> PathBuf {
    PathBuf::from("/data/webdav_conf.json")
}

fn default_webdav_root() -> String {
    "/remote.php/webdav".to_string()
}

fn default_remote_root() -> String {
    "/Backups".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            endpoint_config: default_endpoint_config(),
            webdav_root: default_webdav_root(),
            remote_root: default_remote_root(),
            request_timeout_secs: None,
            local_backup_dir: None,
            settings: Settings::default(),
        }
    }
}
