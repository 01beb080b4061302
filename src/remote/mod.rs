mod propfind;
mod webdav;

pub use webdav::WebdavConnector;

use crate::config::Endpoint;
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::sync::Arc;
use tracing::{debug, info};

pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

// `/` stays unescaped as the separator.
const PATH_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^');

pub(crate) fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ESCAPES).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    pub last_modified: DateTime<Utc>,
    pub is_dir: bool,
}

#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteFile>>;
    async fn create_directory(&self, path: &str) -> Result<()>;
    async fn put(&self, path: &str, body: ByteStream, length: u64) -> Result<()>;
    async fn delete(&self, path: &str) -> Result<()>;
    fn describe(&self) -> String;
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn RemoteSession>>;
}

pub fn check_put_status(code: u16) -> Result<()> {
    match code {
        201 | 204 => Ok(()),
        other => Err(BackupError::Rejected(other)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    Auto,
    Manual,
}

// `<root>/`, `<root>/auto/` and `<root>/manual/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    root: String,
}

impl RemoteLayout {
    pub fn new(root: &str) -> Self {
        let trimmed = root.trim_matches('/');
        let root = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", trimmed)
        };
        Self { root }
    }

    pub fn auto(&self) -> String {
        format!("{}auto/", self.root)
    }

    pub fn manual(&self) -> String {
        format!("{}manual/", self.root)
    }

    pub fn folder(&self, kind: BackupKind) -> String {
        match kind {
            BackupKind::Auto => self.auto(),
            BackupKind::Manual => self.manual(),
        }
    }

    pub fn file_path(&self, kind: BackupKind, name: &str) -> String {
        format!("{}{}", self.folder(kind), name.trim_start_matches('/'))
    }

    fn folders(&self) -> [String; 3] {
        [self.root.clone(), self.auto(), self.manual()]
    }
}

/// Probes the store by listing `/`, then creates the backup folders.
/// Folder creation is best-effort: failures are logged and skipped.
pub async fn establish<S: RemoteSession + ?Sized>(session: &S, layout: &RemoteLayout) -> Result<()> {
    info!("Checking remote store at {}", session.describe());
    session
        .list_directory("/")
        .await
        .map_err(|e| BackupError::Connect(e.to_string()))?;
    debug!("Remote store connection: success");

    for folder in layout.folders() {
        if let Err(e) = session.create_directory(&folder).await {
            debug!("Skipping folder {}: {}", folder, e);
        }
    }
    Ok(())
}
