use super::artifact::{sweep_temp_dir, BackupArtifact};
use super::retention::{LocalCleanup, RetentionManager};
use crate::config::{ConfigStore, Endpoint, SettingsProvider};
use crate::error::{BackupError, Result};
use crate::remote::{ByteStream, Connector, RemoteFile, RemoteLayout, RemoteSession};
use crate::status::{ErrorCode, StatusRegister};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::File;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub struct UploadOutcome {
    pub remote_path: String,
    pub finished_at: DateTime<Utc>,
    // Failures of the spawned cleanup only reach the status register.
    pub cleanup: Option<JoinHandle<()>>,
}

/// Owns the single remote session. Callers serialize operations; nothing
/// here guards against two uploads running at once.
pub struct UploadPipeline {
    config_store: ConfigStore,
    connector: Arc<dyn Connector>,
    session: Mutex<Option<Arc<dyn RemoteSession>>>,
    status: Arc<StatusRegister>,
    settings: Arc<dyn SettingsProvider>,
    local_cleanup: Option<Arc<dyn LocalCleanup>>,
    layout: RemoteLayout,
    temp_dir: PathBuf,
}

impl UploadPipeline {
    pub fn new(
        config_store: ConfigStore,
        connector: Arc<dyn Connector>,
        status: Arc<StatusRegister>,
        settings: Arc<dyn SettingsProvider>,
        layout: RemoteLayout,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config_store,
            connector,
            session: Mutex::new(None),
            status,
            settings,
            local_cleanup: None,
            layout,
            temp_dir: temp_dir.into(),
        }
    }

    pub fn with_local_cleanup(mut self, cleanup: Arc<dyn LocalCleanup>) -> Self {
        self.local_cleanup = Some(cleanup);
        self
    }

    pub fn status(&self) -> Arc<StatusRegister> {
        self.status.clone()
    }

    pub fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    pub async fn current_session(&self) -> Result<Arc<dyn RemoteSession>> {
        self.session.lock().await.clone().ok_or(BackupError::NoSession)
    }

    async fn drop_session(&self) {
        if self.session.lock().await.take().is_some() {
            warn!("Discarding remote session after connectivity failure");
        }
    }

    async fn validated_endpoint(&self) -> Result<Endpoint> {
        let message = match self.config_store.load() {
            Ok(Some(config)) => match config.validate() {
                Some(endpoint) => {
                    self.status.clear_error(ErrorCode::InvalidConfig).await;
                    return Ok(endpoint);
                }
                None => "Remote config invalid !".to_string(),
            },
            Ok(None) => "Remote config not found !".to_string(),
            Err(e) => format!("Remote config unreadable ({}) !", e),
        };
        let err = BackupError::Config(message.clone());
        self.status.record(&err, message).await;
        Err(err)
    }

    pub async fn ensure_session(&self) -> Result<Arc<dyn RemoteSession>> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }

        let endpoint = self.validated_endpoint().await?;
        self.status.set_connecting().await;
        match self.connector.connect(&endpoint).await {
            Ok(session) => {
                info!("Connected to {}", session.describe());
                *slot = Some(session.clone());
                self.status.set_idle().await;
                Ok(session)
            }
            Err(e) => {
                let err = match e {
                    BackupError::Connect(_) => e,
                    other => BackupError::Connect(other.to_string()),
                };
                self.status.record(&err, err.to_string()).await;
                Err(err)
            }
        }
    }

    /// Uploads `<temp_dir>/<artifact_id>.tar` to `remote_path`. The local
    /// archive is removed whatever the outcome.
    pub async fn upload(&self, artifact_id: &str, remote_path: &str) -> Result<UploadOutcome> {
        let session = self.ensure_session().await?;
        let artifact = BackupArtifact::new(&self.temp_dir, artifact_id);

        self.status.begin_upload().await;
        info!("Uploading backup {} to {}...", artifact.id(), remote_path);

        let result = self.transfer(session.as_ref(), &artifact, remote_path).await;
        artifact.discard().await;

        if let Err(e) = result {
            let message = match &e {
                BackupError::Rejected(code) => {
                    format!("Fail to upload backup to remote store (Status code: {}) !", code)
                }
                BackupError::Artifact(io) => {
                    format!("Fail to read local backup {} ({}) !", artifact_id, io)
                }
                other => format!("Fail to upload backup to remote store ({}) !", other),
            };
            if matches!(e, BackupError::Transfer(_)) {
                self.drop_session().await;
            }
            let err = BackupError::Transfer(message.clone());
            self.status.record(&err, message).await;
            return Err(err);
        }

        let finished_at = Utc::now();
        self.status.finish_upload(finished_at).await;
        sweep_temp_dir(&self.temp_dir).await;

        Ok(UploadOutcome {
            remote_path: remote_path.to_string(),
            finished_at,
            cleanup: self.spawn_cleanup(session),
        })
    }

    async fn transfer(
        &self,
        session: &dyn RemoteSession,
        artifact: &BackupArtifact,
        remote_path: &str,
    ) -> Result<()> {
        let size = artifact.size().await?;
        let file = artifact.open().await?;
        let body = progress_stream(file, size, self.status.clone());
        session.put(remote_path, body, size).await
    }

    fn spawn_cleanup(&self, session: Arc<dyn RemoteSession>) -> Option<JoinHandle<()>> {
        let settings = self.settings.settings();
        let keep = settings.auto_clean_local_keep;

        let local = if settings.auto_clean_local {
            if self.local_cleanup.is_none() {
                warn!("Local auto-clean enabled but no local cleanup is configured");
            }
            self.local_cleanup.clone()
        } else {
            None
        };
        if !settings.auto_clean_backup && local.is_none() {
            return None;
        }

        let retention = settings
            .auto_clean_backup
            .then(|| RetentionManager::new(self.status.clone()));
        let dir = self.layout.auto();

        Some(tokio::spawn(async move {
            if let Some(retention) = retention {
                if let Err(e) = retention.clean(session.as_ref(), &dir, keep).await {
                    warn!("Remote retention after upload failed: {}", e);
                }
            }
            if let Some(local) = local {
                if let Err(e) = local.clean(keep).await {
                    warn!("Local retention after upload failed: {}", e);
                }
            }
        }))
    }

    pub async fn clean_now(&self, keep: Option<usize>) -> Result<usize> {
        let keep = keep.unwrap_or_else(|| self.settings.settings().auto_clean_local_keep);
        let retention = RetentionManager::new(self.status.clone());
        let session = match self.current_session().await {
            Ok(session) => session,
            Err(e) => return Err(retention.fail(e).await),
        };

        self.status.set_cleaning().await;
        let removed = retention.clean(session.as_ref(), &self.layout.auto(), keep).await?;
        self.status.set_idle().await;
        Ok(removed)
    }

    pub async fn list_directory(&self, path: &str) -> Result<Vec<RemoteFile>> {
        let session = self.current_session().await?;
        session.list_directory(path).await
    }
}

fn progress_stream(file: File, size: u64, status: Arc<StatusRegister>) -> ByteStream {
    let sent = Arc::new(AtomicU64::new(0));
    ReaderStream::with_capacity(file, CHUNK_SIZE)
        .then(move |chunk| {
            let status = status.clone();
            let sent = sent.clone();
            async move {
                if let Ok(bytes) = &chunk {
                    let len = bytes.len() as u64;
                    let total = sent.fetch_add(len, Ordering::Relaxed) + len;
                    let fraction = if size == 0 {
                        1.0
                    } else {
                        total as f64 / size as f64
                    };
                    if status.set_progress(fraction).await && fraction >= 1.0 {
                        info!("Upload done...");
                    }
                }
                chunk
            }
        })
        .boxed()
}
