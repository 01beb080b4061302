use crate::error::BackupError;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

pub const NO_PROGRESS: f64 = -1.0;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Idle,
    Connecting,
    Uploading,
    Cleaning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidConfig,
    ConnectFailed,
    TransferFailed,
    CleanupFailed,
}

impl ErrorCode {
    pub fn code(self) -> u8 {
        match self {
            ErrorCode::InvalidConfig => 2,
            ErrorCode::ConnectFailed => 3,
            ErrorCode::TransferFailed => 4,
            ErrorCode::CleanupFailed => 6,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Status {
    pub state: State,

    pub progress: f64,

    pub message: Option<String>,

    pub error_code: Option<ErrorCode>,

    pub last_backup_timestamp: Option<DateTime<Utc>>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            state: State::Idle,
            progress: NO_PROGRESS,
            message: None,
            error_code: None,
            last_backup_timestamp: None,
        }
    }
}

/// Shared status record. Writers go through the transition methods below so
/// that `error_code` is set exactly when `state` is `Error`.
#[derive(Debug, Default)]
pub struct StatusRegister {
    status: RwLock<Status>,
    writes: AtomicU64,
}

impl StatusRegister {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn get(&self) -> Status {
        self.status.read().await.clone()
    }

    #[cfg(test)]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    async fn update<F: FnOnce(&mut Status)>(&self, f: F) {
        let mut status = self.status.write().await;
        f(&mut status);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn set_connecting(&self) {
        self.update(|s| {
            s.state = State::Connecting;
            s.progress = NO_PROGRESS;
            s.message = None;
            s.error_code = None;
        })
        .await;
    }

    pub async fn set_cleaning(&self) {
        self.update(|s| {
            s.state = State::Cleaning;
            s.progress = NO_PROGRESS;
            s.message = None;
            s.error_code = None;
        })
        .await;
    }

    pub async fn set_idle(&self) {
        self.update(|s| {
            s.state = State::Idle;
            s.progress = NO_PROGRESS;
            s.message = None;
            s.error_code = None;
        })
        .await;
    }

    pub async fn begin_upload(&self) {
        self.update(|s| {
            s.state = State::Uploading;
            s.progress = 0.0;
            s.message = None;
            s.error_code = None;
        })
        .await;
    }

    /// Records transfer progress. Returns `false` without writing when the
    /// fraction is unchanged or no upload is running.
    pub async fn set_progress(&self, fraction: f64) -> bool {
        let fraction = fraction.clamp(0.0, 1.0);
        let mut status = self.status.write().await;
        if status.state != State::Uploading || status.progress == fraction {
            return false;
        }
        status.progress = fraction;
        self.writes.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub async fn finish_upload(&self, at: DateTime<Utc>) {
        self.update(|s| {
            s.state = State::Idle;
            s.progress = NO_PROGRESS;
            s.message = None;
            s.error_code = None;
            s.last_backup_timestamp = Some(at);
        })
        .await;
    }

    pub async fn set_error(&self, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.update(|s| {
            s.state = State::Error;
            s.progress = NO_PROGRESS;
            s.message = Some(message);
            s.error_code = Some(code);
        })
        .await;
    }

    /// Publishes `err` under its taxonomy code. Failures without a code only
    /// reach the log.
    pub async fn record(&self, err: &BackupError, message: impl Into<String>) {
        match err.error_code() {
            Some(code) => self.set_error(code, message).await,
            None => warn!("{}", message.into()),
        }
    }

    pub async fn clear_error(&self, code: ErrorCode) {
        let current = self.status.read().await.error_code;
        if current == Some(code) {
            debug!("Clearing error code {}", code.code());
            self.set_idle().await;
        }
    }
}
