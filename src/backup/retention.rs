use crate::error::{BackupError, Result};
use crate::remote::{RemoteFile, RemoteSession};
use crate::status::StatusRegister;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Entries to delete so that only the `keep` most recent remain. Equal
/// times fall back to the path, the greater path ranking newer.
pub fn deletion_set(mut entries: Vec<RemoteFile>, keep: usize) -> Vec<RemoteFile> {
    if entries.len() < keep {
        return Vec::new();
    }
    entries.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| b.path.cmp(&a.path))
    });
    entries.split_off(keep)
}

pub struct RetentionManager {
    status: Arc<StatusRegister>,
}

impl RetentionManager {
    pub fn new(status: Arc<StatusRegister>) -> Self {
        Self { status }
    }

    pub async fn clean(&self, session: &dyn RemoteSession, dir: &str, keep: usize) -> Result<usize> {
        match prune(session, dir, keep).await {
            Ok(removed) => {
                info!("Cloud clean done ({} removed from {}).", removed, dir);
                Ok(removed)
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    // Also used when the cleanup cannot start, e.g. without a session.
    pub async fn fail(&self, err: BackupError) -> BackupError {
        let message = format!("Fail to clean remote store ({}) !", err);
        let err = BackupError::Cleanup(message.clone());
        self.status.record(&err, message).await;
        err
    }
}

async fn prune(session: &dyn RemoteSession, dir: &str, keep: usize) -> Result<usize> {
    let entries = session
        .list_directory(dir)
        .await?
        .into_iter()
        .filter(|entry| !entry.is_dir)
        .collect();
    let doomed = deletion_set(entries, keep);
    for entry in &doomed {
        debug!("Deleting old backup {}", entry.path);
        session.delete(&entry.path).await?;
    }
    Ok(doomed.len())
}

#[async_trait]
pub trait LocalCleanup: Send + Sync {
    async fn clean(&self, keep: usize) -> Result<usize>;
}

pub struct LocalDirCleanup {
    dir: PathBuf,
}

impl LocalDirCleanup {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl LocalCleanup for LocalDirCleanup {
    async fn clean(&self, keep: usize) -> Result<usize> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified: DateTime<Utc> = metadata.modified()?.into();
            entries.push(RemoteFile {
                path: entry.path().to_string_lossy().to_string(),
                last_modified: modified,
                is_dir: false,
            });
        }

        let doomed = deletion_set(entries, keep);
        for entry in &doomed {
            fs::remove_file(&entry.path).await?;
        }
        info!("Local clean done ({} removed from {:?}).", doomed.len(), self.dir);
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::MemorySession;
    use crate::status::{ErrorCode, State};
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
    }

    fn file(path: &str, d: u32) -> RemoteFile {
        RemoteFile {
            path: path.to_string(),
            last_modified: day(d),
            is_dir: false,
        }
    }

    fn seeded(count: u32) -> Arc<MemorySession> {
        let session = MemorySession::new();
        // Inserted out of order so sorting is exercised.
        for d in (1..=count).rev() {
            session.add_file(&format!("/Backups/auto/{}.tar", d), day(d));
        }
        session
    }

    #[test]
    fn test_deletion_set_below_and_at_threshold() {
        let entries = vec![file("a", 1), file("b", 2)];
        assert!(deletion_set(entries.clone(), 3).is_empty());
        assert!(deletion_set(entries, 2).is_empty());
    }

    #[test]
    fn test_deletion_set_takes_oldest() {
        let entries = vec![file("c", 3), file("a", 1), file("e", 5), file("b", 2), file("d", 4)];
        let doomed: Vec<_> = deletion_set(entries, 3).into_iter().map(|f| f.path).collect();
        assert_eq!(doomed, vec!["b", "a"]);
    }

    #[test]
    fn test_deletion_set_ties_are_deterministic() {
        let entries = vec![file("x", 1), file("z", 1), file("y", 1)];
        let doomed: Vec<_> = deletion_set(entries, 1).into_iter().map(|f| f.path).collect();
        assert_eq!(doomed, vec!["y", "x"]);
    }

    #[tokio::test]
    async fn test_clean_seven_keeps_five_newest() {
        let session = seeded(7);
        let status = StatusRegister::new();
        let manager = RetentionManager::new(status.clone());

        let removed = manager.clean(session.as_ref(), "/Backups/auto/", 5).await.unwrap();
        assert_eq!(removed, 2);

        let mut deleted = session.deleted.lock().unwrap().clone();
        deleted.sort();
        assert_eq!(deleted, vec!["/Backups/auto/1.tar", "/Backups/auto/2.tar"]);
        assert_eq!(session.file_paths().len(), 5);
        assert_eq!(status.get().await.state, State::Idle);
    }

    #[tokio::test]
    async fn test_clean_is_idempotent() {
        let session = seeded(8);
        let manager = RetentionManager::new(StatusRegister::new());

        assert_eq!(manager.clean(session.as_ref(), "/Backups/auto/", 5).await.unwrap(), 3);
        assert_eq!(manager.clean(session.as_ref(), "/Backups/auto/", 5).await.unwrap(), 0);
        assert_eq!(session.deleted.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_clean_exact_count_deletes_nothing() {
        let session = seeded(5);
        let manager = RetentionManager::new(StatusRegister::new());
        assert_eq!(manager.clean(session.as_ref(), "/Backups/auto/", 5).await.unwrap(), 0);
        assert!(session.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subfolders_are_neither_counted_nor_deleted() {
        let session = seeded(5);
        session.dirs.lock().unwrap().insert("/Backups/auto/archive/".to_string());
        let status = StatusRegister::new();
        let manager = RetentionManager::new(status.clone());

        assert_eq!(manager.clean(session.as_ref(), "/Backups/auto/", 5).await.unwrap(), 0);
        assert!(session.deleted.lock().unwrap().is_empty());
        assert_eq!(status.get().await.state, State::Idle);

        session.add_file("/Backups/auto/6.tar", day(6));
        assert_eq!(manager.clean(session.as_ref(), "/Backups/auto/", 5).await.unwrap(), 1);
        assert_eq!(session.deleted.lock().unwrap().clone(), vec!["/Backups/auto/1.tar"]);
        assert!(session.dirs.lock().unwrap().contains("/Backups/auto/archive/"));
    }

    #[tokio::test]
    async fn test_delete_failure_aborts_and_sets_error() {
        let session = seeded(8);
        // The tail is deleted in rank order: 3, then 2, then 1.
        *session.fail_delete_on.lock().unwrap() = Some("/Backups/auto/2.tar".to_string());
        let status = StatusRegister::new();
        let manager = RetentionManager::new(status.clone());

        let err = manager.clean(session.as_ref(), "/Backups/auto/", 5).await.unwrap_err();
        assert!(matches!(err, BackupError::Cleanup(_)));
        assert_eq!(session.deleted.lock().unwrap().clone(), vec!["/Backups/auto/3.tar"]);
        assert!(session.file_paths().contains(&"/Backups/auto/1.tar".to_string()));

        let snapshot = status.get().await;
        assert_eq!(snapshot.state, State::Error);
        assert_eq!(snapshot.error_code, Some(ErrorCode::CleanupFailed));
        assert!(snapshot.message.unwrap().contains("locked"));
    }

    #[tokio::test]
    async fn test_listing_failure_sets_error() {
        let session = seeded(3);
        session.fail_list.store(true, Ordering::SeqCst);
        let status = StatusRegister::new();

        let result = RetentionManager::new(status.clone())
            .clean(session.as_ref(), "/Backups/auto/", 5)
            .await;
        assert!(result.is_err());
        assert_eq!(status.get().await.error_code, Some(ErrorCode::CleanupFailed));
    }

    #[tokio::test]
    async fn test_local_dir_cleanup_keeps_newest() {
        let dir = tempdir().unwrap();
        for (i, name) in ["old.tar", "mid.tar", "new.tar"].iter().enumerate() {
            let path = dir.path().join(name);
            std::fs::write(&path, b"x").unwrap();
            let mtime = std::time::SystemTime::UNIX_EPOCH
                + std::time::Duration::from_secs(1_700_000_000 + i as u64 * 60);
            std::fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(mtime)
                .unwrap();
        }

        let removed = LocalDirCleanup::new(dir.path()).clean(2).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!dir.path().join("old.tar").exists());
        assert!(dir.path().join("new.tar").exists());
    }
}
