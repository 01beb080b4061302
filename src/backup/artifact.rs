use crate::error::{BackupError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct BackupArtifact {
    id: String,
    path: PathBuf,
}

impl BackupArtifact {
    pub fn new(temp_dir: &Path, id: &str) -> Self {
        Self {
            id: id.to_string(),
            path: temp_dir.join(format!("{}.tar", id)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn size(&self) -> Result<u64> {
        let metadata = fs::metadata(&self.path).await.map_err(BackupError::Artifact)?;
        Ok(metadata.len())
    }

    pub async fn open(&self) -> Result<File> {
        File::open(&self.path).await.map_err(BackupError::Artifact)
    }

    // Errors are logged, never returned.
    pub async fn discard(self) {
        match fs::remove_file(&self.path).await {
            Ok(()) => debug!("Removed local archive {:?}", self.path),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Local archive {:?} already gone", self.path)
            }
            Err(e) => warn!("Failed to remove local archive {:?}: {}", self.path, e),
        }
    }
}

pub async fn sweep_temp_dir(dir: &Path) -> usize {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read temp directory {:?}: {}", dir, e);
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to walk temp directory {:?}: {}", dir, e);
                break;
            }
        };
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        match fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove {:?}: {}", entry.path(), e),
        }
    }

    debug!("Temp sweep removed {} file(s) from {:?}", removed, dir);
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_artifact_is_artifact_error() {
        let dir = tempdir().unwrap();
        let artifact = BackupArtifact::new(dir.path(), "42");

        let err = artifact.size().await.unwrap_err();
        assert!(matches!(err, BackupError::Artifact(ref e) if e.kind() == ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_discard_removes_file_and_tolerates_absence() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("7.tar"), b"data").unwrap();

        let artifact = BackupArtifact::new(dir.path(), "7");
        assert_eq!(artifact.size().await.unwrap(), 4);
        artifact.discard().await;
        assert!(!dir.path().join("7.tar").exists());

        BackupArtifact::new(dir.path(), "7").discard().await;
    }

    #[tokio::test]
    async fn test_sweep_removes_files_only() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.tar"), b"a").unwrap();
        std::fs::write(dir.path().join("b.tmp"), b"b").unwrap();
        std::fs::create_dir(dir.path().join("keep")).unwrap();

        assert_eq!(sweep_temp_dir(dir.path()).await, 2);
        assert!(dir.path().join("keep").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_sweep_missing_dir_is_harmless() {
        let dir = tempdir().unwrap();
        assert_eq!(sweep_temp_dir(&dir.path().join("absent")).await, 0);
    }
}
