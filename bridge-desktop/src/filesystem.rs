//! File System Access Implementation using Tokio
//!
//! Missing paths surface as [`BridgeError::NotFound`] so callers can tell a
//! file that vanished (for example, removed by the user or by an orphan
//! sweep) from a real I/O failure.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Tokio-based file system implementation
///
/// Also knows the platform data directory so hosts that don't pick their own
/// download root get a sensible default.
pub struct TokioFileSystem {
    data_dir: PathBuf,
}

impl TokioFileSystem {
    /// Accessor rooted at the platform data directory
    pub fn new() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        });

        Self {
            data_dir: base.join("audioshelf"),
        }
    }

    pub fn with_data_directory(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Application data directory.
    pub fn data_directory(&self) -> &Path {
        &self.data_dir
    }

    /// Default location for downloaded items.
    pub fn default_download_root(&self) -> PathBuf {
        self.data_dir.join("downloads")
    }

    /// Default location of the core database.
    pub fn default_database_path(&self) -> PathBuf {
        self.data_dir.join("core.db")
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn io_error(path: &Path, error: io::Error) -> BridgeError {
    match error.kind() {
        io::ErrorKind::NotFound => BridgeError::NotFound(path.display().to_string()),
        _ => BridgeError::Io(error),
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(|e| io_error(path, e))
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(|e| io_error(path, e))?;

        let modified_at = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);

        Ok(FileMetadata {
            size: metadata.len(),
            modified_at,
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| io_error(path, e))?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    /// Truncates an existing file; parent directories are created.
    async fn open_write_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncWrite + Send + Unpin>> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }

        let file = fs::File::create(path).await.map_err(|e| io_error(path, e))?;
        Ok(Box::new(file))
    }

    /// Replaces `to` when it already exists.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.map_err(|e| io_error(from, e))?;
        debug!(from = ?from, to = ?to, "Renamed file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(|e| io_error(path, e))?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn delete_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .await
            .map_err(|e| io_error(path, e))?;
        debug!(path = ?path, "Deleted directory");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut read_dir = fs::read_dir(path).await.map_err(|e| io_error(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(|e| io_error(path, e))? {
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_default_locations() {
        let fs = TokioFileSystem::with_data_directory(PathBuf::from("/data/audioshelf"));
        assert_eq!(
            fs.default_download_root(),
            PathBuf::from("/data/audioshelf/downloads")
        );
        assert_eq!(
            fs.default_database_path(),
            PathBuf::from("/data/audioshelf/core.db")
        );
    }

    #[tokio::test]
    async fn test_stage_commit_and_delete_track() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::with_data_directory(dir.path().to_path_buf());

        let staged = dir.path().join("li_1").join("0.mp3.part");
        let target = dir.path().join("li_1").join("0.mp3");

        let mut writer = fs.open_write_stream(&staged).await.unwrap();
        writer.write_all(b"audio").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);

        fs.rename(&staged, &target).await.unwrap();
        assert!(!fs.exists(&staged).await.unwrap());
        assert_eq!(fs.metadata(&target).await.unwrap().size, 5);

        let listed = fs.list_directory(&dir.path().join("li_1")).await.unwrap();
        assert_eq!(listed, vec![target.clone()]);

        fs.delete_dir_all(&dir.path().join("li_1")).await.unwrap();
        assert!(!fs.exists(&target).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::with_data_directory(dir.path().to_path_buf());
        let staged = dir.path().join("1.m4b.part");
        let target = dir.path().join("1.m4b");
        std::fs::write(&target, b"old").unwrap();
        std::fs::write(&staged, b"newer").unwrap();

        fs.rename(&staged, &target).await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"newer");
    }

    #[tokio::test]
    async fn test_missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::with_data_directory(dir.path().to_path_buf());

        let error = fs
            .delete_file(&dir.path().join("gone.mp3"))
            .await
            .unwrap_err();
        assert!(error.is_not_found());
        assert!(fs.list_directory(&dir.path().join("none")).await.is_err());
    }
}
