//! Single-file snapshot backend, the production default.
//!
//! A write stages the new document next to the live file, flushes it to
//! disk, and renames it over the live file. Rename within one directory is
//! atomic on every platform we target, so a crash or a failed write leaves
//! either the old document or the new one, never a truncated mix. On Unix
//! the parent directory is synced after the rename so the new entry itself
//! survives a crash, and the file is readable by its owner only.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{SnapshotBackend, StorageError};

/// Owner read/write only.
#[cfg(unix)]
const SNAPSHOT_MODE: u32 = 0o600;

/// A snapshot backend backed by one JSON file on disk.
pub struct FileBackend {
    path: PathBuf,
    staging: PathBuf,
    /// Serializes writers so two stores never share the staging file.
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileBackend {
    /// Prepare a backend for the file at `path`.
    ///
    /// Creates the parent directory if it does not exist. The file itself
    /// is created on the first [`store`](SnapshotBackend::store).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the parent directory cannot be
    /// created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Write {
                    path: parent.display().to_string(),
                    reason: format!("cannot create directory: {e}"),
                })?;
        }

        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");

        Ok(Self {
            path,
            staging: PathBuf::from(staging),
            write_lock: Mutex::new(()),
        })
    }

    /// Return the path of the live snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_staging(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(SNAPSHOT_MODE);

        let mut file = options.open(&self.staging).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;

        // `mode` only applies on creation; a leftover staging file keeps its own.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(
                &self.staging,
                std::fs::Permissions::from_mode(SNAPSHOT_MODE),
            )
            .await?;
        }
        Ok(())
    }

    /// Flush the directory entry created by the rename.
    #[cfg(unix)]
    async fn sync_parent(&self) -> std::io::Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        tokio::fs::File::open(parent).await?.sync_all().await
    }

    #[cfg(not(unix))]
    async fn sync_parent(&self) -> std::io::Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl SnapshotBackend for FileBackend {
    async fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn store(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        if let Err(e) = self.write_staging(bytes).await {
            // Best effort: a leftover staging file is harmless but untidy.
            let _ = tokio::fs::remove_file(&self.staging).await;
            return Err(StorageError::Write {
                path: self.staging.display().to_string(),
                reason: e.to_string(),
            });
        }

        tokio::fs::rename(&self.staging, &self.path)
            .await
            .map_err(|e| StorageError::Rename {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        self.sync_parent().await.map_err(|e| StorageError::Write {
            path: self.path.display().to_string(),
            reason: format!("cannot sync directory: {e}"),
        })?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "snapshot written");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
