//! In-memory snapshot backend for testing.
//!
//! Holds the current document in a `RwLock`. Nothing is persisted; all
//! data is lost when the last clone is dropped. Clones share state, which
//! lets a test "restart" a store by opening a second one over the same
//! backend.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{SnapshotBackend, StorageError};

/// An in-memory snapshot backend.
///
/// # Examples
///
/// ```
/// # use capvault_storage::{MemoryBackend, SnapshotBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// backend.store(b"{}").await.unwrap();
/// assert_eq!(backend.load().await.unwrap(), Some(b"{}".to_vec()));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    document: Arc<RwLock<Option<Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SnapshotBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.document.read().await.clone())
    }

    async fn store(&self, bytes: &[u8]) -> Result<(), StorageError> {
        *self.document.write().await = Some(bytes.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_owned()
    }
}
