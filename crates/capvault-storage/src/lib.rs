//! Snapshot storage for `capvault`.
//!
//! This crate defines the [`SnapshotBackend`] trait, a whole-document
//! storage interface that knows nothing about records, keys, or encryption.
//! The capability store in `capvault-core` serializes its entire collection
//! into one document and hands the bytes to a backend on every mutation.
//!
//! Two implementations are provided:
//!
//! - [`FileBackend`] — production default, a single file replaced atomically
//! - [`MemoryBackend`] — in-memory, for testing only

mod error;
mod file;
mod memory;

pub use error::StorageError;
pub use file::FileBackend;
pub use memory::MemoryBackend;

/// A pluggable whole-document storage backend.
///
/// The document is the unit of durability: [`store`](SnapshotBackend::store)
/// either replaces the previous document completely or leaves it untouched.
/// A reader must never observe a partially written document.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait SnapshotBackend: Send + Sync + 'static {
    /// Read the current document.
    ///
    /// Returns `Ok(None)` if nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the document with `bytes`.
    ///
    /// Must not return `Ok` until the new document is durable.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] or [`StorageError::Rename`] if the
    /// document could not be made durable. The previous document is still
    /// the one returned by [`load`](SnapshotBackend::load).
    async fn store(&self, bytes: &[u8]) -> Result<(), StorageError>;

    /// Human-readable location of the document, for logs.
    fn describe(&self) -> String;
}
