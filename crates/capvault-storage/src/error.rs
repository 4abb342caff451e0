//! Storage error types.
//!
//! Every variant names the location it failed on so the error is
//! diagnosable from a log line alone.

/// Errors that can occur while loading or storing a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to read the snapshot.
    #[error("failed to read snapshot at '{path}': {reason}")]
    Read { path: String, reason: String },

    /// Failed to write or flush the staged snapshot.
    #[error("failed to write snapshot at '{path}': {reason}")]
    Write { path: String, reason: String },

    /// Failed to move the staged snapshot over the live one.
    #[error("failed to replace snapshot '{path}': {reason}")]
    Rename { path: String, reason: String },
}
