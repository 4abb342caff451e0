//! Error types for `capvault-core`.
//!
//! Each error variant carries enough context to diagnose the problem without
//! a debugger. Crypto errors never include key material, only lengths,
//! slot indices, or operation descriptions.

use capvault_storage::StorageError;

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// AES-256-GCM decryption failed (wrong key, corrupted ciphertext, or tampered tag).
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// Ciphertext is too short to contain a valid nonce + tag.
    #[error("ciphertext too short: expected at least {expected} bytes, got {actual}")]
    CiphertextTooShort { expected: usize, actual: usize },

    /// HKDF key derivation failed.
    #[error("key derivation failed for context '{context}': {reason}")]
    KeyDerivation { context: String, reason: String },

    /// A presented key string is not a valid encoded 256-bit key.
    #[error("invalid encryption key: {reason}")]
    InvalidKey { reason: String },

    /// A stored blob is not valid URL-safe base64.
    #[error("invalid blob encoding: {reason}")]
    InvalidEncoding { reason: String },
}

/// Errors from the capability store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record is bound to the presented key.
    #[error("no record matches the presented key")]
    NotFound,

    /// The record bound to the key failed AEAD verification.
    #[error("record in slot {slot} failed authentication: {reason}")]
    Authentication { slot: usize, reason: String },

    /// A profile could not be serialized or the decrypted plaintext is not a
    /// valid profile document.
    #[error("profile serialization failed: {reason}")]
    Serialization { reason: String },

    /// The persisted snapshot exists but cannot be interpreted.
    #[error("snapshot at '{location}' is corrupted: {reason}")]
    Corrupted { location: String, reason: String },

    /// The snapshot could not be made durable. Nothing was applied.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StorageError),

    /// Key handling or encryption failed before anything was stored.
    #[error("store crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Errors from quota enforcement.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// The record has no requests left.
    #[error("quota exceeded: {current} of {max} requests used")]
    Exceeded { max: u64, current: u64 },

    /// The capability store returned an error.
    #[error("quota store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the session ledger.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session has the given id or token.
    #[error("session not found: {lookup}")]
    NotFound { lookup: String },

    /// A uniqueness constraint was violated (duplicate token).
    #[error("session conflict: {reason}")]
    Conflict { reason: String },

    /// A session was created with more used orders than its ceiling.
    #[error("used orders {used} exceed total orders {total}")]
    CeilingViolation { used: u32, total: u32 },

    /// Unknown column name for a session search.
    #[error("unknown session column '{name}'")]
    UnknownColumn { name: String },

    /// The database failed.
    #[error("session database error: {reason}")]
    Database { reason: String },
}

impl From<sqlx::Error> for SessionError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Self::Conflict {
                reason: db_err.message().to_owned(),
            },
            _ => Self::Database {
                reason: err.to_string(),
            },
        }
    }
}

/// Errors from the company directory.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// No company has the given id.
    #[error("company not found: {id}")]
    NotFound { id: String },

    /// A uniqueness constraint was violated (duplicate license number).
    #[error("company conflict: {reason}")]
    Conflict { reason: String },

    /// A required field is empty.
    #[error("invalid company: {reason}")]
    Invalid { reason: String },

    /// Unknown column name for a company search.
    #[error("unknown company column '{name}'")]
    UnknownColumn { name: String },

    /// The database failed.
    #[error("company database error: {reason}")]
    Database { reason: String },
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Self::Conflict {
                reason: db_err.message().to_owned(),
            },
            _ => Self::Database {
                reason: err.to_string(),
            },
        }
    }
}
