//! Cryptographic primitives for `capvault`.
//!
//! Provides AES-256-GCM authenticated encryption, the zeroize-on-drop
//! [`EncryptionKey`], its URL-safe base64 external form, and the
//! HKDF-derived key identifier used to index records without persisting
//! the key itself.
//!
//! # Security model
//!
//! - Every encryption generates a fresh 96-bit nonce via `OsRng`.
//! - Ciphertext format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! - No associated data is bound into the tag.
//! - A key identifier is one-way: holding it does not let anyone decrypt.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// Nonce length for AES-256-GCM (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length appended by AES-GCM.
const TAG_LEN: usize = 16;

/// Minimum ciphertext length: 12-byte nonce + 16-byte AES-GCM tag.
const MIN_CIPHERTEXT_LEN: usize = NONCE_LEN + TAG_LEN;

/// Raw key length in bytes.
const KEY_LEN: usize = 32;

/// HKDF `info` label for record key identifiers.
const KEY_ID_INFO: &[u8] = b"capvault-capability-id-v1";

/// URL-safe alphabet, padded on encode, padding optional on decode.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A 256-bit encryption key that is zeroized on drop.
///
/// One key is generated per record and handed to the caller as the
/// record's capability. The inner bytes are never exposed in `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a new random key using the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    ///
    /// The caller must not log or persist these bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Encode the key as URL-safe base64, the form handed to clients.
    #[must_use]
    pub fn to_encoded(&self) -> String {
        URL_SAFE_LENIENT.encode(self.0)
    }

    /// Parse a key presented by a client.
    ///
    /// Accepts URL-safe base64 with or without padding.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the string is not base64 or
    /// does not decode to exactly 32 bytes.
    pub fn from_encoded(encoded: &str) -> Result<Self, CryptoError> {
        let decoded = Zeroizing::new(URL_SAFE_LENIENT.decode(encoded.trim()).map_err(|e| {
            CryptoError::InvalidKey {
                reason: e.to_string(),
            }
        })?);

        let bytes: [u8; KEY_LEN] =
            decoded
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKey {
                    reason: format!("expected {KEY_LEN} bytes, got {}", decoded.len()),
                })?;
        Ok(Self(bytes))
    }

    /// Derive the hex-encoded identifier under which this key's record is
    /// indexed.
    ///
    /// Deterministic for a given key and distinct across keys. The key
    /// cannot be recovered from it.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivation`] if HKDF expansion fails.
    pub fn key_id(&self) -> Result<String, CryptoError> {
        let hk = Hkdf::<Sha256>::new(None, &self.0);
        let mut id = [0u8; 32];
        hk.expand(KEY_ID_INFO, &mut id)
            .map_err(|e| CryptoError::KeyDerivation {
                context: String::from_utf8_lossy(KEY_ID_INFO).into_owned(),
                reason: e.to_string(),
            })?;
        Ok(hex::encode(id))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt plaintext using AES-256-GCM with a fresh random nonce.
///
/// Returns `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    let mut blob = Vec::with_capacity(NONCE_LEN.saturating_add(ciphertext.len()));
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a blob produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::CiphertextTooShort`] if the input cannot hold a
/// nonce and a tag, and [`CryptoError::Decryption`] if the tag does not
/// verify. No plaintext is returned in either case.
pub fn decrypt(key: &EncryptionKey, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < MIN_CIPHERTEXT_LEN {
        return Err(CryptoError::CiphertextTooShort {
            expected: MIN_CIPHERTEXT_LEN,
            actual: blob.len(),
        });
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| CryptoError::Decryption {
            reason: e.to_string(),
        })
}

/// Encode a sealed blob for the on-disk snapshot.
#[must_use]
pub fn encode_blob(blob: &[u8]) -> String {
    URL_SAFE_LENIENT.encode(blob)
}

/// Decode a sealed blob read from the on-disk snapshot.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidEncoding`] if the text is not URL-safe
/// base64.
pub fn decode_blob(encoded: &str) -> Result<Vec<u8>, CryptoError> {
    URL_SAFE_LENIENT
        .decode(encoded)
        .map_err(|e| CryptoError::InvalidEncoding {
            reason: e.to_string(),
        })
}
