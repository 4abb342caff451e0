//! Capability store for `capvault`.
//!
//! An append-only collection of company profiles, each sealed under its own
//! freshly generated key. The key is returned once, at creation, and is the
//! only handle to the record afterwards: it locates the record and decrypts
//! it. There is no secondary index.
//!
//! # Security model
//!
//! - One AES-256-GCM key per record, never reused across records.
//! - The store persists `HKDF(key)` as the lookup identifier, never the key.
//!   Reading the snapshot file does not let anyone open a record.
//! - Identifiers are compared in constant time during the scan.
//! - A record that fails tag verification, or whose persisted token no
//!   longer decodes, is reported as [`StoreError::Authentication`], never
//!   as missing and never as best-effort plaintext. Other records are
//!   unaffected.
//!
//! # Durability
//!
//! The whole collection is rewritten through the [`SnapshotBackend`] on
//! every mutation. The next collection is built aside and only swapped into
//! memory once the backend has made it durable, so a failed write is
//! invisible to later reads.

use std::sync::Arc;

use capvault_storage::SnapshotBackend;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::crypto::{self, EncryptionKey};
use crate::error::{CryptoError, StoreError};
use crate::locks::KeyLocks;
use crate::profile::CompanyProfile;

/// Current on-disk snapshot layout.
const SNAPSHOT_VERSION: u32 = 1;

/// One sealed record as held in memory.
#[derive(Debug, Clone)]
struct SealedRecord {
    key_id: String,
    blob: Vec<u8>,
    /// Persisted token text that did not decode. The record stays in its
    /// slot with an empty blob, so its key fails authentication, and the
    /// text is written back unchanged.
    unreadable: Option<String>,
}

/// Persisted collection wrapper.
#[derive(Serialize, Deserialize)]
struct SnapshotDocument {
    /// Absent in snapshots written before versioning (treated as 0).
    #[serde(default)]
    version: u32,
    #[serde(default)]
    encrypted_data_list: Vec<SnapshotEntry>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    encrypted_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_id: Option<String>,
    /// Raw key written by version-0 snapshots. Read once, never written.
    #[serde(default, skip_serializing)]
    encryption_key: Option<String>,
}

/// Key-addressed store of encrypted company profiles.
pub struct CapabilityStore {
    backend: Arc<dyn SnapshotBackend>,
    records: RwLock<Vec<SealedRecord>>,
    /// Serializes snapshot writes; held across the backend write.
    commit: Mutex<()>,
    /// Serializes read-modify-write per record.
    locks: KeyLocks,
}

impl CapabilityStore {
    /// Open the store over `backend`, loading any existing snapshot.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Persistence`] if the backend cannot be read.
    /// - [`StoreError::Corrupted`] if a snapshot exists but cannot be parsed.
    ///   An unreadable store is never treated as empty, since the next write
    ///   would then replace every tenant.
    pub async fn open(backend: Arc<dyn SnapshotBackend>) -> Result<Self, StoreError> {
        let records = match backend.load().await? {
            None => Vec::new(),
            Some(bytes) => decode_snapshot(&bytes, &backend.describe())?,
        };

        info!(
            location = %backend.describe(),
            records = records.len(),
            "capability store opened"
        );

        Ok(Self {
            backend,
            records: RwLock::new(records),
            commit: Mutex::new(()),
            locks: KeyLocks::new(),
        })
    }

    /// Number of records in the store.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Seal `profile` under a fresh key, append it, and persist.
    ///
    /// Returns the key. It is the caller's only way back to the record.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Serialization`] if the profile cannot be serialized.
    /// - [`StoreError::Crypto`] if key derivation or encryption fails.
    /// - [`StoreError::Persistence`] if the snapshot write fails; the record
    ///   is then not in the store.
    pub async fn create(&self, profile: &CompanyProfile) -> Result<EncryptionKey, StoreError> {
        let key = EncryptionKey::generate();
        let record = SealedRecord {
            key_id: key.key_id()?,
            blob: seal(&key, profile)?,
            unreadable: None,
        };

        let slot = self
            .commit(move |records| {
                records.push(record);
                records.len() - 1
            })
            .await?;

        info!(slot, tier = %profile.subscription, "capability record created");
        Ok(key)
    }

    /// Find and decrypt the record bound to `key`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if no record is bound to `key`.
    /// - [`StoreError::Authentication`] if the bound record fails AEAD
    ///   verification (corrupted or truncated storage).
    /// - [`StoreError::Serialization`] if the plaintext is not a profile.
    pub async fn resolve(&self, key: &EncryptionKey) -> Result<CompanyProfile, StoreError> {
        let key_id = key.key_id()?;
        let (slot, blob) = self.find(&key_id).await.ok_or(StoreError::NotFound)?;
        open(key, &blob, slot)
    }

    /// Re-seal `profile` under the same key and overwrite its slot in place.
    ///
    /// # Errors
    ///
    /// Same as [`update`](Self::update).
    pub async fn replace(
        &self,
        key: &EncryptionKey,
        profile: &CompanyProfile,
    ) -> Result<(), StoreError> {
        self.update(key, |current| {
            current.clone_from(profile);
            Ok::<(), StoreError>(())
        })
        .await
    }

    /// Locked read-modify-write of the record bound to `key`.
    ///
    /// Holds the record's lock from decryption until the new snapshot is
    /// durable, so concurrent updates to one record never lose each other's
    /// changes. Updates to other records proceed in parallel up to the
    /// snapshot write. If `apply` fails, nothing is written.
    ///
    /// # Errors
    ///
    /// Any error from `apply`, or the errors of [`resolve`](Self::resolve)
    /// and [`create`](Self::create) converted into `E`.
    pub async fn update<T, E, F>(&self, key: &EncryptionKey, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut CompanyProfile) -> Result<T, E>,
        E: From<StoreError>,
    {
        let key_id = key.key_id().map_err(StoreError::from)?;
        let _guard = self.locks.acquire(&key_id).await;

        let (slot, blob) = self.find(&key_id).await.ok_or(StoreError::NotFound)?;
        let mut profile = open(key, &blob, slot)?;

        let output = apply(&mut profile)?;

        let resealed = seal(key, &profile)?;
        self.commit(move |records| {
            if let Some(record) = records.get_mut(slot) {
                record.blob = resealed;
            }
        })
        .await?;

        Ok(output)
    }

    /// Linear scan for the record whose identifier matches `key_id`.
    async fn find(&self, key_id: &str) -> Option<(usize, Vec<u8>)> {
        let records = self.records.read().await;
        let mut found = None;
        for (slot, record) in records.iter().enumerate() {
            if bool::from(record.key_id.as_bytes().ct_eq(key_id.as_bytes())) {
                found = Some((slot, record.blob.clone()));
            }
        }
        found
    }

    /// Apply `change` to a copy of the collection, persist the copy, then
    /// publish it.
    async fn commit<T>(
        &self,
        change: impl FnOnce(&mut Vec<SealedRecord>) -> T,
    ) -> Result<T, StoreError> {
        let _commit = self.commit.lock().await;

        let mut next = self.records.read().await.clone();
        let output = change(&mut next);

        let bytes = encode_snapshot(&next)?;
        if let Err(e) = self.backend.store(&bytes).await {
            warn!(location = %self.backend.describe(), error = %e, "snapshot write failed");
            return Err(e.into());
        }

        *self.records.write().await = next;
        Ok(output)
    }
}

impl std::fmt::Debug for CapabilityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityStore")
            .field("backend", &self.backend.describe())
            .finish_non_exhaustive()
    }
}

fn seal(key: &EncryptionKey, profile: &CompanyProfile) -> Result<Vec<u8>, StoreError> {
    let plaintext = serde_json::to_vec(profile).map_err(|e| StoreError::Serialization {
        reason: e.to_string(),
    })?;
    Ok(crypto::encrypt(key, &plaintext)?)
}

fn open(key: &EncryptionKey, blob: &[u8], slot: usize) -> Result<CompanyProfile, StoreError> {
    let plaintext = crypto::decrypt(key, blob).map_err(|e| match e {
        CryptoError::Decryption { .. } | CryptoError::CiphertextTooShort { .. } => {
            warn!(slot, "capability record failed authentication");
            StoreError::Authentication {
                slot,
                reason: e.to_string(),
            }
        }
        other => StoreError::Crypto(other),
    })?;

    serde_json::from_slice(&plaintext).map_err(|e| StoreError::Serialization {
        reason: format!("record in slot {slot}: {e}"),
    })
}

fn encode_snapshot(records: &[SealedRecord]) -> Result<Vec<u8>, StoreError> {
    let document = SnapshotDocument {
        version: SNAPSHOT_VERSION,
        encrypted_data_list: records
            .iter()
            .map(|record| SnapshotEntry {
                encrypted_token: record
                    .unreadable
                    .clone()
                    .unwrap_or_else(|| crypto::encode_blob(&record.blob)),
                key_id: Some(record.key_id.clone()),
                encryption_key: None,
            })
            .collect(),
    };

    serde_json::to_vec_pretty(&document).map_err(|e| StoreError::Serialization {
        reason: format!("snapshot encoding failed: {e}"),
    })
}

fn decode_snapshot(bytes: &[u8], location: &str) -> Result<Vec<SealedRecord>, StoreError> {
    let corrupted = |reason: String| StoreError::Corrupted {
        location: location.to_owned(),
        reason,
    };

    let document: SnapshotDocument =
        serde_json::from_slice(bytes).map_err(|e| corrupted(e.to_string()))?;

    if document.version > SNAPSHOT_VERSION {
        return Err(corrupted(format!(
            "unsupported snapshot version {}",
            document.version
        )));
    }

    let mut legacy = 0usize;
    let mut records = Vec::with_capacity(document.encrypted_data_list.len());
    for (slot, entry) in document.encrypted_data_list.into_iter().enumerate() {
        let key_id = match (entry.key_id, entry.encryption_key) {
            (Some(key_id), _) => key_id,
            (None, Some(mut raw)) => {
                let key = EncryptionKey::from_encoded(&raw);
                raw.zeroize();
                legacy += 1;
                key.and_then(|key| key.key_id())
                    .map_err(|e| corrupted(format!("slot {slot}: {e}")))?
            }
            (None, None) => return Err(corrupted(format!("slot {slot} has no key identifier"))),
        };

        let record = match crypto::decode_blob(&entry.encrypted_token) {
            Ok(blob) => SealedRecord {
                key_id,
                blob,
                unreadable: None,
            },
            Err(e) => {
                warn!(location, slot, error = %e, "capability record token does not decode");
                SealedRecord {
                    key_id,
                    blob: Vec::new(),
                    unreadable: Some(entry.encrypted_token),
                }
            }
        };
        records.push(record);
    }

    if legacy > 0 {
        warn!(
            location,
            legacy,
            "snapshot stores raw keys; they are dropped from disk on the next write"
        );
    }

    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use capvault_storage::{MemoryBackend, StorageError};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::profile::Tier;

    fn acme() -> CompanyProfile {
        CompanyProfile::new(
            "svc-openai",
            "Acme",
            "LIC-001",
            42,
            vec!["chat".to_owned(), "speech".to_owned()],
            Tier::Free,
        )
    }

    async fn memory_store() -> (MemoryBackend, CapabilityStore) {
        let backend = MemoryBackend::new();
        let store = CapabilityStore::open(Arc::new(backend.clone())).await.unwrap();
        (backend, store)
    }

    /// Memory backend whose writes can be made to fail.
    #[derive(Clone, Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SnapshotBackend for FlakyBackend {
        async fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.load().await
        }

        async fn store(&self, bytes: &[u8]) -> Result<(), StorageError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::Write {
                    path: "flaky".to_owned(),
                    reason: "disk full".to_owned(),
                });
            }
            self.inner.store(bytes).await
        }

        fn describe(&self) -> String {
            "flaky".to_owned()
        }
    }

    #[tokio::test]
    async fn create_then_resolve_roundtrip() {
        let (_, store) = memory_store().await;
        let key = store.create(&acme()).await.unwrap();
        assert_eq!(store.resolve(&key).await.unwrap(), acme());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn each_record_gets_its_own_key() {
        let (_, store) = memory_store().await;
        let k1 = store.create(&acme()).await.unwrap();
        let mut other = acme();
        other.company_name = "Globex".to_owned();
        let k2 = store.create(&other).await.unwrap();

        assert_ne!(k1.as_bytes(), k2.as_bytes());
        assert_eq!(store.resolve(&k2).await.unwrap().company_name, "Globex");
        assert_eq!(store.resolve(&k1).await.unwrap().company_name, "Acme");
    }

    #[tokio::test]
    async fn unknown_key_is_not_found() {
        let (_, store) = memory_store().await;
        store.create(&acme()).await.unwrap();
        let result = store.resolve(&EncryptionKey::generate()).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn snapshot_never_contains_raw_key() {
        let (backend, store) = memory_store().await;
        let key = store.create(&acme()).await.unwrap();

        let bytes = backend.load().await.unwrap().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains(&key.to_encoded()));
        assert!(!text.contains("encryption_key"));
        assert!(!text.contains("Acme"));
        assert!(text.contains(&key.key_id().unwrap()));
    }

    #[tokio::test]
    async fn tampered_blob_fails_authentication() {
        let (backend, store) = memory_store().await;
        let key = store.create(&acme()).await.unwrap();

        let mut doc: serde_json::Value =
            serde_json::from_slice(&backend.load().await.unwrap().unwrap()).unwrap();
        let token = doc["encrypted_data_list"][0]["encrypted_token"]
            .as_str()
            .unwrap()
            .to_owned();
        let mut blob = crypto::decode_blob(&token).unwrap();
        blob[20] ^= 0x80;
        doc["encrypted_data_list"][0]["encrypted_token"] =
            serde_json::Value::String(crypto::encode_blob(&blob));
        backend.store(&serde_json::to_vec(&doc).unwrap()).await.unwrap();

        let reopened = CapabilityStore::open(Arc::new(backend)).await.unwrap();
        let result = reopened.resolve(&key).await;
        assert!(matches!(result, Err(StoreError::Authentication { slot: 0, .. })));
        drop(store);
    }

    /// Rewrite the persisted token of `slot` through `edit`.
    async fn edit_token(backend: &MemoryBackend, slot: usize, edit: impl FnOnce(String) -> String) {
        let mut doc: serde_json::Value =
            serde_json::from_slice(&backend.load().await.unwrap().unwrap()).unwrap();
        let entry = &mut doc["encrypted_data_list"][slot]["encrypted_token"];
        let edited = edit(entry.as_str().unwrap().to_owned());
        *entry = serde_json::Value::String(edited);
        backend.store(&serde_json::to_vec(&doc).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn truncated_blob_fails_authentication() {
        let (backend, store) = memory_store().await;
        let key = store.create(&acme()).await.unwrap();
        drop(store);

        edit_token(&backend, 0, |token| {
            let blob = crypto::decode_blob(&token).unwrap();
            crypto::encode_blob(&blob[..20])
        })
        .await;

        let reopened = CapabilityStore::open(Arc::new(backend)).await.unwrap();
        assert!(matches!(
            reopened.resolve(&key).await,
            Err(StoreError::Authentication { slot: 0, .. })
        ));
    }

    #[tokio::test]
    async fn undecodable_token_poisons_only_its_record() {
        let (backend, store) = memory_store().await;
        let damaged = store.create(&acme()).await.unwrap();
        let healthy = store.create(&acme()).await.unwrap();
        drop(store);

        edit_token(&backend, 0, |mut token| {
            token.replace_range(5..6, "*");
            token
        })
        .await;

        let reopened = CapabilityStore::open(Arc::new(backend.clone())).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        assert!(matches!(
            reopened.resolve(&damaged).await,
            Err(StoreError::Authentication { slot: 0, .. })
        ));
        let update: Result<(), StoreError> = reopened
            .update(&damaged, |p| {
                p.employees = 1;
                Ok(())
            })
            .await;
        assert!(matches!(update, Err(StoreError::Authentication { slot: 0, .. })));

        // The healthy record still reads and writes, and the damaged text
        // is carried through the rewrite untouched.
        let mut changed = acme();
        changed.employees = 7;
        reopened.replace(&healthy, &changed).await.unwrap();
        assert_eq!(reopened.resolve(&healthy).await.unwrap().employees, 7);

        let text = String::from_utf8(backend.load().await.unwrap().unwrap()).unwrap();
        assert!(text.contains('*'));
    }

    #[tokio::test]
    async fn created_keys_and_ids_are_pairwise_distinct() {
        let (_, store) = memory_store().await;
        let mut keys = HashSet::new();
        let mut ids = HashSet::new();
        for _ in 0..500 {
            let key = store.create(&acme()).await.unwrap();
            assert!(ids.insert(key.key_id().unwrap()));
            assert!(keys.insert(key.to_encoded()));
        }
        assert_eq!(store.len().await, 500);
    }

    #[tokio::test]
    async fn replace_keeps_slot_and_key() {
        let (_, store) = memory_store().await;
        let first = store.create(&acme()).await.unwrap();
        let second = store.create(&acme()).await.unwrap();

        let mut changed = acme();
        changed.employees = 99;
        store.replace(&first, &changed).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(store.resolve(&first).await.unwrap().employees, 99);
        assert_eq!(store.resolve(&second).await.unwrap().employees, 42);
        assert_eq!(store.find(&first.key_id().unwrap()).await.unwrap().0, 0);
    }

    #[tokio::test]
    async fn replace_unknown_key_is_not_found() {
        let (_, store) = memory_store().await;
        let result = store.replace(&EncryptionKey::generate(), &acme()).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn replace_reseals_with_fresh_nonce() {
        let (_, store) = memory_store().await;
        let key = store.create(&acme()).await.unwrap();
        let before = store.find(&key.key_id().unwrap()).await.unwrap().1;
        store.replace(&key, &acme()).await.unwrap();
        let after = store.find(&key.key_id().unwrap()).await.unwrap().1;
        assert_ne!(before[..crypto::NONCE_LEN], after[..crypto::NONCE_LEN]);
    }

    #[tokio::test]
    async fn failed_update_closure_changes_nothing() {
        let (backend, store) = memory_store().await;
        let key = store.create(&acme()).await.unwrap();
        let before = backend.load().await.unwrap();

        let result: Result<(), StoreError> = store
            .update(&key, |profile| {
                profile.employees = 0;
                Err(StoreError::NotFound)
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.resolve(&key).await.unwrap().employees, 42);
        assert_eq!(backend.load().await.unwrap(), before);
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let (backend, store) = memory_store().await;
        let key = store.create(&acme()).await.unwrap();
        drop(store);

        let reopened = CapabilityStore::open(Arc::new(backend)).await.unwrap();
        assert_eq!(reopened.resolve(&key).await.unwrap(), acme());
    }

    #[tokio::test]
    async fn failed_create_is_not_visible() {
        let backend = FlakyBackend::default();
        let store = CapabilityStore::open(Arc::new(backend.clone())).await.unwrap();
        let kept = store.create(&acme()).await.unwrap();

        backend.fail.store(true, Ordering::SeqCst);
        let result = store.create(&acme()).await;
        assert!(matches!(result, Err(StoreError::Persistence(_))));
        assert_eq!(store.len().await, 1);

        backend.fail.store(false, Ordering::SeqCst);
        let reopened = CapabilityStore::open(Arc::new(backend)).await.unwrap();
        assert_eq!(reopened.len().await, 1);
        assert_eq!(reopened.resolve(&kept).await.unwrap(), acme());
    }

    #[tokio::test]
    async fn failed_replace_is_not_visible() {
        let backend = FlakyBackend::default();
        let store = CapabilityStore::open(Arc::new(backend.clone())).await.unwrap();
        let key = store.create(&acme()).await.unwrap();

        backend.fail.store(true, Ordering::SeqCst);
        let mut changed = acme();
        changed.current_requests = 7;
        let result = store.replace(&key, &changed).await;
        assert!(matches!(result, Err(StoreError::Persistence(_))));

        assert_eq!(store.resolve(&key).await.unwrap().current_requests, 0);
    }

    #[tokio::test]
    async fn garbage_snapshot_is_corrupted_not_empty() {
        let backend = MemoryBackend::new();
        backend.store(b"{ not json").await.unwrap();
        let result = CapabilityStore::open(Arc::new(backend)).await;
        assert!(matches!(result, Err(StoreError::Corrupted { .. })));
    }

    #[tokio::test]
    async fn future_snapshot_version_is_rejected() {
        let backend = MemoryBackend::new();
        backend
            .store(br#"{"version": 9, "encrypted_data_list": []}"#)
            .await
            .unwrap();
        let result = CapabilityStore::open(Arc::new(backend)).await;
        assert!(matches!(result, Err(StoreError::Corrupted { .. })));
    }

    #[tokio::test]
    async fn legacy_snapshot_with_raw_keys_is_imported() {
        let key = EncryptionKey::generate();
        let legacy_profile = br#"{"key_service":"svc","company_name":"Old Co","license":"L-1","employees":3,"services":["chat"]}"#;
        let blob = crypto::encrypt(&key, legacy_profile).unwrap();
        let legacy = serde_json::json!({
            "encrypted_data_list": [{
                "encrypted_token": crypto::encode_blob(&blob),
                "encryption_key": key.to_encoded(),
            }]
        });
        let backend = MemoryBackend::new();
        backend.store(&serde_json::to_vec(&legacy).unwrap()).await.unwrap();

        let store = CapabilityStore::open(Arc::new(backend.clone())).await.unwrap();
        let profile = store.resolve(&key).await.unwrap();
        assert_eq!(profile.company_name, "Old Co");
        assert_eq!(profile.max_requests, 10);
        assert_eq!(profile.current_requests, 0);

        // The next write drops the raw key from disk.
        store.replace(&key, &profile).await.unwrap();
        let text = String::from_utf8(backend.load().await.unwrap().unwrap()).unwrap();
        assert!(!text.contains(&key.to_encoded()));
        assert!(text.contains("\"version\": 1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_on_one_record_lose_nothing() {
        let (_, store) = memory_store().await;
        let store = Arc::new(store);
        let key = store.create(&acme()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(&key, |p| {
                        p.employees += 1;
                        Ok::<(), StoreError>(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.resolve(&key).await.unwrap().employees, 42 + 25);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_all_persist() {
        let (backend, store) = memory_store().await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..20u64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut profile = acme();
                profile.employees = i;
                (i, store.create(&profile).await.unwrap())
            }));
        }
        let mut keys = Vec::new();
        for handle in handles {
            keys.push(handle.await.unwrap());
        }

        let reopened = CapabilityStore::open(Arc::new(backend)).await.unwrap();
        assert_eq!(reopened.len().await, 20);
        for (i, key) in &keys {
            assert_eq!(reopened.resolve(key).await.unwrap().employees, *i);
        }
    }
}
