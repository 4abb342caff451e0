//! Quota guard for capability-gated operations.
//!
//! Every company record carries `max_requests` and `current_requests`
//! inside its ciphertext. The guard reads them to admit or reject a
//! request and bumps the counter through the store's per-record locked
//! update, so two callers holding the same key can never both spend the
//! last unit.
//!
//! [`QuotaGuard::admit`] fuses the check and the increment into one locked
//! step and is what request handlers should use. [`QuotaGuard::check`] and
//! [`QuotaGuard::consume`] remain available as separate steps for callers
//! that only report usage.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capability::CapabilityStore;
use crate::crypto::EncryptionKey;
use crate::error::QuotaError;
use crate::profile::{CompanyProfile, Tier};

/// How [`QuotaGuard::consume`] treats a record that is already at its
/// ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumeMode {
    /// Reject with [`QuotaError::Exceeded`]; the counter never passes
    /// `max_requests`.
    #[default]
    Enforced,
    /// Always increment. Overage stays visible as
    /// `current_requests > max_requests`.
    Unguarded,
}

impl std::str::FromStr for ConsumeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "enforced" => Ok(Self::Enforced),
            "unguarded" => Ok(Self::Unguarded),
            other => Err(format!("unknown consume mode: {other}")),
        }
    }
}

/// Quota state of one record at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    /// Whether one more request would be admitted.
    pub allowed: bool,
    pub tier: Tier,
    pub max_requests: u64,
    pub current_requests: u64,
    pub remaining: u64,
}

impl QuotaStatus {
    fn of(profile: &CompanyProfile) -> Self {
        Self {
            allowed: profile.current_requests < profile.max_requests,
            tier: profile.subscription,
            max_requests: profile.max_requests,
            current_requests: profile.current_requests,
            remaining: profile.remaining_requests(),
        }
    }
}

/// Admits or rejects requests against the quota sealed in each record.
pub struct QuotaGuard {
    store: Arc<CapabilityStore>,
    mode: ConsumeMode,
}

impl QuotaGuard {
    #[must_use]
    pub fn new(store: Arc<CapabilityStore>, mode: ConsumeMode) -> Self {
        Self { store, mode }
    }

    #[must_use]
    pub fn mode(&self) -> ConsumeMode {
        self.mode
    }

    /// Read the quota of the record bound to `key`. Does not mutate.
    ///
    /// The result may already be stale if another caller is consuming on
    /// the same key.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::Store`] if the key cannot be resolved.
    pub async fn check(&self, key: &EncryptionKey) -> Result<QuotaStatus, QuotaError> {
        let profile = self.store.resolve(key).await?;
        Ok(QuotaStatus::of(&profile))
    }

    /// Spend one request.
    ///
    /// Under [`ConsumeMode::Enforced`] a record at its ceiling is rejected
    /// and left unchanged. Under [`ConsumeMode::Unguarded`] the counter is
    /// incremented regardless.
    ///
    /// # Errors
    ///
    /// - [`QuotaError::Exceeded`] when enforced and no requests remain.
    /// - [`QuotaError::Store`] if the record cannot be resolved or persisted.
    pub async fn consume(&self, key: &EncryptionKey) -> Result<QuotaStatus, QuotaError> {
        let enforce = self.mode == ConsumeMode::Enforced;
        self.increment(key, enforce).await
    }

    /// Check and spend one request as a single locked step.
    ///
    /// Always enforces the ceiling, whatever the configured mode.
    ///
    /// # Errors
    ///
    /// - [`QuotaError::Exceeded`] if no requests remain.
    /// - [`QuotaError::Store`] if the record cannot be resolved or persisted.
    pub async fn admit(&self, key: &EncryptionKey) -> Result<QuotaStatus, QuotaError> {
        self.increment(key, true).await
    }

    /// Give back one request, never going below zero.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::Store`] if the record cannot be resolved or
    /// persisted.
    pub async fn release(&self, key: &EncryptionKey) -> Result<QuotaStatus, QuotaError> {
        self.store
            .update(key, |profile| {
                profile.current_requests = profile.current_requests.saturating_sub(1);
                Ok(QuotaStatus::of(profile))
            })
            .await
    }

    /// Run `operation` under the quota of `key`.
    ///
    /// A unit is admitted before the operation starts and refunded if it
    /// fails. No lock is held while the operation runs.
    ///
    /// # Errors
    ///
    /// Returns the admission error converted into `E`, or the operation's
    /// own error.
    pub async fn run<T, E, F, Fut>(&self, key: &EncryptionKey, operation: F) -> Result<T, E>
    where
        F: FnOnce(QuotaStatus) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<QuotaError>,
    {
        let admitted = self.admit(key).await?;

        match operation(admitted).await {
            Ok(value) => Ok(value),
            Err(err) => {
                if let Err(refund) = self.release(key).await {
                    warn!(error = %refund, "failed to refund quota after operation error");
                }
                Err(err)
            }
        }
    }

    async fn increment(
        &self,
        key: &EncryptionKey,
        enforce: bool,
    ) -> Result<QuotaStatus, QuotaError> {
        self.store
            .update(key, |profile| {
                if enforce && profile.current_requests >= profile.max_requests {
                    debug!(
                        current = profile.current_requests,
                        max = profile.max_requests,
                        "quota exhausted"
                    );
                    return Err(QuotaError::Exceeded {
                        max: profile.max_requests,
                        current: profile.current_requests,
                    });
                }
                profile.current_requests = profile.current_requests.saturating_add(1);
                debug!(
                    current = profile.current_requests,
                    max = profile.max_requests,
                    "quota consumed"
                );
                Ok(QuotaStatus::of(profile))
            })
            .await
    }
}

impl std::fmt::Debug for QuotaGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaGuard")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use capvault_storage::MemoryBackend;

    use super::*;
    use crate::error::StoreError;

    async fn guard_with(max: u64, mode: ConsumeMode) -> (QuotaGuard, EncryptionKey) {
        let store = Arc::new(
            CapabilityStore::open(Arc::new(MemoryBackend::new()))
                .await
                .unwrap(),
        );
        let mut profile = CompanyProfile::new("svc", "Acme", "L", 5, Vec::new(), Tier::Free);
        profile.max_requests = max;
        let key = store.create(&profile).await.unwrap();
        (QuotaGuard::new(store, mode), key)
    }

    #[tokio::test]
    async fn fresh_record_is_allowed() {
        let (guard, key) = guard_with(3, ConsumeMode::Enforced).await;
        let status = guard.check(&key).await.unwrap();
        assert!(status.allowed);
        assert_eq!(status.tier, Tier::Free);
        assert_eq!(status.remaining, 3);
    }

    #[tokio::test]
    async fn check_does_not_mutate() {
        let (guard, key) = guard_with(3, ConsumeMode::Enforced).await;
        guard.check(&key).await.unwrap();
        guard.check(&key).await.unwrap();
        assert_eq!(guard.check(&key).await.unwrap().current_requests, 0);
    }

    #[tokio::test]
    async fn three_consumes_exhaust_a_quota_of_three() {
        let (guard, key) = guard_with(3, ConsumeMode::Enforced).await;
        for expected in 1..=3 {
            let status = guard.consume(&key).await.unwrap();
            assert_eq!(status.current_requests, expected);
        }
        let status = guard.check(&key).await.unwrap();
        assert!(!status.allowed);
        assert_eq!(status.current_requests, 3);
        assert_eq!(status.remaining, 0);
    }

    #[tokio::test]
    async fn enforced_consume_past_max_is_rejected() {
        let (guard, key) = guard_with(3, ConsumeMode::Enforced).await;
        for _ in 0..3 {
            guard.consume(&key).await.unwrap();
        }
        let result = guard.consume(&key).await;
        assert!(matches!(
            result,
            Err(QuotaError::Exceeded { max: 3, current: 3 })
        ));
        assert_eq!(guard.check(&key).await.unwrap().current_requests, 3);
    }

    #[tokio::test]
    async fn unguarded_consume_past_max_shows_overage() {
        let (guard, key) = guard_with(3, ConsumeMode::Unguarded).await;
        for _ in 0..4 {
            guard.consume(&key).await.unwrap();
        }
        let status = guard.check(&key).await.unwrap();
        assert!(!status.allowed);
        assert_eq!(status.current_requests, 4);
        assert_eq!(status.max_requests, 3);
        assert_eq!(status.remaining, 0);
    }

    #[tokio::test]
    async fn admit_enforces_even_when_unguarded() {
        let (guard, key) = guard_with(1, ConsumeMode::Unguarded).await;
        guard.admit(&key).await.unwrap();
        assert!(matches!(
            guard.admit(&key).await,
            Err(QuotaError::Exceeded { .. })
        ));
    }

    #[tokio::test]
    async fn release_refunds_and_saturates() {
        let (guard, key) = guard_with(2, ConsumeMode::Enforced).await;
        guard.admit(&key).await.unwrap();
        assert_eq!(guard.release(&key).await.unwrap().current_requests, 0);
        assert_eq!(guard.release(&key).await.unwrap().current_requests, 0);
    }

    #[tokio::test]
    async fn unknown_key_reports_not_found() {
        let (guard, _) = guard_with(2, ConsumeMode::Enforced).await;
        let result = guard.check(&EncryptionKey::generate()).await;
        assert!(matches!(result, Err(QuotaError::Store(StoreError::NotFound))));
    }

    #[tokio::test]
    async fn run_charges_successful_operations() {
        let (guard, key) = guard_with(2, ConsumeMode::Enforced).await;
        let out: Result<&str, QuotaError> = guard.run(&key, |_| async { Ok("spoken") }).await;
        assert_eq!(out.unwrap(), "spoken");
        assert_eq!(guard.check(&key).await.unwrap().current_requests, 1);
    }

    #[tokio::test]
    async fn run_refunds_failed_operations() {
        let (guard, key) = guard_with(2, ConsumeMode::Enforced).await;
        let out: Result<(), QuotaError> = guard
            .run(&key, |_| async {
                Err(QuotaError::Store(StoreError::Serialization {
                    reason: "upstream failed".to_owned(),
                }))
            })
            .await;
        assert!(out.is_err());
        assert_eq!(guard.check(&key).await.unwrap().current_requests, 0);
    }

    #[tokio::test]
    async fn run_rejects_without_invoking_operation() {
        let (guard, key) = guard_with(0, ConsumeMode::Enforced).await;
        let mut invoked = false;
        let out: Result<(), QuotaError> = guard
            .run(&key, |_| {
                invoked = true;
                async { Ok(()) }
            })
            .await;
        assert!(matches!(out, Err(QuotaError::Exceeded { .. })));
        assert!(!invoked);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_admits_never_overshoot() {
        let (guard, key) = guard_with(10, ConsumeMode::Enforced).await;
        let guard = Arc::new(guard);

        let mut handles = Vec::new();
        for _ in 0..30 {
            let guard = Arc::clone(&guard);
            let key = key.clone();
            handles.push(tokio::spawn(async move { guard.admit(&key).await.is_ok() }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 10);
        assert_eq!(guard.check(&key).await.unwrap().current_requests, 10);
    }

    #[test]
    fn consume_mode_parses() {
        assert_eq!("Enforced".parse::<ConsumeMode>().unwrap(), ConsumeMode::Enforced);
        assert_eq!("unguarded".parse::<ConsumeMode>().unwrap(), ConsumeMode::Unguarded);
        assert!("lenient".parse::<ConsumeMode>().is_err());
    }
}
