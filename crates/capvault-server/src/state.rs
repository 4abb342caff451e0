//! Shared application state for `capvault` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`. It holds the capability store, the quota guard
//! over that store, the session ledger, and the company directory.

use std::sync::Arc;

use capvault_core::capability::CapabilityStore;
use capvault_core::directory::CompanyDirectory;
use capvault_core::quota::QuotaGuard;
use capvault_core::session::SessionLedger;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Encrypted company records, addressed by capability key.
    pub capabilities: Arc<CapabilityStore>,
    /// Request metering over the same records.
    pub quota: Arc<QuotaGuard>,
    /// Login sessions and their order ceilings.
    pub sessions: Arc<SessionLedger>,
    /// Plain company listing, searchable by column.
    pub directory: Arc<CompanyDirectory>,
}

impl AppState {
    #[must_use]
    pub fn new(
        capabilities: Arc<CapabilityStore>,
        quota: QuotaGuard,
        sessions: SessionLedger,
        directory: CompanyDirectory,
    ) -> Self {
        Self {
            capabilities,
            quota: Arc::new(quota),
            sessions: Arc::new(sessions),
            directory: Arc::new(directory),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
