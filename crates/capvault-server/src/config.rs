//! Server configuration for `capvault`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `CAPVAULT_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use capvault_core::quota::ConsumeMode;

const DEFAULT_PORT: u16 = 8300;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Snapshot file holding the encrypted company records.
    pub store_path: PathBuf,
    /// SQLite database file for the session ledger.
    pub session_db: PathBuf,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// How a standalone consume treats an exhausted quota.
    pub quota_mode: ConsumeMode,
    /// Variables that were set but could not be parsed, with their values.
    /// Their defaults were used instead.
    pub rejected: Vec<(&'static str, String)>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT` — port to bind on, binds to `0.0.0.0`
    /// - `CAPVAULT_BIND_ADDR` — full bind address (overrides `PORT`, default: `127.0.0.1:8300`)
    /// - `CAPVAULT_STORE_PATH` — record snapshot file (default: `./data/db.json`)
    /// - `CAPVAULT_SESSION_DB` — session database file (default: `./data/sessions.db`)
    /// - `CAPVAULT_LOG_LEVEL` — log filter (default: `info`)
    /// - `CAPVAULT_QUOTA_MODE` — `enforced` or `unguarded` (default: `enforced`)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default_addr = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT));
        let mut rejected = Vec::new();

        // Priority: CAPVAULT_BIND_ADDR > PORT > default
        let bind_addr = if let Some(addr) = lookup("CAPVAULT_BIND_ADDR") {
            addr.parse().unwrap_or_else(|_| {
                rejected.push(("CAPVAULT_BIND_ADDR", addr));
                default_addr
            })
        } else if let Some(port) = lookup("PORT") {
            let port = port.parse().unwrap_or_else(|_| {
                rejected.push(("PORT", port));
                DEFAULT_PORT
            });
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            default_addr
        };

        let store_path = lookup("CAPVAULT_STORE_PATH")
            .map_or_else(|| PathBuf::from("./data/db.json"), PathBuf::from);

        let session_db = lookup("CAPVAULT_SESSION_DB")
            .map_or_else(|| PathBuf::from("./data/sessions.db"), PathBuf::from);

        let log_level = lookup("CAPVAULT_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        let quota_mode = match lookup("CAPVAULT_QUOTA_MODE") {
            Some(mode) => mode.parse().unwrap_or_else(|_| {
                rejected.push(("CAPVAULT_QUOTA_MODE", mode));
                ConsumeMode::default()
            }),
            None => ConsumeMode::default(),
        };

        Self {
            bind_addr,
            store_path,
            session_db,
            log_level,
            quota_mode,
            rejected,
        }
    }
}
