//! Core library for `capvault`.
//!
//! Contains the authenticated cipher, the capability store (one encrypted
//! company profile per key, where holding the key is the authorization),
//! the quota guard that meters requests against counters sealed inside each
//! profile, and the SQLite-backed session ledger and company directory. This crate depends on
//! `capvault-storage` for the snapshot backend trait and knows nothing about
//! HTTP.

pub mod capability;
pub mod crypto;
pub mod directory;
pub mod error;
pub mod locks;
pub mod profile;
pub mod quota;
pub mod session;
