//! `capvault` HTTP server.
//!
//! Wires together the capability store, quota guard, and session ledger
//! into a running Axum server serving the JSON API at `/v1/*`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
