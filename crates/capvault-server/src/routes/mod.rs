//! HTTP route handlers for `capvault`.
//!
//! Routes are organized by subsystem:
//! - `health`: Liveness
//! - `companies`: Issue capability keys and look up company profiles
//! - `quota`: Quota status and consumption, keyed by `X-Capability-Key`
//! - `sessions`: Session ledger create, read, delete, order accounting, search
//! - `directory`: Company directory create, read, update, delete, search

pub mod companies;
pub mod directory;
pub mod health;
pub mod quota;
pub mod sessions;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::middleware as axum_mw;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::capability_middleware;
use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Quota routes require a parsed capability key.
    let keyed_routes = Router::new()
        .nest("/v1/quota", quota::router())
        .route_layer(axum_mw::from_fn(capability_middleware));

    Router::new()
        .nest("/v1/health", health::router())
        .nest("/v1/companies", companies::router())
        .nest("/v1/sessions", sessions::router())
        .nest("/v1/directory", directory::router())
        .merge(keyed_routes)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}
