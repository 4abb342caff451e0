//! Capability-key middleware for `capvault`.
//!
//! Extracts the `X-Capability-Key` header, parses it into an
//! [`EncryptionKey`], and injects it into the request extensions for
//! downstream handlers. Whether the key opens a record is decided by the
//! handler, not here.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use capvault_core::crypto::EncryptionKey;

/// Header carrying the capability key.
pub const CAPABILITY_HEADER: &str = "X-Capability-Key";

/// Middleware that requires a well-formed `X-Capability-Key` header.
pub async fn capability_middleware(mut req: Request, next: Next) -> Response {
    // A present header that is not visible ASCII is malformed, not missing.
    let key = req.headers().get(CAPABILITY_HEADER).map(|v| {
        v.to_str()
            .ok()
            .and_then(|s| EncryptionKey::from_encoded(s).ok())
    });

    match key {
        None => unauthorized("missing X-Capability-Key header"),
        Some(None) => unauthorized("invalid capability key"),
        Some(Some(key)) => {
            req.extensions_mut().insert(key);
            next.run(req).await
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({"error": "unauthorized", "message": message})),
    )
        .into_response()
}
