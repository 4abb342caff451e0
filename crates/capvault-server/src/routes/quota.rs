//! Quota routes: `/v1/quota/*`
//!
//! Both routes sit behind the capability middleware, which supplies the
//! parsed [`EncryptionKey`] as a request extension.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};

use capvault_core::crypto::EncryptionKey;
use capvault_core::quota::QuotaStatus;

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/quota` router.
///
/// Paths:
/// - `GET  /v1/quota` — current quota status
/// - `POST /v1/quota/consume` — spend one request, 429 when exhausted
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(status))
        .route("/consume", post(consume))
}

async fn status(
    State(state): State<Arc<AppState>>,
    Extension(key): Extension<EncryptionKey>,
) -> Result<Json<QuotaStatus>, AppError> {
    Ok(Json(state.quota.check(&key).await?))
}

async fn consume(
    State(state): State<Arc<AppState>>,
    Extension(key): Extension<EncryptionKey>,
) -> Result<Json<QuotaStatus>, AppError> {
    Ok(Json(state.quota.admit(&key).await?))
}
