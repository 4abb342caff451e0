//! Company routes: `/v1/companies/*`
//!
//! Issuing a company seals its profile under a new key and hands that key
//! back exactly once. Presenting the key later is the only way to read the
//! profile.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use capvault_core::crypto::EncryptionKey;
use capvault_core::profile::{CompanyProfile, Tier};

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/companies` router.
///
/// Paths:
/// - `POST /v1/companies` — register a company, returns its capability key
/// - `POST /v1/companies/lookup` — resolve a capability key to its profile
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_company))
        .route("/lookup", post(lookup_company))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateCompanyRequest {
    pub key_service: String,
    pub company_name: String,
    pub license: String,
    pub employees: u64,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub subscription: Tier,
    /// Overrides the tier's default allowance.
    pub max_requests: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CreateCompanyResponse {
    /// Shown once. Losing it loses access to the record.
    pub encryption_key: String,
}

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub encryption_key: String,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn create_company(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCompanyRequest>,
) -> Result<(StatusCode, Json<CreateCompanyResponse>), AppError> {
    if body.company_name.trim().is_empty() {
        return Err(AppError::BadRequest("company_name must not be empty".to_owned()));
    }

    let mut profile = CompanyProfile::new(
        body.key_service,
        body.company_name,
        body.license,
        body.employees,
        body.services,
        body.subscription,
    );
    if let Some(max) = body.max_requests {
        profile.max_requests = max;
    }

    let key = state.capabilities.create(&profile).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateCompanyResponse {
            encryption_key: key.to_encoded(),
        }),
    ))
}

async fn lookup_company(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LookupRequest>,
) -> Result<Json<CompanyProfile>, AppError> {
    let key = EncryptionKey::from_encoded(&body.encryption_key)?;
    let profile = state.capabilities.resolve(&key).await?;
    Ok(Json(profile))
}
