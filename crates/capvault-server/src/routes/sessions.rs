//! Session routes: `/v1/sessions/*`
//!
//! Thin wrappers over the session ledger. Order accounting answers with
//! `{ "accepted": false }` rather than an error when the ceiling rejects a
//! change, so clients can tell a full session from a missing one.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use capvault_core::session::{DEFAULT_STATUS, NewSession, Session, SessionColumn};

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/sessions` router.
///
/// Paths:
/// - `POST /v1/sessions` — create a session
/// - `GET  /v1/sessions?column=&keyword=` — substring search
/// - `GET  /v1/sessions/{id}` — read a session
/// - `DELETE /v1/sessions/{id}` — remove a session
/// - `POST /v1/sessions/{id}/increment` — spend one order
/// - `PUT  /v1/sessions/{id}/used` — set the used order count
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_session).get(search_sessions))
        .route("/{id}", get(read_session).delete(delete_session))
        .route("/{id}/increment", post(increment_used))
        .route("/{id}/used", put(set_used))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub company_id: String,
    pub token: String,
    pub status: Option<String>,
    #[serde(default)]
    pub total_orders: u32,
    #[serde(default)]
    pub used_orders: u32,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SetUsedRequest {
    pub used_orders: u32,
}

#[derive(Debug, Serialize)]
pub struct OrderUpdateResponse {
    /// `false` when the ceiling rejected the change and nothing was written.
    pub accepted: bool,
    pub session: Session,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub column: String,
    #[serde(default)]
    pub keyword: String,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    if body.token.is_empty() {
        return Err(AppError::BadRequest("token must not be empty".to_owned()));
    }

    let new = NewSession::new(body.company_id, body.token)
        .with_orders(body.total_orders, body.used_orders)
        .with_status(body.status.unwrap_or_else(|| DEFAULT_STATUS.to_owned()));

    let session_id = state.sessions.create(new).await?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id })))
}

async fn read_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(state.sessions.find_by_session_id(&id).await?))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.sessions.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn increment_used(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderUpdateResponse>, AppError> {
    let accepted = state.sessions.increment_used(&id).await?;
    let session = state.sessions.find_by_session_id(&id).await?;
    Ok(Json(OrderUpdateResponse { accepted, session }))
}

async fn set_used(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SetUsedRequest>,
) -> Result<Json<OrderUpdateResponse>, AppError> {
    let accepted = state.sessions.set_used(&id, body.used_orders).await?;
    let session = state.sessions.find_by_session_id(&id).await?;
    Ok(Json(OrderUpdateResponse { accepted, session }))
}

async fn search_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Session>>, AppError> {
    let column: SessionColumn = query.column.parse()?;
    Ok(Json(state.sessions.search(column, &query.keyword).await?))
}
