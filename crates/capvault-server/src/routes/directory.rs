//! Company directory routes: `/v1/directory/*`
//!
//! Plain listing of companies by generated id. Nothing here touches the
//! encrypted capability records.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use capvault_core::directory::{Company, CompanyColumn, CompanyUpdate, NewCompany};

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/directory` router.
///
/// Paths:
/// - `POST   /v1/directory` — add a company
/// - `GET    /v1/directory?column=&keyword=` — substring search
/// - `GET    /v1/directory/{id}` — read a company
/// - `PATCH  /v1/directory/{id}` — change some fields
/// - `DELETE /v1/directory/{id}` — remove a company
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_company).get(search_companies))
        .route(
            "/{id}",
            get(read_company).patch(update_company).delete(delete_company),
        )
}

#[derive(Debug, Serialize)]
pub struct CreateCompanyResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub column: String,
    #[serde(default)]
    pub keyword: String,
}

async fn create_company(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewCompany>,
) -> Result<(StatusCode, Json<CreateCompanyResponse>), AppError> {
    let id = state.directory.create(body).await?;
    Ok((StatusCode::CREATED, Json(CreateCompanyResponse { id })))
}

async fn read_company(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Company>, AppError> {
    Ok(Json(state.directory.find(&id).await?))
}

async fn update_company(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CompanyUpdate>,
) -> Result<Json<Company>, AppError> {
    Ok(Json(state.directory.update(&id, body).await?))
}

async fn delete_company(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.directory.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_companies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Company>>, AppError> {
    let column: CompanyColumn = query.column.parse()?;
    Ok(Json(state.directory.search(column, &query.keyword).await?))
}
