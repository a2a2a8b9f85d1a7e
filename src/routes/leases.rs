use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde_json::Value;

use super::{created, ok};
use crate::{
    auth::{require_identity, require_role, Role},
    error::AppResult,
    schemas::{validate_input, CreateLeaseInput, IdPath, ListLeasesQuery, RespondLeaseInput},
    services::{leases, views},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/leases", post(create_lease).get(list_leases))
        .route("/leases/{id}", get(get_lease))
        .route("/leases/{id}/respond", put(respond_to_lease))
        .route("/leases/{id}/terminate", put(terminate_lease))
}

async fn create_lease(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateLeaseInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let identity = require_role(&state, &headers, &[Role::Landlord]).await?;
    validate_input(&payload)?;
    created(leases::create(&state, identity.id, payload, Utc::now()).await?)
}

async fn list_leases(
    State(state): State<AppState>,
    Query(query): Query<ListLeasesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&state, &headers).await?;
    ok(leases::list(&state, identity, query).await?)
}

async fn get_lease(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&state, &headers).await?;
    ok(views::lease_detail(&state, identity.id, path.id).await?)
}

async fn respond_to_lease(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<RespondLeaseInput>,
) -> AppResult<Json<Value>> {
    let identity = require_role(&state, &headers, &[Role::Tenant]).await?;
    ok(leases::respond(&state, identity.id, path.id, payload.decision, Utc::now()).await?)
}

async fn terminate_lease(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_role(&state, &headers, &[Role::Landlord]).await?;
    ok(leases::terminate(&state, identity.id, path.id, Utc::now()).await?)
}
