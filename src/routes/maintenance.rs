use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde_json::Value;

use super::{created, ok};
use crate::{
    auth::{require_identity, require_role, Role},
    error::AppResult,
    schemas::{
        validate_input, AssignTicketInput, CloseTicketInput, CreateTicketInput, IdPath,
        ListTicketsQuery, TicketStatusInput,
    },
    services::maintenance,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/maintenance/tickets",
            get(list_tickets).post(create_ticket),
        )
        .route("/maintenance/tickets/{id}", get(get_ticket))
        .route("/maintenance/tickets/{id}/assign", put(assign_ticket))
        .route("/maintenance/tickets/{id}/status", put(update_ticket_status))
        .route("/maintenance/tickets/{id}/close", put(close_ticket))
}

async fn create_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTicketInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let identity = require_role(&state, &headers, &[Role::Tenant]).await?;
    validate_input(&payload)?;
    created(maintenance::create(&state, identity.id, payload, Utc::now()).await?)
}

async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<ListTicketsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&state, &headers).await?;
    ok(maintenance::list(&state, identity, query).await?)
}

async fn get_ticket(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&state, &headers).await?;
    ok(maintenance::get(&state, identity.id, path.id).await?)
}

async fn assign_ticket(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<AssignTicketInput>,
) -> AppResult<Json<Value>> {
    let identity = require_role(&state, &headers, &[Role::Landlord]).await?;
    ok(maintenance::assign(&state, identity.id, path.id, payload.staff_id, Utc::now()).await?)
}

async fn update_ticket_status(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<TicketStatusInput>,
) -> AppResult<Json<Value>> {
    let identity = require_role(&state, &headers, &[Role::Maintenance]).await?;
    validate_input(&payload)?;
    ok(maintenance::update_status(
        &state,
        identity.id,
        path.id,
        payload.status,
        payload.note,
        Utc::now(),
    )
    .await?)
}

async fn close_ticket(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    payload: Option<Json<CloseTicketInput>>,
) -> AppResult<Json<Value>> {
    let identity = require_role(&state, &headers, &[Role::Landlord]).await?;
    let payload = payload.map(|Json(input)| input).unwrap_or_default();
    validate_input(&payload)?;
    ok(maintenance::close(&state, identity.id, path.id, payload.note, Utc::now()).await?)
}
