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
    schemas::{validate_input, CreateInvoiceInput, GenerateInvoiceInput, IdPath, ListInvoicesQuery},
    services::{invoices, views},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invoices", post(create_invoice))
        .route("/invoices/generate", post(generate_invoice))
        .route("/invoices/{id}", get(get_invoice))
        .route("/invoices/{id}/status", put(refresh_invoice_status))
        .route("/invoices/{id}/void", put(void_invoice))
        .route("/leases/{id}/invoices", get(list_lease_invoices))
}

async fn create_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateInvoiceInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let identity = require_role(&state, &headers, &[Role::Landlord]).await?;
    validate_input(&payload)?;
    created(invoices::create(&state, identity.id, payload, Utc::now()).await?)
}

async fn generate_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GenerateInvoiceInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let identity = require_role(&state, &headers, &[Role::Landlord]).await?;
    created(invoices::generate_next_month(&state, identity.id, payload.lease_id, Utc::now()).await?)
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&state, &headers).await?;
    ok(views::invoice_detail(&state, identity.id, path.id).await?)
}

async fn refresh_invoice_status(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&state, &headers).await?;
    ok(invoices::refresh_for_party(&state, identity.id, path.id, Utc::now()).await?)
}

async fn void_invoice(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_role(&state, &headers, &[Role::Landlord]).await?;
    ok(invoices::void(&state, identity.id, path.id, Utc::now()).await?)
}

async fn list_lease_invoices(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    Query(query): Query<ListInvoicesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&state, &headers).await?;
    ok(invoices::list_for_lease(&state, identity.id, path.id, query).await?)
}
