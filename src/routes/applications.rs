use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{created, ok};
use crate::{
    auth::{require_identity, require_role, Role},
    domain::ApplicationDecision,
    error::AppResult,
    schemas::{validate_input, IdPath, ListApplicationsQuery, SubmitApplicationInput},
    services::applications,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/applications",
            post(submit_application).get(list_applications),
        )
        .route(
            "/applications/{id}",
            get(get_application).delete(delete_application),
        )
        .route("/applications/{id}/approve", patch(approve_application))
        .route("/applications/{id}/reject", patch(reject_application))
        .route("/applications/{id}/withdraw", patch(withdraw_application))
}

async fn submit_application(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SubmitApplicationInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let identity = require_role(&state, &headers, &[Role::Tenant]).await?;
    validate_input(&payload)?;
    created(applications::submit(&state, identity.id, payload, Utc::now()).await?)
}

async fn list_applications(
    State(state): State<AppState>,
    Query(query): Query<ListApplicationsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&state, &headers).await?;
    ok(applications::list(&state, identity, query).await?)
}

async fn get_application(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&state, &headers).await?;
    ok(applications::get(&state, identity, path.id).await?)
}

async fn approve_application(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    decide(&state, &headers, path.id, ApplicationDecision::Approve).await
}

async fn reject_application(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    decide(&state, &headers, path.id, ApplicationDecision::Reject).await
}

async fn decide(
    state: &AppState,
    headers: &HeaderMap,
    application_id: Uuid,
    decision: ApplicationDecision,
) -> AppResult<Json<Value>> {
    let identity = require_role(state, headers, &[Role::Landlord]).await?;
    ok(applications::decide(state, identity.id, application_id, decision, Utc::now()).await?)
}

async fn withdraw_application(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_role(&state, &headers, &[Role::Tenant]).await?;
    ok(applications::withdraw(&state, identity.id, path.id, Utc::now()).await?)
}

async fn delete_application(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_role(&state, &headers, &[Role::Tenant]).await?;
    applications::delete_pending(&state, identity.id, path.id, Utc::now()).await?;
    ok(json!({ "id": path.id, "deleted": true }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use uuid::Uuid;

    use crate::{
        routes::test_support::{app, call},
        services::testing::seed_unit,
        state::testing,
    };

    #[tokio::test]
    async fn submit_approve_and_duplicate() {
        let (state, _) = testing::state();
        let app = app(&state);
        let landlord = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let unit = seed_unit(&state, landlord).await;
        let payload = json!({
            "unit_id": unit.id,
            "note": "Quiet, no pets",
            "documents": ["https://files.example.com/paystub.pdf"],
        });

        let (status, _) = call(&app, Method::POST, "/applications", None, Some(payload.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(
            &app,
            Method::POST,
            "/applications",
            Some((tenant, "TENANT")),
            Some(payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "PENDING");
        let id = body["data"]["id"].as_str().expect("id").to_string();

        let (status, body) = call(
            &app,
            Method::POST,
            "/applications",
            Some((tenant, "TENANT")),
            Some(payload),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");

        let (status, _) = call(
            &app,
            Method::PATCH,
            &format!("/applications/{id}/approve"),
            Some((tenant, "TENANT")),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &app,
            Method::PATCH,
            &format!("/applications/{id}/approve"),
            Some((landlord, "LANDLORD")),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "APPROVED");

        let (status, body) = call(
            &app,
            Method::GET,
            "/applications",
            Some((landlord, "LANDLORD")),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn rejects_unsupported_document_types() {
        let (state, _) = testing::state();
        let unit = seed_unit(&state, Uuid::new_v4()).await;
        let (status, body) = call(
            &app(&state),
            Method::POST,
            "/applications",
            Some((Uuid::new_v4(), "TENANT")),
            Some(json!({
                "unit_id": unit.id,
                "documents": ["https://files.example.com/run.exe"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }
}
