use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use serde_json::Value;

use super::{created, ok};
use crate::{
    auth::{require_identity, require_role, Role},
    error::AppResult,
    schemas::{validate_input, CreatePropertyInput, CreateUnitInput, IdPath, UnitStatusInput},
    services::units,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/properties", get(list_properties).post(create_property))
        .route(
            "/properties/{id}/units",
            get(list_units).post(create_unit),
        )
        .route("/units/{id}", get(get_unit))
        .route("/units/{id}/status", patch(change_unit_status))
        .route("/units/{id}/archive", patch(archive_unit))
}

async fn create_property(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePropertyInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let identity = require_role(&state, &headers, &[Role::Landlord]).await?;
    validate_input(&payload)?;
    created(units::create_property(&state, identity.id, payload, Utc::now()).await?)
}

async fn list_properties(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_role(&state, &headers, &[Role::Landlord]).await?;
    ok(units::list_properties(&state, identity.id).await?)
}

async fn create_unit(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<CreateUnitInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let identity = require_role(&state, &headers, &[Role::Landlord]).await?;
    validate_input(&payload)?;
    created(units::create_unit(&state, identity.id, path.id, payload, Utc::now()).await?)
}

async fn list_units(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_identity(&state, &headers).await?;
    ok(units::list_units(&state, path.id).await?)
}

async fn get_unit(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_identity(&state, &headers).await?;
    ok(units::get_unit(&state, path.id).await?)
}

async fn change_unit_status(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<UnitStatusInput>,
) -> AppResult<Json<Value>> {
    let identity = require_role(&state, &headers, &[Role::Landlord]).await?;
    ok(units::change_status(&state, identity.id, path.id, payload.status, Utc::now()).await?)
}

async fn archive_unit(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_role(&state, &headers, &[Role::Landlord]).await?;
    ok(units::archive_unit(&state, identity.id, path.id, Utc::now()).await?)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use uuid::Uuid;

    use crate::{
        routes::test_support::{app, call},
        state::testing,
    };

    #[tokio::test]
    async fn landlord_builds_inventory_and_toggles_maintenance() {
        let (state, _) = testing::state();
        let app = app(&state);
        let landlord = Uuid::new_v4();

        let (status, body) = call(
            &app,
            Method::POST,
            "/properties",
            Some((landlord, "LANDLORD")),
            Some(json!({"name": "Elm Court", "city": "Toronto"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        let property_id = body["data"]["id"].as_str().expect("id").to_string();

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/properties/{property_id}/units"),
            Some((landlord, "LANDLORD")),
            Some(json!({"unit_number": "101", "bedrooms": 1, "rent_amount": "1250.00"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "AVAILABLE");
        let unit_id = body["data"]["id"].as_str().expect("id").to_string();

        let (status, _) = call(
            &app,
            Method::PATCH,
            &format!("/units/{unit_id}/status"),
            Some((Uuid::new_v4(), "LANDLORD")),
            Some(json!({"status": "MAINTENANCE"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &app,
            Method::PATCH,
            &format!("/units/{unit_id}/status"),
            Some((landlord, "LANDLORD")),
            Some(json!({"status": "OCCUPIED"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_state");

        let (status, body) = call(
            &app,
            Method::PATCH,
            &format!("/units/{unit_id}/status"),
            Some((landlord, "LANDLORD")),
            Some(json!({"status": "MAINTENANCE"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "MAINTENANCE");
    }

    #[tokio::test]
    async fn tenants_cannot_create_properties() {
        let (state, _) = testing::state();
        let (status, body) = call(
            &app(&state),
            Method::POST,
            "/properties",
            Some((Uuid::new_v4(), "TENANT")),
            Some(json!({"name": "Nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
    }
}
