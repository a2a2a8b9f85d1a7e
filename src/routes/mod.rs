use axum::{http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

pub mod applications;
pub mod health;
pub mod identity;
pub mod invoices;
pub mod leases;
pub mod maintenance;
pub mod payments;
pub mod properties;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/me", get(identity::me))
        .merge(properties::router())
        .merge(applications::router())
        .merge(leases::router())
        .merge(invoices::router())
        .merge(payments::router())
        .merge(maintenance::router())
}

/// `{"success": true, "data": ...}`
pub(crate) fn ok<T: Serialize>(data: T) -> AppResult<Json<Value>> {
    let data = serde_json::to_value(data)
        .map_err(|error| AppError::Internal(format!("Could not serialize response: {error}")))?;
    Ok(Json(json!({ "success": true, "data": data })))
}

pub(crate) fn created<T: Serialize>(data: T) -> AppResult<(StatusCode, Json<Value>)> {
    Ok((StatusCode::CREATED, ok(data)?))
}


#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use uuid::Uuid;

    use super::test_support::{app, call};
    use crate::state::testing;

    #[tokio::test]
    async fn health_reports_ok_on_memory_store() {
        let (state, _) = testing::state();
        let (status, body) = call(&app(&state), Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["persistence"], "memory");
    }

    #[tokio::test]
    async fn me_echoes_identity_and_requires_auth() {
        let (state, _) = testing::state();
        let app = app(&state);
        let user = Uuid::new_v4();

        let (status, body) = call(&app, Method::GET, "/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "unauthorized");

        let (status, body) = call(&app, Method::GET, "/me", Some((user, "maintenance")), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], user.to_string());
        assert_eq!(body["data"]["role"], "MAINTENANCE");
    }
}
