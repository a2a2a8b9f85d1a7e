use std::time::Duration;

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    // Bounded so the healthcheck answers even when the first DB connection hangs.
    let store_ok = match tokio::time::timeout(Duration::from_secs(3), state.store.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(error)) => {
            tracing::error!(error = %error, "Health check store ping failed");
            false
        }
        Err(_) => {
            tracing::error!("Health check store ping timed out (3s)");
            false
        }
    };

    let status = if store_ok { "ok" } else { "degraded" };
    let persistence = if state.db_pool.is_some() { "postgres" } else { "memory" };
    Json(json!({
        "status": status,
        "now": Utc::now().to_rfc3339(),
        "db": store_ok,
        "persistence": persistence,
    }))
}
