use axum::{extract::State, http::HeaderMap, Json};
use serde_json::Value;

use super::ok;
use crate::{auth::require_identity, error::AppResult, state::AppState};

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let identity = require_identity(&state, &headers).await?;
    ok(identity)
}
