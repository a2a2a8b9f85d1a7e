use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{repository::AuditEntry, state::AppState};

pub fn snapshot<T: Serialize>(record: &T) -> Option<Value> {
    serde_json::to_value(record).ok()
}

/// Records a lifecycle write. Failures are logged and swallowed.
#[allow(clippy::too_many_arguments)]
pub async fn write_audit_log(
    state: &AppState,
    actor_id: Option<Uuid>,
    action: &str,
    entity_table: &str,
    entity_id: Uuid,
    before_state: Option<Value>,
    after_state: Option<Value>,
    at: DateTime<Utc>,
) {
    let entry = AuditEntry {
        id: Uuid::new_v4(),
        actor_id,
        action: action.to_string(),
        entity_table: entity_table.to_string(),
        entity_id,
        before_state,
        after_state,
        created_at: at,
    };
    if let Err(error) = state.store.insert_audit_log(&entry).await {
        tracing::warn!(
            action,
            entity_table,
            entity_id = %entity_id,
            error = %error,
            "Failed to write audit log"
        );
    }
}
