use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use sqlx::{PgExecutor, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::AppError;

const ALLOWED_TABLES: &[&str] = &[
    "applications",
    "audit_logs",
    "invoices",
    "leases",
    "maintenance_tickets",
    "payments",
    "properties",
    "units",
];

/// Row predicate appended to a `WHERE 1=1` clause. Empty lists are skipped.
#[derive(Debug, Clone)]
pub enum Filter {
    Uuid(&'static str, Uuid),
    UuidIn(&'static str, Vec<Uuid>),
    Text(&'static str, String),
    TextIn(&'static str, Vec<String>),
    DateBefore(&'static str, NaiveDate),
}

impl Filter {
    pub fn statuses<S: AsRef<str>>(statuses: &[S]) -> Self {
        Filter::TextIn(
            "status",
            statuses
                .iter()
                .map(|status| status.as_ref().to_string())
                .collect(),
        )
    }
}

pub async fn get_row<'e, E>(executor: E, table: &str, row_id: Uuid) -> Result<Value, AppError>
where
    E: PgExecutor<'e>,
{
    let table_name = validate_table(table)?;
    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query
        .push(table_name)
        .push(" t WHERE t.id = ")
        .push_bind(row_id)
        .push(" LIMIT 1");

    let row = query
        .build()
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::NotFound(format!("{} record not found.", singular(table_name))))
}

pub async fn list_rows<'e, E>(
    executor: E,
    table: &str,
    filters: &[Filter],
    order_by: &str,
    ascending: bool,
    limit: i64,
) -> Result<Vec<Value>, AppError>
where
    E: PgExecutor<'e>,
{
    let mut query = build_select(table, filters, order_by, ascending, limit)?;
    let rows = query
        .build()
        .fetch_all(executor)
        .await
        .map_err(map_db_error)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .collect())
}

pub async fn count_rows<'e, E>(executor: E, table: &str, filters: &[Filter]) -> Result<i64, AppError>
where
    E: PgExecutor<'e>,
{
    let table_name = validate_table(table)?;
    let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*)::bigint AS total FROM ");
    query.push(table_name).push(" t WHERE 1=1");
    for filter in filters {
        push_filter(&mut query, filter)?;
    }

    let row = query
        .build()
        .fetch_one(executor)
        .await
        .map_err(map_db_error)?;
    Ok(row.try_get::<i64, _>("total").unwrap_or(0))
}

pub async fn create_row<'e, E>(
    executor: E,
    table: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError>
where
    E: PgExecutor<'e>,
{
    let mut query = build_insert(table, payload)?;
    let row = query
        .build()
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::Internal(format!("Could not create {table} record.")))
}

/// Patches a row, optionally only while `guard` still matches. `None` means
/// no row matched (missing or guard failed).
pub async fn update_row<'e, E>(
    executor: E,
    table: &str,
    row_id: Uuid,
    patch: &Map<String, Value>,
    guard: Option<&Filter>,
) -> Result<Option<Value>, AppError>
where
    E: PgExecutor<'e>,
{
    let mut query = build_update(table, row_id, patch, guard)?;
    let row = query
        .build()
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?;
    Ok(row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten()))
}

pub async fn delete_row<'e, E>(
    executor: E,
    table: &str,
    row_id: Uuid,
    guard: Option<&Filter>,
) -> Result<bool, AppError>
where
    E: PgExecutor<'e>,
{
    let table_name = validate_table(table)?;
    let mut query = QueryBuilder::<Postgres>::new("DELETE FROM ");
    query
        .push(table_name)
        .push(" t WHERE t.id = ")
        .push_bind(row_id);
    if let Some(filter) = guard {
        push_filter(&mut query, filter)?;
    }
    let result = query
        .build()
        .execute(executor)
        .await
        .map_err(map_db_error)?;
    Ok(result.rows_affected() > 0)
}

pub fn to_row<T: Serialize>(value: &T) -> Result<Map<String, Value>, AppError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::Internal(
            "Record did not serialize to an object.".to_string(),
        )),
        Err(error) => Err(AppError::Internal(format!(
            "Could not serialize record: {error}"
        ))),
    }
}

pub fn from_row<T: DeserializeOwned>(row: Value) -> Result<T, AppError> {
    serde_json::from_value(row)
        .map_err(|error| AppError::Internal(format!("Could not decode stored record: {error}")))
}

fn build_select<'a>(
    table: &str,
    filters: &[Filter],
    order_by: &str,
    ascending: bool,
    limit: i64,
) -> Result<QueryBuilder<'a, Postgres>, AppError> {
    let table_name = validate_table(table)?;
    let order_name = if order_by.trim().is_empty() {
        "created_at"
    } else {
        validate_identifier(order_by)?
    };

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE 1=1");
    for filter in filters {
        push_filter(&mut query, filter)?;
    }
    query.push(" ORDER BY t.").push(order_name);
    query.push(if ascending { " ASC" } else { " DESC" });
    query.push(" LIMIT ").push_bind(limit.clamp(1, 1000));
    Ok(query)
}

// jsonb_populate_record lets PostgreSQL resolve column types (uuid, numeric,
// date, jsonb) from the table definition.
fn build_insert<'a>(
    table: &str,
    payload: &Map<String, Value>,
) -> Result<QueryBuilder<'a, Postgres>, AppError> {
    let table_name = validate_table(table)?;
    if payload.is_empty() {
        return Err(AppError::Validation(format!(
            "Could not create {table_name} record."
        )));
    }
    let keys = sorted_keys(payload)?;

    let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
    query.push(table_name).push(" (");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(key.as_str());
        }
    }
    query.push(") SELECT ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push("r.");
            separated.push_unseparated(key.as_str());
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query
        .push(") r RETURNING row_to_json(")
        .push(table_name)
        .push(".*) AS row");
    Ok(query)
}

fn build_update<'a>(
    table: &str,
    row_id: Uuid,
    patch: &Map<String, Value>,
    guard: Option<&Filter>,
) -> Result<QueryBuilder<'a, Postgres>, AppError> {
    let table_name = validate_table(table)?;
    if patch.is_empty() {
        return Err(AppError::Validation("No fields to update.".to_string()));
    }
    let keys = sorted_keys(patch)?;

    let mut query = QueryBuilder::<Postgres>::new("UPDATE ");
    query.push(table_name).push(" t SET ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(key.as_str());
            separated.push_unseparated(" = r.");
            separated.push_unseparated(key.as_str());
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(patch.clone()));
    query.push(") r WHERE t.id = ").push_bind(row_id);
    if let Some(filter) = guard {
        push_filter(&mut query, filter)?;
    }
    query.push(" RETURNING row_to_json(t) AS row");
    Ok(query)
}

fn push_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &Filter) -> Result<(), AppError> {
    match filter {
        Filter::Uuid(column, value) => {
            query
                .push(" AND t.")
                .push(validate_identifier(column)?)
                .push(" = ")
                .push_bind(*value);
        }
        Filter::UuidIn(column, values) => {
            if values.is_empty() {
                return Ok(());
            }
            query
                .push(" AND t.")
                .push(validate_identifier(column)?)
                .push(" = ANY(")
                .push_bind(values.clone())
                .push(")");
        }
        Filter::Text(column, value) => {
            query
                .push(" AND t.")
                .push(validate_identifier(column)?)
                .push("::text = ")
                .push_bind(value.clone());
        }
        Filter::TextIn(column, values) => {
            if values.is_empty() {
                return Ok(());
            }
            query
                .push(" AND t.")
                .push(validate_identifier(column)?)
                .push("::text = ANY(")
                .push_bind(values.clone())
                .push(")");
        }
        Filter::DateBefore(column, value) => {
            query
                .push(" AND t.")
                .push(validate_identifier(column)?)
                .push(" < ")
                .push_bind(*value);
        }
    }
    Ok(())
}

fn sorted_keys(payload: &Map<String, Value>) -> Result<Vec<String>, AppError> {
    let mut keys = payload.keys().cloned().collect::<Vec<_>>();
    keys.sort_unstable();
    for key in &keys {
        validate_identifier(key)?;
    }
    Ok(keys)
}

fn validate_table(table: &str) -> Result<&str, AppError> {
    let normalized = validate_identifier(table)?;
    if ALLOWED_TABLES.contains(&normalized) {
        return Ok(normalized);
    }
    Err(AppError::Internal(format!(
        "Table '{normalized}' is not allowed."
    )))
}

fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    let valid = !trimmed.is_empty()
        && trimmed.chars().all(|character| {
            character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
        })
        && !trimmed
            .chars()
            .next()
            .is_some_and(|first| first.is_ascii_digit());
    if valid {
        Ok(trimmed)
    } else {
        Err(AppError::Internal(format!(
            "Invalid identifier '{trimmed}'."
        )))
    }
}

fn singular(table: &str) -> String {
    let name = table.strip_suffix('s').unwrap_or(table);
    let mut chars = name.replace('_', " ").chars().collect::<Vec<_>>();
    if let Some(first) = chars.first_mut() {
        *first = first.to_ascii_uppercase();
    }
    chars.into_iter().collect()
}

pub(crate) fn map_db_error(error: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(database_error) = &error {
        if database_error.code().as_deref() == Some("23505") {
            let constraint = database_error.constraint().unwrap_or("unique constraint");
            tracing::debug!(constraint, "Unique constraint rejected write");
            return AppError::Conflict(conflict_message(constraint));
        }
    }
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");
    AppError::Dependency(format!("Database operation failed: {message}"))
}

fn conflict_message(constraint: &str) -> String {
    match constraint {
        "applications_one_pending_idx" => {
            "A pending application for this unit already exists.".to_string()
        }
        "leases_one_holding_per_unit_idx" => {
            "Unit already has a pending or active lease.".to_string()
        }
        "invoices_lease_period_key" => {
            "An invoice for this lease and period already exists.".to_string()
        }
        "payments_provider_ref_idx" => {
            "A payment with this provider reference already exists.".to_string()
        }
        _ => "Duplicate value violates a unique constraint.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};
    use uuid::Uuid;

    use super::{
        build_insert, build_select, build_update, conflict_message, singular, validate_table,
        Filter,
    };

    fn payload() -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("status".to_string(), json!("ACTIVE"));
        payload.insert("accepted_at".to_string(), json!("2026-03-01T00:00:00Z"));
        payload
    }

    #[test]
    fn insert_sql_uses_jsonb_populate_record() {
        let query = build_insert("leases", &payload()).expect("query");
        let sql = query.sql();
        assert!(
            sql.contains("jsonb_populate_record(NULL::leases"),
            "Expected jsonb_populate_record in SQL but got: {sql}"
        );
        assert!(
            sql.contains("SELECT r.accepted_at, r.status"),
            "Expected sorted r.col references in SQL but got: {sql}"
        );
    }

    #[test]
    fn guarded_update_appends_status_predicate() {
        let guard = Filter::statuses(&["PENDING"]);
        let query = build_update("leases", Uuid::new_v4(), &payload(), Some(&guard)).expect("query");
        let sql = query.sql();
        assert!(sql.contains("accepted_at = r.accepted_at, status = r.status"));
        assert!(sql.contains("WHERE t.id = $2 AND t.status::text = ANY($3)"), "{sql}");
        assert!(sql.ends_with("RETURNING row_to_json(t) AS row"));
    }

    #[test]
    fn empty_list_filters_are_skipped() {
        let query = build_select(
            "invoices",
            &[Filter::TextIn("status", vec![]), Filter::UuidIn("lease_id", vec![])],
            "due_date",
            true,
            50,
        )
        .expect("query");
        let sql = query.sql();
        assert!(sql.contains("WHERE 1=1 ORDER BY t.due_date ASC"), "{sql}");
    }

    #[test]
    fn rejects_unknown_tables_and_identifiers() {
        assert!(validate_table("organizations").is_err());
        assert!(validate_table("Leases").is_err());
        assert!(build_select("leases", &[], "1bad", true, 10).is_err());
        let mut bad = Map::new();
        bad.insert("status; drop".to_string(), json!("x"));
        assert!(build_insert("leases", &bad).is_err());
    }

    #[test]
    fn names_conflicts_and_tables() {
        assert_eq!(singular("maintenance_tickets"), "Maintenance ticket");
        assert_eq!(singular("leases"), "Lease");
        assert!(conflict_message("invoices_lease_period_key").contains("period"));
    }
}
