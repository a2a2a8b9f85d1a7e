use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::audit::{snapshot, write_audit_log};
use crate::{
    domain::{LeaseStatus, Property, Unit, UnitStatus},
    error::{AppError, AppResult},
    ownership::assert_unit_landlord,
    repository::LeaseFilter,
    schemas::{CreatePropertyInput, CreateUnitInput},
    state::AppState,
};

pub async fn create_property(
    state: &AppState,
    landlord_id: Uuid,
    input: CreatePropertyInput,
    now: DateTime<Utc>,
) -> AppResult<Property> {
    let property = Property {
        id: Uuid::new_v4(),
        landlord_id,
        name: input.name.trim().to_string(),
        address_line1: trimmed(input.address_line1),
        city: trimmed(input.city),
        created_at: now,
    };
    let created = state.store.insert_property(&property).await?;
    write_audit_log(
        state,
        Some(landlord_id),
        "create",
        "properties",
        created.id,
        None,
        snapshot(&created),
        now,
    )
    .await;
    Ok(created)
}

pub async fn create_unit(
    state: &AppState,
    landlord_id: Uuid,
    property_id: Uuid,
    input: CreateUnitInput,
    now: DateTime<Utc>,
) -> AppResult<Unit> {
    let property = state.store.get_property(property_id).await?;
    if property.landlord_id != landlord_id {
        return Err(AppError::Forbidden(
            "Forbidden: property belongs to another landlord.".to_string(),
        ));
    }
    let deposit_amount = input.deposit_amount.unwrap_or(input.rent_amount);
    if input.rent_amount.is_sign_negative() || deposit_amount.is_sign_negative() {
        return Err(AppError::Validation(
            "Rent and deposit amounts must not be negative.".to_string(),
        ));
    }
    let bathrooms = input.bathrooms.unwrap_or(Decimal::ONE);
    if bathrooms.is_sign_negative() {
        return Err(AppError::Validation(
            "bathrooms must not be negative.".to_string(),
        ));
    }

    let unit = Unit {
        id: Uuid::new_v4(),
        property_id,
        unit_number: input.unit_number.trim().to_string(),
        bedrooms: input.bedrooms,
        bathrooms,
        rent_amount: input.rent_amount,
        deposit_amount,
        status: UnitStatus::Available,
        is_archived: false,
        created_at: now,
        updated_at: now,
    };
    let created = state.store.insert_unit(&unit).await?;
    state
        .ownership_cache
        .insert(created.id, property.landlord_id)
        .await;
    write_audit_log(
        state,
        Some(landlord_id),
        "create",
        "units",
        created.id,
        None,
        snapshot(&created),
        now,
    )
    .await;
    Ok(created)
}

/// Plain availability write with no lifecycle checks.
pub async fn set_status(
    state: &AppState,
    unit_id: Uuid,
    status: UnitStatus,
    now: DateTime<Utc>,
) -> AppResult<Unit> {
    let mut unit = state.store.get_unit(unit_id).await?;
    unit.status = status;
    unit.updated_at = now;
    state.store.update_unit(&unit).await
}

/// Landlord-initiated availability change between AVAILABLE and MAINTENANCE.
pub async fn change_status(
    state: &AppState,
    landlord_id: Uuid,
    unit_id: Uuid,
    next: UnitStatus,
    now: DateTime<Utc>,
) -> AppResult<Unit> {
    assert_unit_landlord(state, landlord_id, unit_id).await?;
    let unit = state.store.get_unit(unit_id).await?;
    unit.ensure_manual_status_change(next)?;
    if unit.status == next {
        return Ok(unit);
    }

    let updated = set_status(state, unit_id, next, now).await?;
    tracing::info!(
        unit_id = %unit_id,
        from = unit.status.as_str(),
        to = next.as_str(),
        "Unit status changed"
    );
    write_audit_log(
        state,
        Some(landlord_id),
        "status",
        "units",
        unit_id,
        snapshot(&unit),
        snapshot(&updated),
        now,
    )
    .await;
    Ok(updated)
}

pub async fn archive_unit(
    state: &AppState,
    landlord_id: Uuid,
    unit_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<Unit> {
    assert_unit_landlord(state, landlord_id, unit_id).await?;
    let unit = state.store.get_unit(unit_id).await?;
    if unit.is_archived {
        return Ok(unit);
    }

    let holding = state
        .store
        .list_leases(&LeaseFilter {
            unit_id: Some(unit_id),
            statuses: LeaseStatus::HOLDING.to_vec(),
            limit: 1,
            ..LeaseFilter::default()
        })
        .await?;
    if !holding.is_empty() {
        return Err(AppError::InvalidState(
            "Unit has a pending or active lease and cannot be archived.".to_string(),
        ));
    }

    let mut next = unit.clone();
    next.is_archived = true;
    next.updated_at = now;
    let updated = state.store.update_unit(&next).await?;
    write_audit_log(
        state,
        Some(landlord_id),
        "archive",
        "units",
        unit_id,
        snapshot(&unit),
        snapshot(&updated),
        now,
    )
    .await;
    Ok(updated)
}

pub async fn list_properties(state: &AppState, landlord_id: Uuid) -> AppResult<Vec<Property>> {
    state.store.list_properties(landlord_id).await
}

pub async fn list_units(state: &AppState, property_id: Uuid) -> AppResult<Vec<Unit>> {
    state.store.get_property(property_id).await?;
    state.store.list_units(property_id).await
}

pub async fn get_unit(state: &AppState, unit_id: Uuid) -> AppResult<Unit> {
    state.store.get_unit(unit_id).await
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
