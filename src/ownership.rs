use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

/// Landlord owning the unit's property. Unit-to-landlord links never change
/// once written, so positive lookups are cached.
pub async fn unit_landlord(state: &AppState, unit_id: Uuid) -> AppResult<Option<Uuid>> {
    if let Some(landlord_id) = state.ownership_cache.get(&unit_id).await {
        return Ok(Some(landlord_id));
    }
    let landlord_id = state.store.unit_landlord(unit_id).await?;
    if let Some(landlord_id) = landlord_id {
        state.ownership_cache.insert(unit_id, landlord_id).await;
    }
    Ok(landlord_id)
}

pub async fn landlord_owns_unit(
    state: &AppState,
    landlord_id: Uuid,
    unit_id: Uuid,
) -> AppResult<bool> {
    Ok(unit_landlord(state, unit_id).await? == Some(landlord_id))
}

pub async fn assert_unit_landlord(
    state: &AppState,
    landlord_id: Uuid,
    unit_id: Uuid,
) -> AppResult<()> {
    match unit_landlord(state, unit_id).await? {
        Some(owner) if owner == landlord_id => Ok(()),
        Some(_) => Err(AppError::Forbidden(
            "Forbidden: unit belongs to another landlord.".to_string(),
        )),
        None => Err(AppError::NotFound("Unit record not found.".to_string())),
    }
}
