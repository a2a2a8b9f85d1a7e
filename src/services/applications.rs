use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::audit::{snapshot, write_audit_log};
use crate::{
    auth::{Identity, Role},
    domain::{Application, ApplicationDecision, ApplicationStatus},
    error::{AppError, AppResult},
    ownership::{assert_unit_landlord, landlord_owns_unit},
    repository::ApplicationFilter,
    schemas::{ListApplicationsQuery, SubmitApplicationInput},
    state::AppState,
};

pub async fn submit(
    state: &AppState,
    tenant_id: Uuid,
    input: SubmitApplicationInput,
    now: DateTime<Utc>,
) -> AppResult<Application> {
    let unit = state.store.get_unit(input.unit_id).await?;
    unit.ensure_accepts_applications()?;

    let note = input
        .note
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());
    let application = Application::new(tenant_id, unit.id, note, input.documents, now);
    let created = state.store.insert_application(&application).await?;

    tracing::info!(
        application_id = %created.id,
        unit_id = %unit.id,
        tenant_id = %tenant_id,
        "Application submitted"
    );
    write_audit_log(
        state,
        Some(tenant_id),
        "create",
        "applications",
        created.id,
        None,
        snapshot(&created),
        now,
    )
    .await;
    Ok(created)
}

pub async fn decide(
    state: &AppState,
    landlord_id: Uuid,
    application_id: Uuid,
    decision: ApplicationDecision,
    now: DateTime<Utc>,
) -> AppResult<Application> {
    let application = state.store.get_application(application_id).await?;
    assert_unit_landlord(state, landlord_id, application.unit_id).await?;
    application.ensure_pending()?;

    let target = decision.target_status();
    let updated = state
        .store
        .transition_application(application_id, ApplicationStatus::Pending, target, now)
        .await?
        .ok_or_else(stale_application)?;

    tracing::info!(
        application_id = %application_id,
        status = target.as_str(),
        "Application decided"
    );
    write_audit_log(
        state,
        Some(landlord_id),
        decision.audit_action(),
        "applications",
        application_id,
        snapshot(&application),
        snapshot(&updated),
        now,
    )
    .await;
    Ok(updated)
}

pub async fn withdraw(
    state: &AppState,
    tenant_id: Uuid,
    application_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<Application> {
    let application = state.store.get_application(application_id).await?;
    application.ensure_tenant(tenant_id)?;
    application.ensure_pending()?;

    let updated = state
        .store
        .transition_application(
            application_id,
            ApplicationStatus::Pending,
            ApplicationStatus::Withdrawn,
            now,
        )
        .await?
        .ok_or_else(stale_application)?;

    write_audit_log(
        state,
        Some(tenant_id),
        "withdraw",
        "applications",
        application_id,
        snapshot(&application),
        snapshot(&updated),
        now,
    )
    .await;
    Ok(updated)
}

pub async fn delete_pending(
    state: &AppState,
    tenant_id: Uuid,
    application_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let application = state.store.get_application(application_id).await?;
    application.ensure_tenant(tenant_id)?;
    application.ensure_pending()?;

    if !state
        .store
        .delete_application(application_id, ApplicationStatus::Pending)
        .await?
    {
        return Err(stale_application());
    }

    write_audit_log(
        state,
        Some(tenant_id),
        "delete",
        "applications",
        application_id,
        snapshot(&application),
        None,
        now,
    )
    .await;
    Ok(())
}

pub async fn list(
    state: &AppState,
    identity: Identity,
    query: ListApplicationsQuery,
) -> AppResult<Vec<Application>> {
    let mut filter = ApplicationFilter {
        unit_id: query.unit_id,
        statuses: query.status.into_iter().collect(),
        limit: query.limit,
        ..ApplicationFilter::default()
    };
    match identity.role {
        Role::Tenant => filter.tenant_id = Some(identity.id),
        Role::Landlord => filter.landlord_id = Some(identity.id),
        Role::Maintenance => {
            return Err(AppError::Forbidden(
                "Forbidden: maintenance staff cannot view applications.".to_string(),
            ))
        }
    }
    state.store.list_applications(&filter).await
}

pub async fn get(state: &AppState, identity: Identity, application_id: Uuid) -> AppResult<Application> {
    let application = state.store.get_application(application_id).await?;
    let visible = match identity.role {
        Role::Tenant => application.tenant_id == identity.id,
        Role::Landlord => landlord_owns_unit(state, identity.id, application.unit_id).await?,
        Role::Maintenance => false,
    };
    if !visible {
        return Err(AppError::Forbidden(
            "Forbidden: application is not visible to this user.".to_string(),
        ));
    }
    Ok(application)
}

fn stale_application() -> AppError {
    AppError::InvalidState("Application is no longer PENDING.".to_string())
}
