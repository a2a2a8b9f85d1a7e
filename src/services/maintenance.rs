use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::audit::{snapshot, write_audit_log};
use crate::{
    auth::{Identity, Role},
    domain::{LeaseStatus, MaintenanceTicket, NewTicket, TicketStatus},
    error::{AppError, AppResult},
    ownership::{assert_unit_landlord, landlord_owns_unit},
    repository::{LeaseFilter, TicketFilter},
    schemas::{CreateTicketInput, ListTicketsQuery},
    state::AppState,
};

pub async fn create(
    state: &AppState,
    tenant_id: Uuid,
    input: CreateTicketInput,
    now: DateTime<Utc>,
) -> AppResult<MaintenanceTicket> {
    let unit = state.store.get_unit(input.unit_id).await?;
    let active_leases = state
        .store
        .list_leases(&LeaseFilter {
            tenant_id: Some(tenant_id),
            unit_id: Some(unit.id),
            statuses: vec![LeaseStatus::Active],
            limit: 1,
            ..LeaseFilter::default()
        })
        .await?;
    if active_leases.is_empty() {
        return Err(AppError::Forbidden(
            "Forbidden: an active lease on this unit is required to open tickets.".to_string(),
        ));
    }

    let ticket = MaintenanceTicket::open(
        unit.id,
        tenant_id,
        NewTicket {
            title: input.title,
            description: input.description,
            category: input.category,
            priority: input.priority,
            attachments: input.attachments,
        },
        now,
    );
    let capacity = state.config.max_open_tickets_per_unit;
    let created = state
        .store
        .insert_ticket_within_capacity(&ticket, capacity)
        .await?
        .ok_or_else(|| {
            AppError::Capacity(format!(
                "Unit already has {capacity} open maintenance tickets."
            ))
        })?;

    tracing::info!(
        ticket_id = %created.id,
        unit_id = %unit.id,
        "Maintenance ticket opened"
    );
    write_audit_log(
        state,
        Some(tenant_id),
        "create",
        "maintenance_tickets",
        created.id,
        None,
        snapshot(&created),
        now,
    )
    .await;
    Ok(created)
}

pub async fn assign(
    state: &AppState,
    landlord_id: Uuid,
    ticket_id: Uuid,
    staff_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<MaintenanceTicket> {
    let ticket = state.store.get_ticket(ticket_id).await?;
    assert_unit_landlord(state, landlord_id, ticket.unit_id).await?;
    let next = ticket.assign(landlord_id, staff_id, now)?;
    save(state, landlord_id, "assign", &ticket, next, now).await
}

pub async fn update_status(
    state: &AppState,
    staff_id: Uuid,
    ticket_id: Uuid,
    target: TicketStatus,
    note: Option<String>,
    now: DateTime<Utc>,
) -> AppResult<MaintenanceTicket> {
    let ticket = state.store.get_ticket(ticket_id).await?;
    let next = ticket.update_status(staff_id, target, note, now)?;
    save(state, staff_id, "update_status", &ticket, next, now).await
}

pub async fn close(
    state: &AppState,
    landlord_id: Uuid,
    ticket_id: Uuid,
    note: Option<String>,
    now: DateTime<Utc>,
) -> AppResult<MaintenanceTicket> {
    let ticket = state.store.get_ticket(ticket_id).await?;
    assert_unit_landlord(state, landlord_id, ticket.unit_id).await?;
    let note = note
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());
    let next = ticket.close(landlord_id, note, now)?;
    save(state, landlord_id, "close", &ticket, next, now).await
}

async fn save(
    state: &AppState,
    actor_id: Uuid,
    action: &str,
    current: &MaintenanceTicket,
    next: MaintenanceTicket,
    now: DateTime<Utc>,
) -> AppResult<MaintenanceTicket> {
    let updated = state
        .store
        .update_ticket(&next, current.status)
        .await?
        .ok_or_else(|| {
            AppError::InvalidState("Ticket was changed by another request.".to_string())
        })?;

    tracing::info!(
        ticket_id = %updated.id,
        action,
        from = current.status.as_str(),
        to = updated.status.as_str(),
        "Maintenance ticket updated"
    );
    write_audit_log(
        state,
        Some(actor_id),
        action,
        "maintenance_tickets",
        updated.id,
        snapshot(current),
        snapshot(&updated),
        now,
    )
    .await;
    Ok(updated)
}

pub async fn list(
    state: &AppState,
    identity: Identity,
    query: ListTicketsQuery,
) -> AppResult<Vec<MaintenanceTicket>> {
    let mut filter = TicketFilter {
        unit_id: query.unit_id,
        statuses: query.status.into_iter().collect(),
        limit: query.limit,
        ..TicketFilter::default()
    };
    match identity.role {
        Role::Landlord => {
            let Some(unit_id) = query.unit_id else {
                return Err(AppError::Validation(
                    "unit_id is required when listing tickets as a landlord.".to_string(),
                ));
            };
            assert_unit_landlord(state, identity.id, unit_id).await?;
        }
        Role::Tenant => filter.created_by = Some(identity.id),
        Role::Maintenance => filter.assigned_to = Some(identity.id),
    }
    state.store.list_tickets(&filter).await
}

/// Tickets are visible to their creator, their assignee and the unit's landlord.
pub async fn get(
    state: &AppState,
    user_id: Uuid,
    ticket_id: Uuid,
) -> AppResult<MaintenanceTicket> {
    let ticket = state.store.get_ticket(ticket_id).await?;
    if ticket.created_by == user_id
        || ticket.assigned_to == Some(user_id)
        || landlord_owns_unit(state, user_id, ticket.unit_id).await?
    {
        return Ok(ticket);
    }
    Err(AppError::Forbidden(
        "Forbidden: ticket is not visible to this user.".to_string(),
    ))
}
