use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::audit::{snapshot, write_audit_log};
use crate::{
    auth::{Identity, Role},
    domain::{Lease, LeaseDraft, LeaseResponse, LeaseStatus, LeaseTransition},
    error::{AppError, AppResult},
    ownership::assert_unit_landlord,
    repository::{LeaseFilter, MAX_LIST_LIMIT},
    schemas::{CreateLeaseInput, ListLeasesQuery},
    state::AppState,
};

pub async fn create(
    state: &AppState,
    landlord_id: Uuid,
    input: CreateLeaseInput,
    now: DateTime<Utc>,
) -> AppResult<Lease> {
    let application = state.store.get_application(input.application_id).await?;
    assert_unit_landlord(state, landlord_id, application.unit_id).await?;
    application.ensure_leasable()?;
    let unit = state.store.get_unit(application.unit_id).await?;

    let draft = LeaseDraft {
        start_date: input.start_date,
        end_date: input.end_date,
        rent_amount: input.rent_amount,
        deposit_amount: input.deposit_amount,
        due_day: input.due_day,
        terms: input.terms,
        documents: input.documents,
    };
    let lease = Lease::from_application(&application, &unit, landlord_id, draft, now)?;
    let created = state.store.create_lease(&lease).await?;

    tracing::info!(
        lease_id = %created.id,
        unit_id = %created.unit_id,
        application_id = %application.id,
        "Lease created"
    );
    write_audit_log(
        state,
        Some(landlord_id),
        "create",
        "leases",
        created.id,
        None,
        snapshot(&created),
        now,
    )
    .await;
    Ok(created)
}

pub async fn respond(
    state: &AppState,
    tenant_id: Uuid,
    lease_id: Uuid,
    response: LeaseResponse,
    now: DateTime<Utc>,
) -> AppResult<Lease> {
    let lease = state.store.get_lease(lease_id).await?;
    lease.ensure_tenant(tenant_id)?;

    let transition = LeaseTransition::respond(response, now);
    if !transition.applies_to(&lease) {
        return Err(AppError::InvalidState(format!(
            "Lease is {} and no longer awaits a response.",
            lease.status.as_str()
        )));
    }
    let updated = state
        .store
        .transition_lease(lease_id, &transition)
        .await?
        .ok_or_else(|| {
            AppError::InvalidState("Lease no longer awaits a response.".to_string())
        })?;

    tracing::info!(
        lease_id = %lease_id,
        unit_id = %updated.unit_id,
        status = updated.status.as_str(),
        unit_status = transition.unit_status.as_str(),
        "Lease response recorded"
    );
    write_audit_log(
        state,
        Some(tenant_id),
        "respond",
        "leases",
        lease_id,
        snapshot(&lease),
        snapshot(&updated),
        now,
    )
    .await;
    Ok(updated)
}

/// Ends an ACTIVE lease and releases the unit. Leases in any other status
/// are returned unchanged.
pub async fn terminate(
    state: &AppState,
    landlord_id: Uuid,
    lease_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<Lease> {
    let lease = state.store.get_lease(lease_id).await?;
    lease.ensure_landlord(landlord_id)?;

    let transition = LeaseTransition::terminate(now);
    if !transition.applies_to(&lease) {
        tracing::debug!(
            lease_id = %lease_id,
            status = lease.status.as_str(),
            "Terminate ignored for non-active lease"
        );
        return Ok(lease);
    }
    let Some(updated) = state.store.transition_lease(lease_id, &transition).await? else {
        return state.store.get_lease(lease_id).await;
    };

    tracing::info!(lease_id = %lease_id, unit_id = %updated.unit_id, "Lease terminated");
    write_audit_log(
        state,
        Some(landlord_id),
        "terminate",
        "leases",
        lease_id,
        snapshot(&lease),
        snapshot(&updated),
        now,
    )
    .await;
    Ok(updated)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpiryRunResult {
    pub expired: u32,
    pub errors: u32,
}

/// Moves ACTIVE leases whose end date has passed to EXPIRED.
pub async fn expire_ended_leases(state: &AppState, now: DateTime<Utc>) -> AppResult<ExpiryRunResult> {
    let today = now.date_naive();
    let mut result = ExpiryRunResult::default();
    let mut seen = HashSet::new();
    // Expired leases drop out of the ACTIVE filter; keep pulling batches
    // until one is short or holds nothing not already handled.
    loop {
        let candidates = state
            .store
            .list_leases(&LeaseFilter {
                statuses: vec![LeaseStatus::Active],
                ends_before: Some(today),
                limit: MAX_LIST_LIMIT,
                ..LeaseFilter::default()
            })
            .await?;
        let exhausted = (candidates.len() as i64) < MAX_LIST_LIMIT;

        let mut fresh = 0usize;
        for lease in candidates {
            if !seen.insert(lease.id) {
                continue;
            }
            fresh += 1;
            if !lease.has_ended_by(today) {
                continue;
            }
            match state
                .store
                .transition_lease(lease.id, &LeaseTransition::expire(now))
                .await
            {
                Ok(Some(updated)) => {
                    result.expired += 1;
                    write_audit_log(
                        state,
                        None,
                        "expire",
                        "leases",
                        lease.id,
                        snapshot(&lease),
                        snapshot(&updated),
                        now,
                    )
                    .await;
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(lease_id = %lease.id, error = %error, "Failed to expire lease");
                    result.errors += 1;
                }
            }
        }
        if exhausted || fresh == 0 {
            break;
        }
    }
    Ok(result)
}

pub async fn list(
    state: &AppState,
    identity: Identity,
    query: ListLeasesQuery,
) -> AppResult<Vec<Lease>> {
    let mut filter = LeaseFilter {
        statuses: query.status.into_iter().collect(),
        limit: query.limit,
        ..LeaseFilter::default()
    };
    match identity.role {
        Role::Landlord => filter.landlord_id = Some(identity.id),
        Role::Tenant => filter.tenant_id = Some(identity.id),
        Role::Maintenance => {
            return Err(AppError::Forbidden(
                "Forbidden: maintenance staff cannot view leases.".to_string(),
            ))
        }
    }
    state.store.list_leases(&filter).await
}

/// Loads a lease the caller is a party to.
pub async fn get_for_party(state: &AppState, user_id: Uuid, lease_id: Uuid) -> AppResult<Lease> {
    let lease = state.store.get_lease(lease_id).await?;
    if !lease.is_party(user_id) {
        return Err(AppError::Forbidden(
            "Forbidden: not a party to this lease.".to_string(),
        ));
    }
    Ok(lease)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::{create, expire_ended_leases, respond, terminate};
    use crate::{
        domain::{ApplicationStatus, LeaseResponse, LeaseStatus, UnitStatus},
        error::AppError,
        schemas::CreateLeaseInput,
        services::{
            applications,
            testing::{active_lease, application_input, lease_input, seed_unit},
        },
        state::testing,
    };

    #[tokio::test]
    async fn creation_guards_ownership_and_holding_leases() {
        let (state, _) = testing::state();
        let landlord = Uuid::new_v4();
        let unit = seed_unit(&state, landlord).await;
        let first = applications::submit(&state, Uuid::new_v4(), application_input(unit.id), Utc::now())
            .await
            .expect("first");
        let second = applications::submit(&state, Uuid::new_v4(), application_input(unit.id), Utc::now())
            .await
            .expect("second");

        assert!(matches!(
            create(&state, landlord, lease_input(Uuid::new_v4()), Utc::now()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            create(&state, Uuid::new_v4(), lease_input(first.id), Utc::now()).await,
            Err(AppError::Forbidden(_))
        ));

        let lease = create(&state, landlord, lease_input(first.id), Utc::now())
            .await
            .expect("lease");
        assert_eq!(lease.status, LeaseStatus::Pending);
        let approved = state.store.get_application(first.id).await.expect("app");
        assert_eq!(approved.status, ApplicationStatus::Approved);

        assert!(matches!(
            create(&state, landlord, lease_input(second.id), Utc::now()).await,
            Err(AppError::Conflict(_))
        ));
        let untouched = state.store.get_application(second.id).await.expect("app");
        assert_eq!(untouched.status, ApplicationStatus::Pending);
    }

    #[tokio::test]
    async fn tenant_rejection_releases_unit() {
        let (state, _) = testing::state();
        let landlord = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let unit = seed_unit(&state, landlord).await;
        let application = applications::submit(&state, tenant, application_input(unit.id), Utc::now())
            .await
            .expect("submit");
        let lease = create(&state, landlord, lease_input(application.id), Utc::now())
            .await
            .expect("lease");

        assert!(matches!(
            respond(&state, Uuid::new_v4(), lease.id, LeaseResponse::Accept, Utc::now()).await,
            Err(AppError::Forbidden(_))
        ));
        let rejected = respond(&state, tenant, lease.id, LeaseResponse::Reject, Utc::now())
            .await
            .expect("reject");
        assert_eq!(rejected.status, LeaseStatus::Rejected);
        assert_eq!(
            state.store.get_unit(unit.id).await.expect("unit").status,
            UnitStatus::Available
        );
        assert!(matches!(
            respond(&state, tenant, lease.id, LeaseResponse::Accept, Utc::now()).await,
            Err(AppError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn terminate_is_idempotent_after_first_call() {
        let (state, _) = testing::state();
        let landlord = Uuid::new_v4();
        let (unit, lease) = active_lease(&state, landlord, Uuid::new_v4()).await;

        assert!(matches!(
            terminate(&state, Uuid::new_v4(), lease.id, Utc::now()).await,
            Err(AppError::Forbidden(_))
        ));
        let terminated = terminate(&state, landlord, lease.id, Utc::now())
            .await
            .expect("terminate");
        assert_eq!(terminated.status, LeaseStatus::Terminated);
        assert_eq!(
            state.store.get_unit(unit.id).await.expect("unit").status,
            UnitStatus::Available
        );

        let again = terminate(&state, landlord, lease.id, Utc::now())
            .await
            .expect("repeat");
        assert_eq!(again, terminated);
    }

    #[tokio::test]
    async fn expiry_job_only_touches_ended_leases() {
        let (state, _) = testing::state();
        let landlord = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let unit = seed_unit(&state, landlord).await;
        let application = applications::submit(&state, tenant, application_input(unit.id), Utc::now())
            .await
            .expect("submit");
        let today = Utc::now().date_naive();
        let lease = create(
            &state,
            landlord,
            CreateLeaseInput {
                start_date: Some(today - Duration::days(60)),
                end_date: Some(today - Duration::days(1)),
                rent_amount: Some(dec!(900)),
                ..lease_input(application.id)
            },
            Utc::now(),
        )
        .await
        .expect("lease");
        respond(&state, tenant, lease.id, LeaseResponse::Accept, Utc::now())
            .await
            .expect("accept");
        let (_, open_ended) = active_lease(&state, landlord, Uuid::new_v4()).await;

        let result = expire_ended_leases(&state, Utc::now()).await.expect("run");
        assert_eq!(result.expired, 1);
        assert_eq!(
            state.store.get_lease(lease.id).await.expect("lease").status,
            LeaseStatus::Expired
        );
        assert_eq!(
            state.store.get_lease(open_ended.id).await.expect("lease").status,
            LeaseStatus::Active
        );
        assert_eq!(
            state.store.get_unit(unit.id).await.expect("unit").status,
            UnitStatus::Available
        );

        let rerun = expire_ended_leases(&state, Utc::now()).await.expect("rerun");
        assert_eq!(rerun.expired, 0);
    }
}
