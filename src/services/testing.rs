//! Fixtures shared by the service tests.

use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use super::{applications, leases, units};
use crate::{
    domain::{Lease, LeaseResponse, LeaseTerms, Unit},
    schemas::{CreateLeaseInput, CreatePropertyInput, CreateUnitInput, SubmitApplicationInput},
    state::AppState,
};

/// A fresh property with one AVAILABLE unit renting at 1000.
pub async fn seed_unit(state: &AppState, landlord_id: Uuid) -> Unit {
    let property = units::create_property(
        state,
        landlord_id,
        CreatePropertyInput {
            name: "Harbor View".to_string(),
            address_line1: Some("12 Quay St".to_string()),
            city: Some("Halifax".to_string()),
        },
        Utc::now(),
    )
    .await
    .expect("property");
    units::create_unit(
        state,
        landlord_id,
        property.id,
        CreateUnitInput {
            unit_number: "3C".to_string(),
            bedrooms: 2,
            bathrooms: None,
            rent_amount: dec!(1000),
            deposit_amount: None,
        },
        Utc::now(),
    )
    .await
    .expect("unit")
}

pub fn application_input(unit_id: Uuid) -> SubmitApplicationInput {
    SubmitApplicationInput {
        unit_id,
        note: Some("Moving for work".to_string()),
        documents: vec!["https://files.example.com/id.pdf".to_string()],
    }
}

pub fn lease_input(application_id: Uuid) -> CreateLeaseInput {
    CreateLeaseInput {
        application_id,
        start_date: None,
        end_date: None,
        rent_amount: None,
        deposit_amount: None,
        due_day: None,
        terms: LeaseTerms::default(),
        documents: vec![],
    }
}

/// Runs apply, lease and accept for a new unit owned by `landlord_id`.
pub async fn active_lease(state: &AppState, landlord_id: Uuid, tenant_id: Uuid) -> (Unit, Lease) {
    let unit = seed_unit(state, landlord_id).await;
    let application = applications::submit(state, tenant_id, application_input(unit.id), Utc::now())
        .await
        .expect("application");
    let lease = leases::create(state, landlord_id, lease_input(application.id), Utc::now())
        .await
        .expect("lease");
    let lease = leases::respond(state, tenant_id, lease.id, LeaseResponse::Accept, Utc::now())
        .await
        .expect("accept");
    let unit = state.store.get_unit(unit.id).await.expect("unit");
    (unit, lease)
}
