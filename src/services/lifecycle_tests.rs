//! End-to-end walk through the rental lifecycle against the in-memory store.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use super::{
    applications, invoices, leases, maintenance, payments,
    testing::{application_input, lease_input, seed_unit},
};
use crate::{
    domain::{
        ApplicationDecision, ApplicationStatus, InvoiceStatus, LeaseResponse, LeaseStatus,
        invoice::DEFAULT_RENT_LABEL, LineItem, PaymentMethod, PaymentStatus, TicketCategory,
        TicketPriority, UnitStatus,
    },
    error::AppError,
    schemas::{CreateInvoiceInput, CreateLeaseInput, CreatePaymentInput, CreateTicketInput},
    state::testing,
};

#[tokio::test]
async fn apply_lease_invoice_pay() {
    let (state, store) = testing::state();
    let landlord = Uuid::new_v4();
    let tenant = Uuid::new_v4();
    let unit = seed_unit(&state, landlord).await;

    let application = applications::submit(&state, tenant, application_input(unit.id), Utc::now())
        .await
        .expect("submit");
    assert_eq!(application.status, ApplicationStatus::Pending);
    assert_eq!(
        state.store.get_unit(unit.id).await.expect("unit").status,
        UnitStatus::Available
    );

    assert!(matches!(
        applications::submit(&state, tenant, application_input(unit.id), Utc::now()).await,
        Err(AppError::Conflict(_))
    ));

    let approved = applications::decide(
        &state,
        landlord,
        application.id,
        ApplicationDecision::Approve,
        Utc::now(),
    )
    .await
    .expect("approve");
    assert_eq!(approved.status, ApplicationStatus::Approved);

    let lease = leases::create(
        &state,
        landlord,
        CreateLeaseInput {
            rent_amount: Some(dec!(1000)),
            ..lease_input(application.id)
        },
        Utc::now(),
    )
    .await
    .expect("lease");
    assert_eq!(lease.status, LeaseStatus::Pending);
    assert_eq!(lease.deposit_amount, dec!(1000));

    let lease = leases::respond(&state, tenant, lease.id, LeaseResponse::Accept, Utc::now())
        .await
        .expect("accept");
    assert_eq!(lease.status, LeaseStatus::Active);
    assert_eq!(
        state.store.get_unit(unit.id).await.expect("unit").status,
        UnitStatus::Occupied
    );

    let invoice = invoices::create(
        &state,
        landlord,
        CreateInvoiceInput {
            lease_id: lease.id,
            due_date: None,
            line_items: vec![],
        },
        Utc::now(),
    )
    .await
    .expect("invoice");
    assert_eq!(
        invoice.line_items,
        vec![LineItem {
            label: DEFAULT_RENT_LABEL.to_string(),
            amount: dec!(1000),
        }]
    );
    assert_eq!(invoice.amount_due, dec!(1000));
    assert_eq!(invoice.balance, dec!(1000));
    assert_eq!(invoice.status, InvoiceStatus::Issued);

    let receipt = payments::create(
        &state,
        tenant,
        CreatePaymentInput {
            invoice_id: invoice.id,
            method: PaymentMethod::ManualCash,
            amount: None,
            provider_ref: None,
        },
        Utc::now(),
    )
    .await
    .expect("payment");
    assert_eq!(receipt.payment.status, PaymentStatus::Succeeded);
    assert!(receipt.payment.paid_at.is_some());
    assert_eq!(receipt.invoice.amount_paid, dec!(1000));
    assert_eq!(receipt.invoice.balance, Decimal::ZERO);
    assert_eq!(receipt.invoice.status, InvoiceStatus::Paid);

    let tables: Vec<String> = store
        .audit_entries()
        .await
        .into_iter()
        .map(|entry| entry.entity_table)
        .collect();
    for table in ["applications", "leases", "invoices", "payments"] {
        assert!(tables.iter().any(|name| name == table), "missing audit for {table}");
    }
}

#[tokio::test]
async fn sixth_open_ticket_is_rejected() {
    let (state, _) = testing::state();
    let landlord = Uuid::new_v4();
    let tenant = Uuid::new_v4();
    let (unit, _) = super::testing::active_lease(&state, landlord, tenant).await;

    let ticket = |title: String| CreateTicketInput {
        unit_id: unit.id,
        title,
        description: String::new(),
        category: TicketCategory::General,
        priority: TicketPriority::Medium,
        attachments: vec![],
    };
    for index in 0..5 {
        maintenance::create(&state, tenant, ticket(format!("Ticket {index}")), Utc::now())
            .await
            .expect("within capacity");
    }
    assert!(matches!(
        maintenance::create(&state, tenant, ticket("One too many".to_string()), Utc::now()).await,
        Err(AppError::Capacity(_))
    ));
}

#[tokio::test]
async fn a_unit_never_holds_two_leases() {
    let (state, _) = testing::state();
    let landlord = Uuid::new_v4();
    let unit = seed_unit(&state, landlord).await;
    let first = applications::submit(&state, Uuid::new_v4(), application_input(unit.id), Utc::now())
        .await
        .expect("first");
    let second = applications::submit(&state, Uuid::new_v4(), application_input(unit.id), Utc::now())
        .await
        .expect("second");

    let lease = leases::create(&state, landlord, lease_input(first.id), Utc::now())
        .await
        .expect("lease");
    assert!(matches!(
        leases::create(&state, landlord, lease_input(second.id), Utc::now()).await,
        Err(AppError::Conflict(_))
    ));

    leases::respond(&state, lease.tenant_id, lease.id, LeaseResponse::Reject, Utc::now())
        .await
        .expect("reject");
    leases::create(&state, landlord, lease_input(second.id), Utc::now())
        .await
        .expect("unit free again after rejection");
}
