//! Persistence boundary. Services talk to a [`Store`]; `PgStore` backs it
//! with PostgreSQL and `MemoryStore` keeps everything in process.
//!
//! Every status change goes through a guarded method that only writes while
//! the record is still in the expected status and returns `None` otherwise.
//! Multi-record changes (lease + unit, lease + application) are applied as
//! one unit of work by each implementation.

pub mod memory;
pub mod postgres;
pub mod table_service;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    domain::{
        Application, ApplicationStatus, Invoice, InvoiceStatus, InvoiceTotals, Lease, LeaseStatus,
        LeaseTransition, MaintenanceTicket, Payment, PaymentTransition, Property, TicketStatus,
        Unit,
    },
    error::AppResult,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Default)]
pub struct ApplicationFilter {
    pub tenant_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    /// Restricts to units on properties owned by this landlord.
    pub landlord_id: Option<Uuid>,
    pub statuses: Vec<ApplicationStatus>,
    pub limit: i64,
}

#[derive(Debug, Clone, Default)]
pub struct LeaseFilter {
    pub landlord_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub statuses: Vec<LeaseStatus>,
    pub ends_before: Option<NaiveDate>,
    pub limit: i64,
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub lease_id: Option<Uuid>,
    pub statuses: Vec<InvoiceStatus>,
    pub due_before: Option<NaiveDate>,
    pub limit: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub unit_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub statuses: Vec<TicketStatus>,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity_table: String,
    pub entity_id: Uuid,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_LIST_LIMIT: i64 = 200;
pub const MAX_LIST_LIMIT: i64 = 1000;

pub fn clamp_limit(limit: i64) -> i64 {
    if limit <= 0 {
        return DEFAULT_LIST_LIMIT;
    }
    limit.min(MAX_LIST_LIMIT)
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> AppResult<()>;

    async fn insert_property(&self, property: &Property) -> AppResult<Property>;
    async fn get_property(&self, id: Uuid) -> AppResult<Property>;
    async fn list_properties(&self, landlord_id: Uuid) -> AppResult<Vec<Property>>;

    async fn insert_unit(&self, unit: &Unit) -> AppResult<Unit>;
    async fn get_unit(&self, id: Uuid) -> AppResult<Unit>;
    async fn list_units(&self, property_id: Uuid) -> AppResult<Vec<Unit>>;
    /// Plain write of the unit's mutable fields (status, archive flag).
    async fn update_unit(&self, unit: &Unit) -> AppResult<Unit>;
    /// Landlord owning the unit's property, `None` when the unit is unknown.
    async fn unit_landlord(&self, unit_id: Uuid) -> AppResult<Option<Uuid>>;

    /// Fails with `Conflict` when the tenant already has a pending
    /// application for the unit.
    async fn insert_application(&self, application: &Application) -> AppResult<Application>;
    async fn get_application(&self, id: Uuid) -> AppResult<Application>;
    async fn list_applications(&self, filter: &ApplicationFilter) -> AppResult<Vec<Application>>;
    async fn transition_application(
        &self,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Application>>;
    /// Deletes the application only while it is in `expected`.
    async fn delete_application(&self, id: Uuid, expected: ApplicationStatus) -> AppResult<bool>;

    /// Inserts the lease and approves its pending application together.
    /// Fails with `Conflict` when the unit already has a pending or active lease.
    async fn create_lease(&self, lease: &Lease) -> AppResult<Lease>;
    async fn get_lease(&self, id: Uuid) -> AppResult<Lease>;
    async fn list_leases(&self, filter: &LeaseFilter) -> AppResult<Vec<Lease>>;
    /// Applies the lease transition and the implied unit status together.
    async fn transition_lease(
        &self,
        id: Uuid,
        transition: &LeaseTransition,
    ) -> AppResult<Option<Lease>>;

    /// Fails with `Conflict` when the lease already has an invoice for the period.
    async fn insert_invoice(&self, invoice: &Invoice) -> AppResult<Invoice>;
    async fn get_invoice(&self, id: Uuid) -> AppResult<Invoice>;
    async fn list_invoices(&self, filter: &InvoiceFilter) -> AppResult<Vec<Invoice>>;
    async fn save_invoice_totals(
        &self,
        id: Uuid,
        totals: &InvoiceTotals,
        at: DateTime<Utc>,
    ) -> AppResult<Invoice>;
    async fn void_invoice(
        &self,
        id: Uuid,
        expected: &[InvoiceStatus],
        at: DateTime<Utc>,
    ) -> AppResult<Option<Invoice>>;

    async fn insert_payment(&self, payment: &Payment) -> AppResult<Payment>;
    async fn get_payment(&self, id: Uuid) -> AppResult<Payment>;
    async fn list_payments(&self, invoice_id: Uuid) -> AppResult<Vec<Payment>>;
    /// Sum of every SUCCEEDED payment on the invoice, without a row limit.
    async fn sum_succeeded_payments(&self, invoice_id: Uuid) -> AppResult<Decimal>;
    async fn find_payment_by_provider_ref(&self, provider_ref: &str) -> AppResult<Option<Payment>>;
    async fn transition_payment(
        &self,
        id: Uuid,
        transition: &PaymentTransition,
    ) -> AppResult<Option<Payment>>;

    /// Inserts the ticket unless the unit already has `capacity` active
    /// tickets, in which case nothing is written and `None` is returned.
    async fn insert_ticket_within_capacity(
        &self,
        ticket: &MaintenanceTicket,
        capacity: usize,
    ) -> AppResult<Option<MaintenanceTicket>>;
    async fn get_ticket(&self, id: Uuid) -> AppResult<MaintenanceTicket>;
    async fn list_tickets(&self, filter: &TicketFilter) -> AppResult<Vec<MaintenanceTicket>>;
    /// Replaces the ticket while its stored status is still `expected`.
    async fn update_ticket(
        &self,
        ticket: &MaintenanceTicket,
        expected: TicketStatus,
    ) -> AppResult<Option<MaintenanceTicket>>;

    async fn insert_audit_log(&self, entry: &AuditEntry) -> AppResult<()>;
}
