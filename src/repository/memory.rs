use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    clamp_limit, ApplicationFilter, AuditEntry, InvoiceFilter, LeaseFilter, Store, TicketFilter,
};
use crate::{
    domain::{
        Application, ApplicationStatus, Invoice, InvoiceStatus, InvoiceTotals, Lease,
        LeaseTransition, MaintenanceTicket, Payment, PaymentStatus, PaymentTransition, Property,
        TicketStatus, Unit,
    },
    error::{AppError, AppResult},
};

#[derive(Default)]
struct Tables {
    properties: HashMap<Uuid, Property>,
    units: HashMap<Uuid, Unit>,
    applications: HashMap<Uuid, Application>,
    leases: HashMap<Uuid, Lease>,
    invoices: HashMap<Uuid, Invoice>,
    payments: HashMap<Uuid, Payment>,
    tickets: HashMap<Uuid, MaintenanceTicket>,
    audit_logs: Vec<AuditEntry>,
}

impl Tables {
    fn landlord_of(&self, unit_id: Uuid) -> Option<Uuid> {
        let unit = self.units.get(&unit_id)?;
        self.properties
            .get(&unit.property_id)
            .map(|property| property.landlord_id)
    }
}

/// Process-local store with the same uniqueness and guarded-update rules as
/// the PostgreSQL schema. Every call holds one lock, so each is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.tables.read().await.audit_logs.clone()
    }
}

fn not_found(entity: &str) -> AppError {
    AppError::NotFound(format!("{entity} record not found."))
}

fn take<T>(mut rows: Vec<T>, limit: i64) -> Vec<T> {
    rows.truncate(clamp_limit(limit) as usize);
    rows
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn insert_property(&self, property: &Property) -> AppResult<Property> {
        let mut tables = self.tables.write().await;
        tables.properties.insert(property.id, property.clone());
        Ok(property.clone())
    }

    async fn get_property(&self, id: Uuid) -> AppResult<Property> {
        self.tables
            .read()
            .await
            .properties
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Property"))
    }

    async fn list_properties(&self, landlord_id: Uuid) -> AppResult<Vec<Property>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Property> = tables
            .properties
            .values()
            .filter(|property| property.landlord_id == landlord_id)
            .cloned()
            .collect();
        rows.sort_by_key(|property| property.created_at);
        Ok(take(rows, 0))
    }

    async fn insert_unit(&self, unit: &Unit) -> AppResult<Unit> {
        let mut tables = self.tables.write().await;
        if !tables.properties.contains_key(&unit.property_id) {
            return Err(not_found("Property"));
        }
        tables.units.insert(unit.id, unit.clone());
        Ok(unit.clone())
    }

    async fn get_unit(&self, id: Uuid) -> AppResult<Unit> {
        self.tables
            .read()
            .await
            .units
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Unit"))
    }

    async fn list_units(&self, property_id: Uuid) -> AppResult<Vec<Unit>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Unit> = tables
            .units
            .values()
            .filter(|unit| unit.property_id == property_id)
            .cloned()
            .collect();
        rows.sort_by(|left, right| left.unit_number.cmp(&right.unit_number));
        Ok(take(rows, 0))
    }

    async fn update_unit(&self, unit: &Unit) -> AppResult<Unit> {
        let mut tables = self.tables.write().await;
        let stored = tables.units.get_mut(&unit.id).ok_or_else(|| not_found("Unit"))?;
        stored.status = unit.status;
        stored.is_archived = unit.is_archived;
        stored.updated_at = unit.updated_at;
        Ok(stored.clone())
    }

    async fn unit_landlord(&self, unit_id: Uuid) -> AppResult<Option<Uuid>> {
        Ok(self.tables.read().await.landlord_of(unit_id))
    }

    async fn insert_application(&self, application: &Application) -> AppResult<Application> {
        let mut tables = self.tables.write().await;
        let duplicate = application.status == ApplicationStatus::Pending
            && tables.applications.values().any(|existing| {
                existing.status == ApplicationStatus::Pending
                    && existing.unit_id == application.unit_id
                    && existing.tenant_id == application.tenant_id
            });
        if duplicate {
            return Err(AppError::Conflict(
                "A pending application for this unit already exists.".to_string(),
            ));
        }
        tables
            .applications
            .insert(application.id, application.clone());
        Ok(application.clone())
    }

    async fn get_application(&self, id: Uuid) -> AppResult<Application> {
        self.tables
            .read()
            .await
            .applications
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Application"))
    }

    async fn list_applications(&self, filter: &ApplicationFilter) -> AppResult<Vec<Application>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Application> = tables
            .applications
            .values()
            .filter(|row| filter.tenant_id.is_none_or(|id| row.tenant_id == id))
            .filter(|row| filter.unit_id.is_none_or(|id| row.unit_id == id))
            .filter(|row| {
                filter
                    .landlord_id
                    .is_none_or(|id| tables.landlord_of(row.unit_id) == Some(id))
            })
            .filter(|row| filter.statuses.is_empty() || filter.statuses.contains(&row.status))
            .cloned()
            .collect();
        rows.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(take(rows, filter.limit))
    }

    async fn transition_application(
        &self,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Application>> {
        let mut tables = self.tables.write().await;
        let Some(application) = tables.applications.get_mut(&id) else {
            return Ok(None);
        };
        if application.status != from {
            return Ok(None);
        }
        application.status = to;
        application.decided_at = Some(at);
        application.updated_at = at;
        Ok(Some(application.clone()))
    }

    async fn delete_application(&self, id: Uuid, expected: ApplicationStatus) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        let matches = tables
            .applications
            .get(&id)
            .is_some_and(|application| application.status == expected);
        if matches {
            tables.applications.remove(&id);
        }
        Ok(matches)
    }

    async fn create_lease(&self, lease: &Lease) -> AppResult<Lease> {
        let mut tables = self.tables.write().await;
        let held = tables
            .leases
            .values()
            .any(|existing| existing.unit_id == lease.unit_id && existing.status.holds_unit());
        if held {
            return Err(AppError::Conflict(
                "Unit already has a pending or active lease.".to_string(),
            ));
        }

        if let Some(application_id) = lease.application_id {
            let application = tables
                .applications
                .get_mut(&application_id)
                .ok_or_else(|| not_found("Application"))?;
            match application.status {
                ApplicationStatus::Pending => {
                    application.status = ApplicationStatus::Approved;
                    application.decided_at = Some(lease.created_at);
                    application.updated_at = lease.created_at;
                }
                ApplicationStatus::Approved => {}
                other => {
                    return Err(AppError::InvalidState(format!(
                        "Cannot create a lease from a {} application.",
                        other.as_str()
                    )));
                }
            }
        }

        tables.leases.insert(lease.id, lease.clone());
        Ok(lease.clone())
    }

    async fn get_lease(&self, id: Uuid) -> AppResult<Lease> {
        self.tables
            .read()
            .await
            .leases
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Lease"))
    }

    async fn list_leases(&self, filter: &LeaseFilter) -> AppResult<Vec<Lease>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Lease> = tables
            .leases
            .values()
            .filter(|row| filter.landlord_id.is_none_or(|id| row.landlord_id == id))
            .filter(|row| filter.tenant_id.is_none_or(|id| row.tenant_id == id))
            .filter(|row| filter.unit_id.is_none_or(|id| row.unit_id == id))
            .filter(|row| filter.statuses.is_empty() || filter.statuses.contains(&row.status))
            .filter(|row| {
                filter
                    .ends_before
                    .is_none_or(|day| row.end_date.is_some_and(|end| end < day))
            })
            .cloned()
            .collect();
        rows.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(take(rows, filter.limit))
    }

    async fn transition_lease(
        &self,
        id: Uuid,
        transition: &LeaseTransition,
    ) -> AppResult<Option<Lease>> {
        let mut tables = self.tables.write().await;
        let Some(lease) = tables.leases.get(&id) else {
            return Ok(None);
        };
        if !transition.applies_to(lease) {
            return Ok(None);
        }
        let next = transition.apply(lease);
        if let Some(unit) = tables.units.get_mut(&next.unit_id) {
            unit.status = transition.unit_status;
            unit.updated_at = transition.at;
        }
        tables.leases.insert(id, next.clone());
        Ok(Some(next))
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> AppResult<Invoice> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.invoices.values().any(|existing| {
            existing.lease_id == invoice.lease_id && existing.period() == invoice.period()
        });
        if duplicate {
            return Err(AppError::Conflict(
                "An invoice for this lease and period already exists.".to_string(),
            ));
        }
        tables.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice.clone())
    }

    async fn get_invoice(&self, id: Uuid) -> AppResult<Invoice> {
        self.tables
            .read()
            .await
            .invoices
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Invoice"))
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> AppResult<Vec<Invoice>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Invoice> = tables
            .invoices
            .values()
            .filter(|row| filter.lease_id.is_none_or(|id| row.lease_id == id))
            .filter(|row| filter.statuses.is_empty() || filter.statuses.contains(&row.status))
            .filter(|row| filter.due_before.is_none_or(|day| row.due_date < day))
            .cloned()
            .collect();
        rows.sort_by_key(|invoice| invoice.due_date);
        Ok(take(rows, filter.limit))
    }

    async fn save_invoice_totals(
        &self,
        id: Uuid,
        totals: &InvoiceTotals,
        at: DateTime<Utc>,
    ) -> AppResult<Invoice> {
        let mut tables = self.tables.write().await;
        let invoice = tables
            .invoices
            .get_mut(&id)
            .ok_or_else(|| not_found("Invoice"))?;
        if invoice.status != InvoiceStatus::Void {
            *invoice = invoice.with_totals(*totals, at);
        }
        Ok(invoice.clone())
    }

    async fn void_invoice(
        &self,
        id: Uuid,
        expected: &[InvoiceStatus],
        at: DateTime<Utc>,
    ) -> AppResult<Option<Invoice>> {
        let mut tables = self.tables.write().await;
        let Some(invoice) = tables.invoices.get_mut(&id) else {
            return Ok(None);
        };
        if !expected.contains(&invoice.status) {
            return Ok(None);
        }
        invoice.status = InvoiceStatus::Void;
        invoice.updated_at = at;
        Ok(Some(invoice.clone()))
    }

    async fn insert_payment(&self, payment: &Payment) -> AppResult<Payment> {
        let mut tables = self.tables.write().await;
        if let Some(reference) = payment.provider_ref.as_deref() {
            let duplicate = tables
                .payments
                .values()
                .any(|existing| existing.provider_ref.as_deref() == Some(reference));
            if duplicate {
                return Err(AppError::Conflict(
                    "A payment with this provider reference already exists.".to_string(),
                ));
            }
        }
        tables.payments.insert(payment.id, payment.clone());
        Ok(payment.clone())
    }

    async fn get_payment(&self, id: Uuid) -> AppResult<Payment> {
        self.tables
            .read()
            .await
            .payments
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Payment"))
    }

    async fn list_payments(&self, invoice_id: Uuid) -> AppResult<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Payment> = tables
            .payments
            .values()
            .filter(|payment| payment.invoice_id == invoice_id)
            .cloned()
            .collect();
        rows.sort_by_key(|payment| payment.created_at);
        Ok(take(rows, 0))
    }

    async fn sum_succeeded_payments(&self, invoice_id: Uuid) -> AppResult<Decimal> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .filter(|payment| {
                payment.invoice_id == invoice_id && payment.status == PaymentStatus::Succeeded
            })
            .map(|payment| payment.amount)
            .sum())
    }

    async fn find_payment_by_provider_ref(&self, provider_ref: &str) -> AppResult<Option<Payment>> {
        Ok(self
            .tables
            .read()
            .await
            .payments
            .values()
            .find(|payment| payment.provider_ref.as_deref() == Some(provider_ref))
            .cloned())
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        transition: &PaymentTransition,
    ) -> AppResult<Option<Payment>> {
        let mut tables = self.tables.write().await;
        let Some(payment) = tables.payments.get_mut(&id) else {
            return Ok(None);
        };
        if payment.status != transition.from {
            return Ok(None);
        }
        *payment = transition.apply(payment);
        Ok(Some(payment.clone()))
    }

    async fn insert_ticket_within_capacity(
        &self,
        ticket: &MaintenanceTicket,
        capacity: usize,
    ) -> AppResult<Option<MaintenanceTicket>> {
        let mut tables = self.tables.write().await;
        let open = tables
            .tickets
            .values()
            .filter(|existing| existing.unit_id == ticket.unit_id && existing.status.is_active())
            .count();
        if open >= capacity {
            return Ok(None);
        }
        tables.tickets.insert(ticket.id, ticket.clone());
        Ok(Some(ticket.clone()))
    }

    async fn get_ticket(&self, id: Uuid) -> AppResult<MaintenanceTicket> {
        self.tables
            .read()
            .await
            .tickets
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Maintenance ticket"))
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> AppResult<Vec<MaintenanceTicket>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<MaintenanceTicket> = tables
            .tickets
            .values()
            .filter(|row| filter.unit_id.is_none_or(|id| row.unit_id == id))
            .filter(|row| filter.created_by.is_none_or(|id| row.created_by == id))
            .filter(|row| filter.assigned_to.is_none_or(|id| row.assigned_to == Some(id)))
            .filter(|row| filter.statuses.is_empty() || filter.statuses.contains(&row.status))
            .cloned()
            .collect();
        rows.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(take(rows, filter.limit))
    }

    async fn update_ticket(
        &self,
        ticket: &MaintenanceTicket,
        expected: TicketStatus,
    ) -> AppResult<Option<MaintenanceTicket>> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.tickets.get_mut(&ticket.id) else {
            return Ok(None);
        };
        if stored.status != expected {
            return Ok(None);
        }
        *stored = ticket.clone();
        Ok(Some(ticket.clone()))
    }

    async fn insert_audit_log(&self, entry: &AuditEntry) -> AppResult<()> {
        self.tables.write().await.audit_logs.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::MemoryStore;
    use crate::{
        domain::{
            Application, ApplicationStatus, Lease, LeaseDraft, LeaseStatus, LeaseTransition,
            MaintenanceTicket, NewTicket, Property, Unit, UnitStatus,
        },
        error::AppError,
        repository::{ApplicationFilter, Store},
    };

    async fn seed_unit(store: &MemoryStore, landlord_id: Uuid) -> Unit {
        let now = Utc::now();
        let property = Property {
            id: Uuid::new_v4(),
            landlord_id,
            name: "Maple Court".to_string(),
            address_line1: None,
            city: None,
            created_at: now,
        };
        store.insert_property(&property).await.expect("property");
        let unit = Unit {
            id: Uuid::new_v4(),
            property_id: property.id,
            unit_number: "101".to_string(),
            bedrooms: 2,
            bathrooms: dec!(1),
            rent_amount: dec!(1500),
            deposit_amount: dec!(1500),
            status: UnitStatus::Available,
            is_archived: false,
            created_at: now,
            updated_at: now,
        };
        store.insert_unit(&unit).await.expect("unit")
    }

    #[tokio::test]
    async fn rejects_second_pending_application_for_same_unit() {
        let store = MemoryStore::new();
        let unit = seed_unit(&store, Uuid::new_v4()).await;
        let tenant = Uuid::new_v4();

        let first = Application::new(tenant, unit.id, None, vec![], Utc::now());
        store.insert_application(&first).await.expect("first");
        let second = Application::new(tenant, unit.id, None, vec![], Utc::now());
        assert!(matches!(
            store.insert_application(&second).await,
            Err(AppError::Conflict(_))
        ));

        let other_tenant = Application::new(Uuid::new_v4(), unit.id, None, vec![], Utc::now());
        assert!(store.insert_application(&other_tenant).await.is_ok());
    }

    #[tokio::test]
    async fn lists_applications_for_landlord_units_only() {
        let store = MemoryStore::new();
        let landlord = Uuid::new_v4();
        let mine = seed_unit(&store, landlord).await;
        let theirs = seed_unit(&store, Uuid::new_v4()).await;
        for unit in [&mine, &theirs] {
            let application = Application::new(Uuid::new_v4(), unit.id, None, vec![], Utc::now());
            store.insert_application(&application).await.expect("insert");
        }

        let rows = store
            .list_applications(&ApplicationFilter {
                landlord_id: Some(landlord),
                ..ApplicationFilter::default()
            })
            .await
            .expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].unit_id, mine.id);
    }

    #[tokio::test]
    async fn guarded_transition_applies_once() {
        let store = MemoryStore::new();
        let unit = seed_unit(&store, Uuid::new_v4()).await;
        let application = Application::new(Uuid::new_v4(), unit.id, None, vec![], Utc::now());
        store.insert_application(&application).await.expect("insert");

        let now = Utc::now();
        let first = store
            .transition_application(
                application.id,
                ApplicationStatus::Pending,
                ApplicationStatus::Approved,
                now,
            )
            .await
            .expect("transition");
        assert!(first.is_some());
        let second = store
            .transition_application(
                application.id,
                ApplicationStatus::Pending,
                ApplicationStatus::Rejected,
                now,
            )
            .await
            .expect("transition");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn lease_creation_approves_application_and_holds_unit() {
        let store = MemoryStore::new();
        let landlord = Uuid::new_v4();
        let unit = seed_unit(&store, landlord).await;
        let application = Application::new(Uuid::new_v4(), unit.id, None, vec![], Utc::now());
        store.insert_application(&application).await.expect("insert");

        let lease = Lease::from_application(
            &application,
            &unit,
            landlord,
            LeaseDraft::default(),
            Utc::now(),
        )
        .expect("lease");
        store.create_lease(&lease).await.expect("create");
        let stored = store.get_application(application.id).await.expect("get");
        assert_eq!(stored.status, ApplicationStatus::Approved);

        let again = Lease::from_application(
            &stored,
            &unit,
            landlord,
            LeaseDraft::default(),
            Utc::now(),
        )
        .expect("lease");
        assert!(matches!(
            store.create_lease(&again).await,
            Err(AppError::Conflict(_))
        ));

        let active = store
            .transition_lease(lease.id, &LeaseTransition::respond(
                crate::domain::LeaseResponse::Accept,
                Utc::now(),
            ))
            .await
            .expect("respond")
            .expect("applied");
        assert_eq!(active.status, LeaseStatus::Active);
        let unit = store.get_unit(unit.id).await.expect("unit");
        assert_eq!(unit.status, UnitStatus::Occupied);
    }

    #[tokio::test]
    async fn ticket_capacity_counts_only_active_tickets() {
        let store = MemoryStore::new();
        let unit = seed_unit(&store, Uuid::new_v4()).await;
        let tenant = Uuid::new_v4();
        for _ in 0..2 {
            let ticket = MaintenanceTicket::open(unit.id, tenant, NewTicket::default(), Utc::now());
            assert!(store
                .insert_ticket_within_capacity(&ticket, 2)
                .await
                .expect("insert")
                .is_some());
        }
        let third = MaintenanceTicket::open(unit.id, tenant, NewTicket::default(), Utc::now());
        assert!(store
            .insert_ticket_within_capacity(&third, 2)
            .await
            .expect("insert")
            .is_none());
    }
}
