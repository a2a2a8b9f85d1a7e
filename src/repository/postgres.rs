use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    clamp_limit,
    table_service::{
        count_rows, create_row, delete_row, from_row, get_row, list_rows, map_db_error, to_row,
        update_row, Filter,
    },
    ApplicationFilter, AuditEntry, InvoiceFilter, LeaseFilter, Store, TicketFilter,
};
use crate::{
    domain::{
        Application, ApplicationStatus, Invoice, InvoiceStatus, InvoiceTotals, Lease, LeaseStatus,
        LeaseTransition, MaintenanceTicket, Payment, PaymentStatus, PaymentTransition, Property,
        TicketStatus, Unit,
    },
    error::{AppError, AppResult},
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn landlord_unit_ids(&self, landlord_id: Uuid) -> AppResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT u.id FROM units u JOIN properties p ON p.id = u.property_id WHERE p.landlord_id = $1",
        )
        .bind(landlord_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)
    }
}

fn decode_all<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> AppResult<Vec<T>> {
    rows.into_iter().map(from_row).collect()
}

fn patch(pairs: Vec<(&str, Value)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn lease_transition_patch(transition: &LeaseTransition) -> Map<String, Value> {
    let mut fields = vec![
        ("status", json!(transition.to)),
        ("updated_at", json!(transition.at)),
    ];
    if transition.to == LeaseStatus::Active {
        fields.push(("accepted_at", json!(transition.at)));
    }
    if transition.to.is_terminal() {
        fields.push(("ended_at", json!(transition.at)));
    }
    patch(fields)
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_db_error)
    }

    async fn insert_property(&self, property: &Property) -> AppResult<Property> {
        from_row(create_row(&self.pool, "properties", &to_row(property)?).await?)
    }

    async fn get_property(&self, id: Uuid) -> AppResult<Property> {
        from_row(get_row(&self.pool, "properties", id).await?)
    }

    async fn list_properties(&self, landlord_id: Uuid) -> AppResult<Vec<Property>> {
        let rows = list_rows(
            &self.pool,
            "properties",
            &[Filter::Uuid("landlord_id", landlord_id)],
            "created_at",
            true,
            clamp_limit(0),
        )
        .await?;
        decode_all(rows)
    }

    async fn insert_unit(&self, unit: &Unit) -> AppResult<Unit> {
        from_row(create_row(&self.pool, "units", &to_row(unit)?).await?)
    }

    async fn get_unit(&self, id: Uuid) -> AppResult<Unit> {
        from_row(get_row(&self.pool, "units", id).await?)
    }

    async fn list_units(&self, property_id: Uuid) -> AppResult<Vec<Unit>> {
        let rows = list_rows(
            &self.pool,
            "units",
            &[Filter::Uuid("property_id", property_id)],
            "unit_number",
            true,
            clamp_limit(0),
        )
        .await?;
        decode_all(rows)
    }

    async fn update_unit(&self, unit: &Unit) -> AppResult<Unit> {
        let fields = patch(vec![
            ("status", json!(unit.status)),
            ("is_archived", json!(unit.is_archived)),
            ("updated_at", json!(unit.updated_at)),
        ]);
        update_row(&self.pool, "units", unit.id, &fields, None)
            .await?
            .ok_or_else(|| AppError::NotFound("Unit record not found.".to_string()))
            .and_then(from_row)
    }

    async fn unit_landlord(&self, unit_id: Uuid) -> AppResult<Option<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT p.landlord_id FROM units u JOIN properties p ON p.id = u.property_id WHERE u.id = $1",
        )
        .bind(unit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)
    }

    async fn insert_application(&self, application: &Application) -> AppResult<Application> {
        from_row(create_row(&self.pool, "applications", &to_row(application)?).await?)
    }

    async fn get_application(&self, id: Uuid) -> AppResult<Application> {
        from_row(get_row(&self.pool, "applications", id).await?)
    }

    async fn list_applications(&self, filter: &ApplicationFilter) -> AppResult<Vec<Application>> {
        let mut filters = Vec::new();
        if let Some(tenant_id) = filter.tenant_id {
            filters.push(Filter::Uuid("tenant_id", tenant_id));
        }
        if let Some(unit_id) = filter.unit_id {
            filters.push(Filter::Uuid("unit_id", unit_id));
        }
        if let Some(landlord_id) = filter.landlord_id {
            let unit_ids = self.landlord_unit_ids(landlord_id).await?;
            if unit_ids.is_empty() {
                return Ok(Vec::new());
            }
            filters.push(Filter::UuidIn("unit_id", unit_ids));
        }
        let statuses: Vec<&str> = filter.statuses.iter().map(|status| status.as_str()).collect();
        filters.push(Filter::statuses(&statuses));

        let rows = list_rows(
            &self.pool,
            "applications",
            &filters,
            "created_at",
            false,
            clamp_limit(filter.limit),
        )
        .await?;
        decode_all(rows)
    }

    async fn transition_application(
        &self,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Application>> {
        let fields = patch(vec![
            ("status", json!(to)),
            ("decided_at", json!(at)),
            ("updated_at", json!(at)),
        ]);
        let guard = Filter::statuses(&[from.as_str()]);
        match update_row(&self.pool, "applications", id, &fields, Some(&guard)).await? {
            Some(row) => Ok(Some(from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn delete_application(&self, id: Uuid, expected: ApplicationStatus) -> AppResult<bool> {
        let guard = Filter::statuses(&[expected.as_str()]);
        delete_row(&self.pool, "applications", id, Some(&guard)).await
    }

    async fn create_lease(&self, lease: &Lease) -> AppResult<Lease> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        if let Some(application_id) = lease.application_id {
            let status = sqlx::query_scalar::<_, String>(
                "SELECT status FROM applications WHERE id = $1 FOR UPDATE",
            )
            .bind(application_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| AppError::NotFound("Application record not found.".to_string()))?;

            match status.as_str() {
                "PENDING" => {
                    let fields = patch(vec![
                        ("status", json!(ApplicationStatus::Approved)),
                        ("decided_at", json!(lease.created_at)),
                        ("updated_at", json!(lease.created_at)),
                    ]);
                    update_row(&mut *tx, "applications", application_id, &fields, None).await?;
                }
                "APPROVED" => {}
                other => {
                    return Err(AppError::InvalidState(format!(
                        "Cannot create a lease from a {other} application."
                    )));
                }
            }
        }

        let row = create_row(&mut *tx, "leases", &to_row(lease)?).await?;
        tx.commit().await.map_err(map_db_error)?;
        from_row(row)
    }

    async fn get_lease(&self, id: Uuid) -> AppResult<Lease> {
        from_row(get_row(&self.pool, "leases", id).await?)
    }

    async fn list_leases(&self, filter: &LeaseFilter) -> AppResult<Vec<Lease>> {
        let mut filters = Vec::new();
        if let Some(landlord_id) = filter.landlord_id {
            filters.push(Filter::Uuid("landlord_id", landlord_id));
        }
        if let Some(tenant_id) = filter.tenant_id {
            filters.push(Filter::Uuid("tenant_id", tenant_id));
        }
        if let Some(unit_id) = filter.unit_id {
            filters.push(Filter::Uuid("unit_id", unit_id));
        }
        if let Some(ends_before) = filter.ends_before {
            filters.push(Filter::DateBefore("end_date", ends_before));
        }
        let statuses: Vec<&str> = filter.statuses.iter().map(|status| status.as_str()).collect();
        filters.push(Filter::statuses(&statuses));

        let rows = list_rows(
            &self.pool,
            "leases",
            &filters,
            "created_at",
            false,
            clamp_limit(filter.limit),
        )
        .await?;
        decode_all(rows)
    }

    async fn transition_lease(
        &self,
        id: Uuid,
        transition: &LeaseTransition,
    ) -> AppResult<Option<Lease>> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        let guard = Filter::statuses(&[transition.from.as_str()]);
        let Some(row) = update_row(
            &mut *tx,
            "leases",
            id,
            &lease_transition_patch(transition),
            Some(&guard),
        )
        .await?
        else {
            return Ok(None);
        };
        let lease: Lease = from_row(row)?;

        let unit_fields = patch(vec![
            ("status", json!(transition.unit_status)),
            ("updated_at", json!(transition.at)),
        ]);
        update_row(&mut *tx, "units", lease.unit_id, &unit_fields, None).await?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(Some(lease))
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> AppResult<Invoice> {
        from_row(create_row(&self.pool, "invoices", &to_row(invoice)?).await?)
    }

    async fn get_invoice(&self, id: Uuid) -> AppResult<Invoice> {
        from_row(get_row(&self.pool, "invoices", id).await?)
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> AppResult<Vec<Invoice>> {
        let mut filters = Vec::new();
        if let Some(lease_id) = filter.lease_id {
            filters.push(Filter::Uuid("lease_id", lease_id));
        }
        if let Some(due_before) = filter.due_before {
            filters.push(Filter::DateBefore("due_date", due_before));
        }
        let statuses: Vec<&str> = filter.statuses.iter().map(|status| status.as_str()).collect();
        filters.push(Filter::statuses(&statuses));

        let rows = list_rows(
            &self.pool,
            "invoices",
            &filters,
            "due_date",
            true,
            clamp_limit(filter.limit),
        )
        .await?;
        decode_all(rows)
    }

    async fn save_invoice_totals(
        &self,
        id: Uuid,
        totals: &InvoiceTotals,
        at: DateTime<Utc>,
    ) -> AppResult<Invoice> {
        let fields = patch(vec![
            ("amount_paid", json!(totals.amount_paid)),
            ("balance", json!(totals.balance)),
            ("status", json!(totals.status)),
            ("updated_at", json!(at)),
        ]);
        // A concurrent void wins over a recompute.
        let guard = Filter::statuses(&[
            InvoiceStatus::Draft.as_str(),
            InvoiceStatus::Issued.as_str(),
            InvoiceStatus::PartiallyPaid.as_str(),
            InvoiceStatus::Paid.as_str(),
            InvoiceStatus::Overdue.as_str(),
        ]);
        match update_row(&self.pool, "invoices", id, &fields, Some(&guard)).await? {
            Some(row) => from_row(row),
            None => self.get_invoice(id).await,
        }
    }

    async fn void_invoice(
        &self,
        id: Uuid,
        expected: &[InvoiceStatus],
        at: DateTime<Utc>,
    ) -> AppResult<Option<Invoice>> {
        let fields = patch(vec![
            ("status", json!(InvoiceStatus::Void)),
            ("updated_at", json!(at)),
        ]);
        let statuses: Vec<&str> = expected.iter().map(|status| status.as_str()).collect();
        let guard = Filter::statuses(&statuses);
        match update_row(&self.pool, "invoices", id, &fields, Some(&guard)).await? {
            Some(row) => Ok(Some(from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn insert_payment(&self, payment: &Payment) -> AppResult<Payment> {
        from_row(create_row(&self.pool, "payments", &to_row(payment)?).await?)
    }

    async fn get_payment(&self, id: Uuid) -> AppResult<Payment> {
        from_row(get_row(&self.pool, "payments", id).await?)
    }

    async fn list_payments(&self, invoice_id: Uuid) -> AppResult<Vec<Payment>> {
        let rows = list_rows(
            &self.pool,
            "payments",
            &[Filter::Uuid("invoice_id", invoice_id)],
            "created_at",
            true,
            clamp_limit(0),
        )
        .await?;
        decode_all(rows)
    }

    async fn sum_succeeded_payments(&self, invoice_id: Uuid) -> AppResult<Decimal> {
        sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE invoice_id = $1 AND status = $2",
        )
        .bind(invoice_id)
        .bind(PaymentStatus::Succeeded.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }

    async fn find_payment_by_provider_ref(&self, provider_ref: &str) -> AppResult<Option<Payment>> {
        let rows = list_rows(
            &self.pool,
            "payments",
            &[Filter::Text("provider_ref", provider_ref.to_string())],
            "created_at",
            true,
            1,
        )
        .await?;
        rows.into_iter().next().map(from_row).transpose()
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        transition: &PaymentTransition,
    ) -> AppResult<Option<Payment>> {
        let mut fields = vec![
            ("status", json!(transition.to)),
            ("updated_at", json!(transition.at)),
        ];
        if transition.to == PaymentStatus::Succeeded {
            fields.push(("paid_at", json!(transition.at)));
        }
        let guard = Filter::statuses(&[transition.from.as_str()]);
        match update_row(&self.pool, "payments", id, &patch(fields), Some(&guard)).await? {
            Some(row) => Ok(Some(from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn insert_ticket_within_capacity(
        &self,
        ticket: &MaintenanceTicket,
        capacity: usize,
    ) -> AppResult<Option<MaintenanceTicket>> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // Serializes concurrent ticket creation for the same unit.
        sqlx::query("SELECT id FROM units WHERE id = $1 FOR UPDATE")
            .bind(ticket.unit_id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        let active: Vec<&str> = TicketStatus::ACTIVE
            .iter()
            .map(|status| status.as_str())
            .collect();
        let open = count_rows(
            &mut *tx,
            "maintenance_tickets",
            &[
                Filter::Uuid("unit_id", ticket.unit_id),
                Filter::statuses(&active),
            ],
        )
        .await?;
        if open >= capacity as i64 {
            return Ok(None);
        }

        let row = create_row(&mut *tx, "maintenance_tickets", &to_row(ticket)?).await?;
        tx.commit().await.map_err(map_db_error)?;
        Ok(Some(from_row(row)?))
    }

    async fn get_ticket(&self, id: Uuid) -> AppResult<MaintenanceTicket> {
        from_row(get_row(&self.pool, "maintenance_tickets", id).await?)
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> AppResult<Vec<MaintenanceTicket>> {
        let mut filters = Vec::new();
        if let Some(unit_id) = filter.unit_id {
            filters.push(Filter::Uuid("unit_id", unit_id));
        }
        if let Some(created_by) = filter.created_by {
            filters.push(Filter::Uuid("created_by", created_by));
        }
        if let Some(assigned_to) = filter.assigned_to {
            filters.push(Filter::Uuid("assigned_to", assigned_to));
        }
        let statuses: Vec<&str> = filter.statuses.iter().map(|status| status.as_str()).collect();
        filters.push(Filter::statuses(&statuses));

        let rows = list_rows(
            &self.pool,
            "maintenance_tickets",
            &filters,
            "created_at",
            false,
            clamp_limit(filter.limit),
        )
        .await?;
        decode_all(rows)
    }

    async fn update_ticket(
        &self,
        ticket: &MaintenanceTicket,
        expected: TicketStatus,
    ) -> AppResult<Option<MaintenanceTicket>> {
        let mut fields = to_row(ticket)?;
        fields.remove("id");
        fields.remove("created_at");
        let guard = Filter::statuses(&[expected.as_str()]);
        match update_row(
            &self.pool,
            "maintenance_tickets",
            ticket.id,
            &fields,
            Some(&guard),
        )
        .await?
        {
            Some(row) => Ok(Some(from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn insert_audit_log(&self, entry: &AuditEntry) -> AppResult<()> {
        create_row(&self.pool, "audit_logs", &to_row(entry)?)
            .await
            .map(|_| ())
    }
}
