use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{
    audit::{snapshot, write_audit_log},
    leases::get_for_party,
};
use crate::{
    domain::{BillingPeriod, Invoice, InvoiceStatus, Lease},
    error::{AppError, AppResult},
    repository::{InvoiceFilter, MAX_LIST_LIMIT},
    schemas::{CreateInvoiceInput, ListInvoicesQuery},
    state::AppState,
};

const VOIDABLE: [InvoiceStatus; 3] = [
    InvoiceStatus::Draft,
    InvoiceStatus::Issued,
    InvoiceStatus::Overdue,
];

async fn billable_lease(state: &AppState, landlord_id: Uuid, lease_id: Uuid) -> AppResult<Lease> {
    let lease = state.store.get_lease(lease_id).await?;
    lease.ensure_landlord(landlord_id)?;
    lease.ensure_active()?;
    Ok(lease)
}

/// Manual invoice. The period is the month of the due date, which defaults
/// to the lease due day in the current month.
pub async fn create(
    state: &AppState,
    landlord_id: Uuid,
    input: CreateInvoiceInput,
    now: DateTime<Utc>,
) -> AppResult<Invoice> {
    let lease = billable_lease(state, landlord_id, input.lease_id).await?;
    let due_date = match input.due_date {
        Some(due_date) => due_date,
        None => lease.due_date_for(BillingPeriod::containing(now.date_naive()))?,
    };
    let invoice = Invoice::issue(
        &lease,
        BillingPeriod::containing(due_date),
        due_date,
        input.line_items,
        now,
    )?;
    store_new_invoice(state, landlord_id, invoice, now).await
}

/// Invoice for the calendar month after `now`, billed at the lease rent.
pub async fn generate_next_month(
    state: &AppState,
    landlord_id: Uuid,
    lease_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<Invoice> {
    let lease = billable_lease(state, landlord_id, lease_id).await?;
    let period = BillingPeriod::following(now.date_naive());
    let due_date = lease.due_date_for(period)?;
    let invoice = Invoice::issue(&lease, period, due_date, Vec::new(), now)?;
    store_new_invoice(state, landlord_id, invoice, now).await
}

async fn store_new_invoice(
    state: &AppState,
    landlord_id: Uuid,
    invoice: Invoice,
    now: DateTime<Utc>,
) -> AppResult<Invoice> {
    let created = state.store.insert_invoice(&invoice).await?;
    tracing::info!(
        invoice_id = %created.id,
        lease_id = %created.lease_id,
        period_year = created.period_year,
        period_month = created.period_month,
        amount_due = %created.amount_due,
        "Invoice issued"
    );
    write_audit_log(
        state,
        Some(landlord_id),
        "create",
        "invoices",
        created.id,
        None,
        snapshot(&created),
        now,
    )
    .await;
    Ok(created)
}

/// Re-derives paid amount, balance and status from the invoice's payments.
/// Writes only when something changed, so repeated calls are no-ops.
pub async fn recompute_status(
    state: &AppState,
    invoice_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<Invoice> {
    let invoice = state.store.get_invoice(invoice_id).await?;
    let amount_paid = state.store.sum_succeeded_payments(invoice_id).await?;
    let totals = invoice.totals_for_paid(amount_paid, now.date_naive());

    if totals.amount_paid == invoice.amount_paid
        && totals.balance == invoice.balance
        && totals.status == invoice.status
    {
        return Ok(invoice);
    }

    let updated = state
        .store
        .save_invoice_totals(invoice_id, &totals, now)
        .await?;
    if updated.status != invoice.status {
        tracing::info!(
            invoice_id = %invoice_id,
            from = invoice.status.as_str(),
            to = updated.status.as_str(),
            balance = %updated.balance,
            "Invoice status recomputed"
        );
    }
    Ok(updated)
}

/// Recompute on behalf of a lease party.
pub async fn refresh_for_party(
    state: &AppState,
    user_id: Uuid,
    invoice_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<Invoice> {
    let invoice = state.store.get_invoice(invoice_id).await?;
    get_for_party(state, user_id, invoice.lease_id).await?;
    recompute_status(state, invoice_id, now).await
}

pub async fn void(
    state: &AppState,
    landlord_id: Uuid,
    invoice_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<Invoice> {
    let invoice = state.store.get_invoice(invoice_id).await?;
    let lease = state.store.get_lease(invoice.lease_id).await?;
    lease.ensure_landlord(landlord_id)?;
    invoice.ensure_voidable()?;

    let updated = state
        .store
        .void_invoice(invoice_id, &VOIDABLE, now)
        .await?
        .ok_or_else(|| AppError::InvalidState("Invoice can no longer be voided.".to_string()))?;

    tracing::info!(invoice_id = %invoice_id, "Invoice voided");
    write_audit_log(
        state,
        Some(landlord_id),
        "void",
        "invoices",
        invoice_id,
        snapshot(&invoice),
        snapshot(&updated),
        now,
    )
    .await;
    Ok(updated)
}

pub async fn list_for_lease(
    state: &AppState,
    user_id: Uuid,
    lease_id: Uuid,
    query: ListInvoicesQuery,
) -> AppResult<Vec<Invoice>> {
    get_for_party(state, user_id, lease_id).await?;
    state
        .store
        .list_invoices(&InvoiceFilter {
            lease_id: Some(lease_id),
            statuses: query.status.into_iter().collect(),
            limit: MAX_LIST_LIMIT,
            ..InvoiceFilter::default()
        })
        .await
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OverdueRunResult {
    pub checked: u32,
    pub marked_overdue: u32,
    pub errors: u32,
}

/// Recomputes unpaid invoices whose due date has passed.
pub async fn refresh_overdue_invoices(
    state: &AppState,
    now: DateTime<Utc>,
) -> AppResult<OverdueRunResult> {
    let mut result = OverdueRunResult::default();
    let mut seen = HashSet::new();
    // Refreshed invoices leave the candidate set, so each batch re-queries
    // from the start until a short batch or one with nothing new.
    loop {
        let candidates = state
            .store
            .list_invoices(&InvoiceFilter {
                statuses: vec![InvoiceStatus::Draft, InvoiceStatus::Issued],
                due_before: Some(now.date_naive()),
                limit: MAX_LIST_LIMIT,
                ..InvoiceFilter::default()
            })
            .await?;
        let exhausted = (candidates.len() as i64) < MAX_LIST_LIMIT;

        let mut fresh = 0usize;
        for invoice in candidates {
            if !seen.insert(invoice.id) {
                continue;
            }
            fresh += 1;
            result.checked += 1;
            match recompute_status(state, invoice.id, now).await {
                Ok(updated) if updated.status == InvoiceStatus::Overdue => {
                    result.marked_overdue += 1
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(invoice_id = %invoice.id, error = %error, "Failed to refresh invoice");
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
