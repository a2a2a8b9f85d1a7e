//! Read-side compositions that bundle a record with its related records for
//! display. Nothing here mutates state.

use serde::Serialize;
use uuid::Uuid;

use super::leases::get_for_party;
use crate::{
    domain::{Invoice, Lease, Payment, Property, Unit},
    error::AppResult,
    repository::{InvoiceFilter, MAX_LIST_LIMIT},
    state::AppState,
};

#[derive(Debug, Clone, Serialize)]
pub struct LeaseDetail {
    pub lease: Lease,
    pub unit: Unit,
    pub property: Property,
    pub invoices: Vec<Invoice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub payments: Vec<Payment>,
}

pub async fn lease_detail(state: &AppState, user_id: Uuid, lease_id: Uuid) -> AppResult<LeaseDetail> {
    let lease = get_for_party(state, user_id, lease_id).await?;
    let unit = state.store.get_unit(lease.unit_id).await?;
    let property = state.store.get_property(unit.property_id).await?;
    let invoices = state
        .store
        .list_invoices(&InvoiceFilter {
            lease_id: Some(lease.id),
            limit: MAX_LIST_LIMIT,
            ..InvoiceFilter::default()
        })
        .await?;
    Ok(LeaseDetail {
        lease,
        unit,
        property,
        invoices,
    })
}

pub async fn invoice_detail(
    state: &AppState,
    user_id: Uuid,
    invoice_id: Uuid,
) -> AppResult<InvoiceDetail> {
    let invoice = state.store.get_invoice(invoice_id).await?;
    get_for_party(state, user_id, invoice.lease_id).await?;
    let payments = state.store.list_payments(invoice.id).await?;
    Ok(InvoiceDetail { invoice, payments })
}
