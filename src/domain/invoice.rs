use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lease::Lease;
use crate::error::{AppError, AppResult};

pub const DEFAULT_RENT_LABEL: &str = "Monthly Rent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    PartiallyPaid,
    Paid,
    Overdue,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Issued => "ISSUED",
            Self::PartiallyPaid => "PARTIALLY_PAID",
            Self::Paid => "PAID",
            Self::Overdue => "OVERDUE",
            Self::Void => "VOID",
        }
    }
}

/// Calendar month an invoice bills for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub year: i32,
    pub month: u32,
}

impl BillingPeriod {
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The calendar month after the one containing `date`.
    pub fn following(date: NaiveDate) -> Self {
        if date.month() == 12 {
            Self {
                year: date.year() + 1,
                month: 1,
            }
        } else {
            Self {
                year: date.year(),
                month: date.month() + 1,
            }
        }
    }

    pub fn day(self, day: u32) -> AppResult<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day).ok_or_else(|| {
            AppError::Validation(format!(
                "Day {day} does not exist in {}-{:02}.",
                self.year, self.month
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub label: String,
    pub amount: Decimal,
}

impl LineItem {
    pub fn monthly_rent(amount: Decimal) -> Self {
        Self {
            label: DEFAULT_RENT_LABEL.to_string(),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub lease_id: Uuid,
    pub period_year: i32,
    pub period_month: u32,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    pub amount_due: Decimal,
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The derived part of an invoice, recomputed from its payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub status: InvoiceStatus,
}

impl Invoice {
    /// Issues an invoice for `period`. Empty `line_items` bill the lease rent.
    pub fn issue(
        lease: &Lease,
        period: BillingPeriod,
        due_date: NaiveDate,
        line_items: Vec<LineItem>,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let line_items = if line_items.is_empty() {
            vec![LineItem::monthly_rent(lease.rent_amount)]
        } else {
            line_items
        };
        for item in &line_items {
            if item.label.trim().is_empty() {
                return Err(AppError::Validation(
                    "Line item label is required.".to_string(),
                ));
            }
            if item.amount.is_sign_negative() {
                return Err(AppError::Validation(
                    "Line item amounts must not be negative.".to_string(),
                ));
            }
        }

        let amount_due = line_items.iter().map(|item| item.amount).sum::<Decimal>();
        Ok(Self {
            id: Uuid::new_v4(),
            lease_id: lease.id,
            period_year: period.year,
            period_month: period.month,
            due_date,
            line_items,
            amount_due,
            amount_paid: Decimal::ZERO,
            balance: amount_due,
            status: InvoiceStatus::Issued,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn period(&self) -> BillingPeriod {
        BillingPeriod {
            year: self.period_year,
            month: self.period_month,
        }
    }

    /// Derives paid amount, balance and status from an explicit payment set.
    #[cfg(test)]
    pub fn reconcile(&self, payments: &[super::Payment], today: NaiveDate) -> InvoiceTotals {
        let amount_paid = payments
            .iter()
            .filter(|payment| {
                payment.invoice_id == self.id && payment.status == super::PaymentStatus::Succeeded
            })
            .map(|payment| payment.amount)
            .sum::<Decimal>();
        self.totals_for_paid(amount_paid, today)
    }

    /// Derives balance and status from the sum of SUCCEEDED payments.
    /// Depends only on its inputs, so repeated calls agree.
    pub fn totals_for_paid(&self, amount_paid: Decimal, today: NaiveDate) -> InvoiceTotals {
        let balance = (self.amount_due - amount_paid).max(Decimal::ZERO);

        let status = if self.status == InvoiceStatus::Void {
            InvoiceStatus::Void
        } else if balance <= Decimal::ZERO {
            InvoiceStatus::Paid
        } else if amount_paid > Decimal::ZERO {
            InvoiceStatus::PartiallyPaid
        } else if self.due_date < today {
            InvoiceStatus::Overdue
        } else {
            InvoiceStatus::Issued
        };

        InvoiceTotals {
            amount_paid,
            balance,
            status,
        }
    }

    pub fn with_totals(&self, totals: InvoiceTotals, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.amount_paid = totals.amount_paid;
        next.balance = totals.balance;
        next.status = totals.status;
        next.updated_at = now;
        next
    }

    pub fn ensure_payable(&self) -> AppResult<()> {
        match self.status {
            InvoiceStatus::Paid => Err(AppError::InvalidState(
                "Invoice is already paid.".to_string(),
            )),
            InvoiceStatus::Void => Err(AppError::InvalidState(
                "Invoice has been voided.".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn ensure_voidable(&self) -> AppResult<()> {
        if !matches!(
            self.status,
            InvoiceStatus::Draft | InvoiceStatus::Issued | InvoiceStatus::Overdue
        ) || self.amount_paid > Decimal::ZERO
        {
            return Err(AppError::InvalidState(format!(
                "A {} invoice with payments cannot be voided.",
                self.status.as_str()
            )));
        }
        Ok(())
    }
}
