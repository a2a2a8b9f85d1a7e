use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::invoice::Invoice;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Stripe,
    ManualCash,
    // Older clients spell it without the "F".
    #[serde(alias = "MANUAL_ETRANSVER")]
    ManualEtransfer,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stripe => "STRIPE",
            Self::ManualCash => "MANUAL_CASH",
            Self::ManualEtransfer => "MANUAL_ETRANSFER",
        }
    }

    pub fn settles_immediately(self) -> bool {
        matches!(self, Self::ManualCash | Self::ManualEtransfer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub payer_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub provider_ref: Option<String>,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Records a payment attempt. Manual methods settle on creation; electronic
    /// ones wait for provider confirmation.
    pub fn record(
        invoice: &Invoice,
        payer_id: Uuid,
        method: PaymentMethod,
        requested_amount: Option<Decimal>,
        provider_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let amount = resolve_amount(invoice, requested_amount)?;

        let provider_ref = provider_ref
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if method == PaymentMethod::Stripe && provider_ref.is_none() {
            return Err(AppError::Validation(
                "provider_ref (payment intent id) is required for STRIPE payments.".to_string(),
            ));
        }

        let (status, paid_at) = if method.settles_immediately() {
            (PaymentStatus::Succeeded, Some(now))
        } else {
            (PaymentStatus::Pending, None)
        };

        Ok(Self {
            id: Uuid::new_v4(),
            invoice_id: invoice.id,
            payer_id,
            amount,
            method,
            provider_ref,
            status,
            paid_at,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Without an explicit amount the payment covers the outstanding balance,
/// which equals `amount_due` until something has been paid.
fn resolve_amount(invoice: &Invoice, requested: Option<Decimal>) -> AppResult<Decimal> {
    let Some(amount) = requested else {
        return Ok(invoice.balance);
    };
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Payment amount must be greater than zero.".to_string(),
        ));
    }
    if amount > invoice.balance {
        return Err(AppError::Validation(format!(
            "Payment amount exceeds the outstanding balance of {}.",
            invoice.balance
        )));
    }
    Ok(amount)
}

/// Guarded payment status change applied by the webhook path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentTransition {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub at: DateTime<Utc>,
}

impl PaymentTransition {
    pub fn confirm(at: DateTime<Utc>) -> Self {
        Self {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Succeeded,
            at,
        }
    }

    pub fn fail(at: DateTime<Utc>) -> Self {
        Self {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Failed,
            at,
        }
    }

    pub fn refund(at: DateTime<Utc>) -> Self {
        Self {
            from: PaymentStatus::Succeeded,
            to: PaymentStatus::Refunded,
            at,
        }
    }

    pub fn apply(&self, payment: &Payment) -> Payment {
        let mut next = payment.clone();
        next.status = self.to;
        next.updated_at = self.at;
        if self.to == PaymentStatus::Succeeded {
            next.paid_at = Some(self.at);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::{Payment, PaymentMethod, PaymentStatus, PaymentTransition};
    use crate::domain::invoice::{Invoice, InvoiceStatus};
    use crate::error::AppError;

    fn invoice() -> Invoice {
        let now = Utc::now();
        Invoice {
            id: Uuid::new_v4(),
            lease_id: Uuid::new_v4(),
            period_year: 2026,
            period_month: 3,
            due_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            line_items: vec![],
            amount_due: dec!(1000),
            amount_paid: dec!(0),
            balance: dec!(1000),
            status: InvoiceStatus::Issued,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn manual_methods_settle_immediately() {
        let now = Utc::now();
        for method in [PaymentMethod::ManualCash, PaymentMethod::ManualEtransfer] {
            let payment = Payment::record(&invoice(), Uuid::new_v4(), method, None, None, now)
                .expect("payment");
            assert_eq!(payment.status, PaymentStatus::Succeeded);
            assert_eq!(payment.paid_at, Some(now));
            assert_eq!(payment.amount, dec!(1000));
        }
    }

    #[test]
    fn stripe_starts_pending_and_needs_a_reference() {
        let now = Utc::now();
        let payment = Payment::record(
            &invoice(),
            Uuid::new_v4(),
            PaymentMethod::Stripe,
            None,
            Some(" pi_123 ".to_string()),
            now,
        )
        .expect("payment");
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.paid_at, None);
        assert_eq!(payment.provider_ref.as_deref(), Some("pi_123"));

        let missing = Payment::record(
            &invoice(),
            Uuid::new_v4(),
            PaymentMethod::Stripe,
            None,
            None,
            now,
        );
        assert!(matches!(missing, Err(AppError::Validation(_))));
    }

    #[test]
    fn explicit_amounts_must_fit_the_balance() {
        let now = Utc::now();
        let invoice = invoice();
        let payer = Uuid::new_v4();
        let partial = Payment::record(
            &invoice,
            payer,
            PaymentMethod::ManualCash,
            Some(dec!(250)),
            None,
            now,
        )
        .expect("payment");
        assert_eq!(partial.amount, dec!(250));

        for amount in [dec!(0), dec!(-5), dec!(1000.01)] {
            assert!(matches!(
                Payment::record(
                    &invoice,
                    payer,
                    PaymentMethod::ManualCash,
                    Some(amount),
                    None,
                    now
                ),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn legacy_etransfer_spelling_is_accepted() {
        let method: PaymentMethod =
            serde_json::from_str("\"MANUAL_ETRANSVER\"").expect("legacy alias");
        assert_eq!(method, PaymentMethod::ManualEtransfer);
        assert_eq!(
            serde_json::to_string(&method).expect("serialize"),
            "\"MANUAL_ETRANSFER\""
        );
    }

    #[test]
    fn confirmation_sets_paid_at() {
        let now = Utc::now();
        let pending = Payment::record(
            &invoice(),
            Uuid::new_v4(),
            PaymentMethod::Stripe,
            None,
            Some("pi_1".to_string()),
            now,
        )
        .expect("payment");
        let confirmed = PaymentTransition::confirm(now).apply(&pending);
        assert_eq!(confirmed.status, PaymentStatus::Succeeded);
        assert_eq!(confirmed.paid_at, Some(now));
    }
}
