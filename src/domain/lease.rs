use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{application::Application, invoice::BillingPeriod, unit::Unit, UnitStatus};
use crate::error::{AppError, AppResult};

pub const MIN_DUE_DAY: u32 = 1;
pub const MAX_DUE_DAY: u32 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaseStatus {
    Pending,
    Active,
    Terminated,
    Expired,
    Rejected,
}

impl LeaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Terminated => "TERMINATED",
            Self::Expired => "EXPIRED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Statuses that lock the unit against another lease.
    pub const HOLDING: [LeaseStatus; 2] = [LeaseStatus::Pending, LeaseStatus::Active];

    pub fn holds_unit(self) -> bool {
        Self::HOLDING.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Expired | Self::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaseResponse {
    Accept,
    Reject,
}

/// Descriptive terms carried on the lease; they do not drive the lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaseTerms {
    pub lease_type: Option<String>,
    pub payment_method: Option<String>,
    pub late_fee_policy: Option<String>,
    pub house_rules: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub id: Uuid,
    pub unit_id: Uuid,
    pub application_id: Option<Uuid>,
    pub landlord_id: Uuid,
    pub tenant_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub rent_amount: Decimal,
    pub deposit_amount: Decimal,
    pub due_day: u32,
    pub status: LeaseStatus,
    #[serde(default)]
    pub terms: LeaseTerms,
    #[serde(default)]
    pub documents: Vec<String>,
    pub is_archived: bool,
    pub accepted_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied lease fields; anything left empty is derived from the
/// unit and the application.
#[derive(Debug, Clone, Default)]
pub struct LeaseDraft {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub rent_amount: Option<Decimal>,
    pub deposit_amount: Option<Decimal>,
    pub due_day: Option<u32>,
    pub terms: LeaseTerms,
    pub documents: Vec<String>,
}

impl Lease {
    pub fn from_application(
        application: &Application,
        unit: &Unit,
        landlord_id: Uuid,
        draft: LeaseDraft,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let start_date = draft.start_date.unwrap_or_else(|| now.date_naive());
        if let Some(end_date) = draft.end_date {
            if end_date < start_date {
                return Err(AppError::Validation(
                    "end_date must not precede start_date.".to_string(),
                ));
            }
        }

        let due_day = draft.due_day.unwrap_or(MIN_DUE_DAY);
        if !(MIN_DUE_DAY..=MAX_DUE_DAY).contains(&due_day) {
            return Err(AppError::Validation(format!(
                "due_day must be between {MIN_DUE_DAY} and {MAX_DUE_DAY}."
            )));
        }

        let rent_amount = draft.rent_amount.unwrap_or(unit.rent_amount);
        let deposit_amount = draft.deposit_amount.unwrap_or(rent_amount);
        if rent_amount.is_sign_negative() || deposit_amount.is_sign_negative() {
            return Err(AppError::Validation(
                "Rent and deposit amounts must not be negative.".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            unit_id: unit.id,
            application_id: Some(application.id),
            landlord_id,
            tenant_id: application.tenant_id,
            start_date,
            end_date: draft.end_date,
            rent_amount,
            deposit_amount,
            due_day,
            status: LeaseStatus::Pending,
            terms: draft.terms,
            documents: draft.documents,
            is_archived: false,
            accepted_at: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn ensure_tenant(&self, tenant_id: Uuid) -> AppResult<()> {
        if self.tenant_id == tenant_id {
            return Ok(());
        }
        Err(AppError::Forbidden(
            "Forbidden: lease belongs to another tenant.".to_string(),
        ))
    }

    pub fn ensure_landlord(&self, landlord_id: Uuid) -> AppResult<()> {
        if self.landlord_id == landlord_id {
            return Ok(());
        }
        Err(AppError::Forbidden(
            "Forbidden: lease belongs to another landlord.".to_string(),
        ))
    }

    pub fn ensure_active(&self) -> AppResult<()> {
        if self.status == LeaseStatus::Active {
            return Ok(());
        }
        Err(AppError::InvalidState(format!(
            "Lease is {}; invoices require an ACTIVE lease.",
            self.status.as_str()
        )))
    }

    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.tenant_id == user_id || self.landlord_id == user_id
    }

    pub fn due_date_for(&self, period: BillingPeriod) -> AppResult<NaiveDate> {
        period.day(self.due_day)
    }

    pub fn has_ended_by(&self, today: NaiveDate) -> bool {
        self.end_date.is_some_and(|end_date| end_date < today)
    }
}

/// A single guarded lease status change together with the unit status it
/// implies. Stores apply it atomically and only while the lease is still in
/// `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseTransition {
    pub from: LeaseStatus,
    pub to: LeaseStatus,
    pub unit_status: UnitStatus,
    pub at: DateTime<Utc>,
}

impl LeaseTransition {
    pub fn respond(response: LeaseResponse, at: DateTime<Utc>) -> Self {
        match response {
            LeaseResponse::Accept => Self {
                from: LeaseStatus::Pending,
                to: LeaseStatus::Active,
                unit_status: UnitStatus::Occupied,
                at,
            },
            LeaseResponse::Reject => Self {
                from: LeaseStatus::Pending,
                to: LeaseStatus::Rejected,
                unit_status: UnitStatus::Available,
                at,
            },
        }
    }

    pub fn terminate(at: DateTime<Utc>) -> Self {
        Self {
            from: LeaseStatus::Active,
            to: LeaseStatus::Terminated,
            unit_status: UnitStatus::Available,
            at,
        }
    }

    pub fn expire(at: DateTime<Utc>) -> Self {
        Self {
            from: LeaseStatus::Active,
            to: LeaseStatus::Expired,
            unit_status: UnitStatus::Available,
            at,
        }
    }

    pub fn applies_to(&self, lease: &Lease) -> bool {
        lease.status == self.from
    }

    pub fn apply(&self, lease: &Lease) -> Lease {
        let mut next = lease.clone();
        next.status = self.to;
        next.updated_at = self.at;
        if self.to == LeaseStatus::Active {
            next.accepted_at = Some(self.at);
        }
        if self.to.is_terminal() {
            next.ended_at = Some(self.at);
        }
        next
    }
}
