use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Withdrawn => "WITHDRAWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationDecision {
    Approve,
    Reject,
}

impl ApplicationDecision {
    pub fn target_status(self) -> ApplicationStatus {
        match self {
            Self::Approve => ApplicationStatus::Approved,
            Self::Reject => ApplicationStatus::Rejected,
        }
    }

    pub fn audit_action(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub unit_id: Uuid,
    pub tenant_id: Uuid,
    pub status: ApplicationStatus,
    pub note: Option<String>,
    #[serde(default)]
    pub documents: Vec<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn new(
        tenant_id: Uuid,
        unit_id: Uuid,
        note: Option<String>,
        documents: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            unit_id,
            tenant_id,
            status: ApplicationStatus::Pending,
            note,
            documents,
            decided_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ensure_pending(&self) -> AppResult<()> {
        if self.status == ApplicationStatus::Pending {
            return Ok(());
        }
        Err(AppError::InvalidState(format!(
            "Application is {} and can no longer change.",
            self.status.as_str()
        )))
    }

    /// A lease may be drawn up from a pending or already approved application.
    pub fn ensure_leasable(&self) -> AppResult<()> {
        match self.status {
            ApplicationStatus::Pending | ApplicationStatus::Approved => Ok(()),
            other => Err(AppError::InvalidState(format!(
                "Cannot create a lease from a {} application.",
                other.as_str()
            ))),
        }
    }

    pub fn ensure_tenant(&self, tenant_id: Uuid) -> AppResult<()> {
        if self.tenant_id == tenant_id {
            return Ok(());
        }
        Err(AppError::Forbidden(
            "Forbidden: application belongs to another tenant.".to_string(),
        ))
    }
}
