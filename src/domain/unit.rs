use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Available,
    Occupied,
    Maintenance,
}

impl UnitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Occupied => "OCCUPIED",
            Self::Maintenance => "MAINTENANCE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    pub landlord_id: Uuid,
    pub name: String,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: Uuid,
    pub property_id: Uuid,
    pub unit_number: String,
    pub bedrooms: i16,
    pub bathrooms: Decimal,
    pub rent_amount: Decimal,
    pub deposit_amount: Decimal,
    pub status: UnitStatus,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Unit {
    pub fn accepts_applications(&self) -> bool {
        self.status == UnitStatus::Available && !self.is_archived
    }

    pub fn ensure_accepts_applications(&self) -> AppResult<()> {
        if self.is_archived {
            return Err(AppError::InvalidState(
                "Unit is archived and no longer accepts applications.".to_string(),
            ));
        }
        if self.status != UnitStatus::Available {
            return Err(AppError::InvalidState(format!(
                "Unit is {} and does not accept applications.",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// Guard for landlord-initiated availability changes. OCCUPIED is owned by
    /// the lease lifecycle, so it can neither be set nor left by hand.
    pub fn ensure_manual_status_change(&self, next: UnitStatus) -> AppResult<()> {
        if next == UnitStatus::Occupied {
            return Err(AppError::InvalidState(
                "OCCUPIED is set by lease activation only.".to_string(),
            ));
        }
        if self.status == UnitStatus::Occupied {
            return Err(AppError::InvalidState(
                "Unit is occupied by an active lease.".to_string(),
            ));
        }
        Ok(())
    }
}
