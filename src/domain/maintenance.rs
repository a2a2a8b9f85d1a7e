use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    OnHold,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::OnHold => "ON_HOLD",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
        }
    }

    /// Statuses counted against the per-unit open ticket limit.
    pub const ACTIVE: [TicketStatus; 3] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::OnHold,
    ];

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    /// Targets the assignee may move a ticket to.
    pub fn is_assignee_target(self) -> bool {
        matches!(self, Self::InProgress | Self::OnHold | Self::Resolved)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketCategory {
    Plumbing,
    Electrical,
    Appliance,
    Hvac,
    Structural,
    Pest,
    #[default]
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimelineAction {
    Created,
    Assigned,
    StatusChanged,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub action: TimelineAction,
    pub actor_id: Uuid,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceTicket {
    pub id: Uuid,
    pub unit_id: Uuid,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub attachments: Vec<String>,
}

impl MaintenanceTicket {
    pub fn open(unit_id: Uuid, created_by: Uuid, input: NewTicket, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            unit_id,
            created_by,
            assigned_to: None,
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            category: input.category,
            priority: input.priority,
            status: TicketStatus::Open,
            attachments: input.attachments,
            timeline: vec![TimelineEntry {
                at: now,
                action: TimelineAction::Created,
                actor_id: created_by,
                note: None,
            }],
            resolved_at: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn assign(&self, actor_id: Uuid, staff_id: Uuid, now: DateTime<Utc>) -> AppResult<Self> {
        if !self.status.is_active() {
            return Err(AppError::InvalidState(format!(
                "A {} ticket cannot be assigned.",
                self.status.as_str()
            )));
        }
        let mut next = self.clone();
        next.assigned_to = Some(staff_id);
        next.status = TicketStatus::InProgress;
        next.updated_at = now;
        next.timeline.push(TimelineEntry {
            at: now,
            action: TimelineAction::Assigned,
            actor_id,
            note: Some(format!("Assigned to {staff_id}")),
        });
        Ok(next)
    }

    pub fn update_status(
        &self,
        actor_id: Uuid,
        target: TicketStatus,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        if self.assigned_to != Some(actor_id) {
            return Err(AppError::Forbidden(
                "Forbidden: only the assignee can update this ticket.".to_string(),
            ));
        }
        if !target.is_assignee_target() {
            return Err(AppError::InvalidState(format!(
                "Status {} cannot be set by the assignee.",
                target.as_str()
            )));
        }
        match self.status {
            TicketStatus::Closed => {
                return Err(AppError::InvalidState("Ticket is closed.".to_string()));
            }
            TicketStatus::Resolved => {
                return Err(AppError::InvalidState(
                    "Ticket is resolved; it can only be closed.".to_string(),
                ));
            }
            _ => {}
        }

        let mut next = self.clone();
        next.status = target;
        next.updated_at = now;
        next.resolved_at = if target == TicketStatus::Resolved {
            Some(now)
        } else {
            None
        };
        next.timeline.push(TimelineEntry {
            at: now,
            action: TimelineAction::StatusChanged,
            actor_id,
            note: Some(match note.map(|text| text.trim().to_string()) {
                Some(text) if !text.is_empty() => format!("{}: {text}", target.as_str()),
                _ => target.as_str().to_string(),
            }),
        });
        Ok(next)
    }

    pub fn close(&self, actor_id: Uuid, note: Option<String>, now: DateTime<Utc>) -> AppResult<Self> {
        if self.status != TicketStatus::Resolved {
            return Err(AppError::InvalidState(format!(
                "Only RESOLVED tickets can be closed; ticket is {}.",
                self.status.as_str()
            )));
        }
        let mut next = self.clone();
        next.status = TicketStatus::Closed;
        next.closed_at = Some(now);
        next.updated_at = now;
        next.timeline.push(TimelineEntry {
            at: now,
            action: TimelineAction::Closed,
            actor_id,
            note,
        });
        Ok(next)
    }
}
