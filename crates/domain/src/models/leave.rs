use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use crate::validation::ValidationError;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

/// A user's absence interval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct Leave {
    pub id: Uuid,
    pub user_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: LeaveStatus,
    #[serde(default)]
    pub leave_type: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Leave {
    /// Only approved leave blocks shifts
    pub fn blocks_shifts(&self) -> bool {
        self.status == LeaveStatus::Approved
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end_at <= self.start_at {
            return Err(ValidationError::InvalidInterval { entity: "leave" });
        }
        Ok(())
    }
}

/// Body of `POST /leaves`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct LeavePayload {
    pub user_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: LeaveStatus,
    pub leave_type: Option<String>,
    pub reason: Option<String>,
}

/// User-independent part of an absence created for several users at once
#[derive(Debug, Clone, PartialEq)]
pub struct AbsenceDraft {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: LeaveStatus,
    pub leave_type: Option<String>,
    pub reason: Option<String>,
}

impl AbsenceDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end_at <= self.start_at {
            return Err(ValidationError::InvalidInterval { entity: "absence" });
        }
        Ok(())
    }

    pub fn for_user(&self, user_id: Uuid) -> LeavePayload {
        LeavePayload {
            user_id,
            start_at: self.start_at,
            end_at: self.end_at,
            status: self.status,
            leave_type: self.leave_type.clone(),
            reason: self.reason.clone(),
        }
    }
}
