use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConflictType {
    ShiftOverlap,
    LeaveOverlap,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// Derived indicator, rebuilt from scratch whenever shifts or leaves change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
pub struct Conflict {
    pub shift_id: Uuid,
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub message: String,
    /// The other shift for `shift_overlap`, the leave for `leave_overlap`
    pub related_id: Uuid,
}

/// Conflicts keyed by shift id. Ordered so equal inputs compare equal.
pub type ConflictMap = BTreeMap<Uuid, Vec<Conflict>>;
