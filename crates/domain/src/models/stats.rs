use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Per-user weekly totals. Hours are fractional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct EmployeeWeekStats {
    pub user_id: Uuid,
    pub shift_count: usize,
    pub planned_hours: f64,
    pub actual_hours: f64,
    pub overtime_hours: f64,
    /// `actual_hours - planned_hours`; positive means more was worked than planned
    pub variance: f64,
}
