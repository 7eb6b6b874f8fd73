use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use crate::validation::ValidationError;

/// Half-open interval test: `[a_start, a_end)` and `[b_start, b_end)` intersect.
/// Intervals that only touch at an endpoint do not overlap.
pub fn intervals_overlap<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && a_end > b_start
}

/// Whether a shift was planned up front or recorded from a real clock-in
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ShiftSource {
    #[default]
    Planned,
    Actual,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AssignmentStatus {
    #[default]
    Assigned,
    Confirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct Shift {
    pub id: Uuid,
    pub rota_id: Uuid,
    pub location_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub break_minutes: i32,
    #[serde(default)]
    pub job_tag: Option<String>,
    #[serde(default)]
    pub assigned_user_id: Option<Uuid>, // at most one assignee
    #[serde(default)]
    pub source: ShiftSource,
    #[serde(default)]
    pub actual_start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Shift {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        intervals_overlap(self.start_at, self.end_at, start, end)
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_at - self.start_at).num_minutes()
    }

    /// Scheduled minutes minus the break, never negative
    pub fn paid_minutes(&self) -> i64 {
        (self.duration_minutes() - i64::from(self.break_minutes)).max(0)
    }

    /// Clocked minutes minus the break, only once both clock events are known
    pub fn actual_paid_minutes(&self) -> Option<i64> {
        match (self.actual_start_at, self.actual_end_at) {
            (Some(start), Some(end)) => {
                Some(((end - start).num_minutes() - i64::from(self.break_minutes)).max(0))
            }
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_times(self.start_at, self.end_at, self.break_minutes)?;
        match (self.actual_start_at, self.actual_end_at) {
            (Some(start), Some(end)) if end <= start => Err(ValidationError::InvalidInterval {
                entity: "clocked shift",
            }),
            _ => Ok(()),
        }
    }

    pub fn to_payload(&self) -> ShiftPayload {
        ShiftPayload {
            rota_id: self.rota_id,
            location_id: self.location_id,
            start_at: self.start_at,
            end_at: self.end_at,
            break_minutes: self.break_minutes,
            job_tag: self.job_tag.clone(),
            source: self.source,
            notes: self.notes.clone(),
        }
    }
}

/// Body of the shift create/update endpoints. Assignment is a separate call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct ShiftPayload {
    pub rota_id: Uuid,
    pub location_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub break_minutes: i32,
    pub job_tag: Option<String>,
    pub source: ShiftSource,
    pub notes: Option<String>,
}

impl ShiftPayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_times(self.start_at, self.end_at, self.break_minutes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct AssignShift {
    pub user_id: Uuid,
    pub status: AssignmentStatus,
}

fn validate_times(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    break_minutes: i32,
) -> Result<(), ValidationError> {
    if end <= start {
        return Err(ValidationError::InvalidInterval { entity: "shift" });
    }
    if break_minutes < 0 {
        return Err(ValidationError::NegativeBreak);
    }
    let duration_minutes = (end - start).num_minutes();
    if i64::from(break_minutes) >= duration_minutes {
        return Err(ValidationError::BreakTooLong {
            break_minutes,
            duration_minutes,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, hour, minute, 0).unwrap()
    }

    fn shift(start: DateTime<Utc>, end: DateTime<Utc>, break_minutes: i32) -> Shift {
        Shift {
            id: Uuid::new_v4(),
            rota_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            start_at: start,
            end_at: end,
            break_minutes,
            job_tag: None,
            assigned_user_id: None,
            source: ShiftSource::Planned,
            actual_start_at: None,
            actual_end_at: None,
            notes: None,
        }
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        assert!(!intervals_overlap(at(9, 0), at(13, 0), at(13, 0), at(17, 0)));
        assert!(intervals_overlap(at(9, 0), at(14, 0), at(13, 0), at(17, 0)));
        assert!(intervals_overlap(at(10, 0), at(11, 0), at(9, 0), at(17, 0)));
    }

    #[test]
    fn test_paid_minutes_subtracts_break() {
        let s = shift(at(9, 0), at(17, 0), 20);
        assert_eq!(s.paid_minutes(), 460);
        assert_eq!(s.actual_paid_minutes(), None);
    }

    #[test]
    fn test_validate_rejects_end_before_start() {
        let s = shift(at(17, 0), at(9, 0), 0);
        assert_eq!(
            s.validate(),
            Err(ValidationError::InvalidInterval { entity: "shift" })
        );
    }

    #[test]
    fn test_validate_rejects_break_longer_than_shift() {
        let s = shift(at(9, 0), at(10, 0), 60);
        assert!(matches!(
            s.validate(),
            Err(ValidationError::BreakTooLong { .. })
        ));
    }

    #[test]
    fn test_source_parses_from_wire_string() {
        assert_eq!("actual".parse::<ShiftSource>().unwrap(), ShiftSource::Actual);
        assert_eq!(ShiftSource::Planned.to_string(), "planned");
    }
}
