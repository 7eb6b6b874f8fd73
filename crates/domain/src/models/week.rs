use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use super::{leave::Leave, rota::Rota, shift::Shift};
use crate::validation::ValidationError;

/// Identifies one week of one location's roster
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, TS)]
pub struct WeekKey {
    pub location_id: Uuid,
    pub week_start: NaiveDate,
}

impl WeekKey {
    /// `day` is normalised to the Monday of its ISO week
    pub fn new(location_id: Uuid, day: NaiveDate) -> Self {
        let offset = i64::from(day.weekday().num_days_from_monday());
        Self {
            location_id,
            week_start: day - Duration::days(offset),
        }
    }

    /// Exclusive end of the week
    pub fn week_end(&self) -> NaiveDate {
        self.week_start + Duration::days(7)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.week_start && day < self.week_end()
    }

    pub fn shifted(&self, weeks: i64) -> Self {
        Self {
            location_id: self.location_id,
            week_start: self.week_start + Duration::weeks(weeks),
        }
    }
}

/// Unified read result for a `WeekKey`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, TS)]
pub struct RotaWeek {
    pub rota: Option<Rota>,
    #[serde(default)]
    pub shifts: Vec<Shift>,
    #[serde(default)]
    pub leaves: Vec<Leave>,
}

impl RotaWeek {
    /// Reject payloads the rest of the planner cannot reason about
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::with_capacity(self.shifts.len());
        for shift in &self.shifts {
            shift.validate()?;
            if !seen.insert(shift.id) {
                return Err(ValidationError::DuplicateShift(shift.id));
            }
            if let Some(rota) = &self.rota {
                if shift.rota_id != rota.id {
                    return Err(ValidationError::ForeignShift {
                        shift_id: shift.id,
                        rota_id: rota.id,
                    });
                }
            }
        }
        for leave in &self.leaves {
            leave.validate()?;
        }
        Ok(())
    }
}
