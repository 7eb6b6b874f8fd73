//! Per-employee weekly hour totals.

use std::collections::BTreeMap;

use domain::models::{shift::Shift, stats::EmployeeWeekStats};
use uuid::Uuid;

pub const DEFAULT_OVERTIME_THRESHOLD_HOURS: f64 = 40.0;

#[derive(Default)]
struct Totals {
    shift_count: usize,
    planned_minutes: i64,
    actual_minutes: i64,
}

/// Reduce a week's shifts to one entry per assigned user, ordered by user id.
///
/// Actual hours only count shifts with both clock events recorded.
pub fn aggregate_week_stats(
    shifts: &[Shift],
    overtime_threshold_hours: f64,
) -> Vec<EmployeeWeekStats> {
    let mut totals: BTreeMap<Uuid, Totals> = BTreeMap::new();

    for shift in shifts {
        let Some(user_id) = shift.assigned_user_id else {
            continue;
        };
        let entry = totals.entry(user_id).or_default();
        entry.shift_count += 1;
        entry.planned_minutes += shift.paid_minutes();
        entry.actual_minutes += shift.actual_paid_minutes().unwrap_or(0);
    }

    totals
        .into_iter()
        .map(|(user_id, t)| {
            let planned_hours = t.planned_minutes as f64 / 60.0;
            let actual_hours = t.actual_minutes as f64 / 60.0;
            EmployeeWeekStats {
                user_id,
                shift_count: t.shift_count,
                planned_hours,
                actual_hours,
                overtime_hours: (planned_hours - overtime_threshold_hours).max(0.0),
                variance: actual_hours - planned_hours,
            }
        })
        .collect()
}
