//! Pairwise overlap detection for one week of one location's roster.
//!
//! Quadratic in the number of shifts. Do not feed it multi-week or
//! multi-location data.

use chrono::{DateTime, Utc};
use domain::models::{
    conflict::{Conflict, ConflictMap, ConflictType, Severity},
    leave::Leave,
    shift::{Shift, intervals_overlap},
};
use tracing::debug;

/// Build the conflict map from scratch.
///
/// A shift gets a `shift_overlap` entry for every other shift of the same
/// assignee whose interval intersects it, and a `leave_overlap` entry for
/// every approved leave of that assignee it intersects. Unassigned shifts are
/// ignored.
pub fn detect_conflicts(shifts: &[Shift], leaves: &[Leave]) -> ConflictMap {
    let mut conflicts = ConflictMap::new();

    let assigned: Vec<_> = shifts
        .iter()
        .filter_map(|s| s.assigned_user_id.map(|user_id| (s, user_id)))
        .collect();

    for (i, (a, a_user)) in assigned.iter().enumerate() {
        for (b, b_user) in &assigned[i + 1..] {
            if a_user != b_user || !intervals_overlap(a.start_at, a.end_at, b.start_at, b.end_at)
            {
                continue;
            }
            push(&mut conflicts, shift_overlap(a, b));
            push(&mut conflicts, shift_overlap(b, a));
        }
    }

    for (shift, user_id) in &assigned {
        for leave in leaves
            .iter()
            .filter(|l| l.blocks_shifts() && l.user_id == *user_id)
        {
            if shift.overlaps(leave.start_at, leave.end_at) {
                push(&mut conflicts, leave_overlap(shift, leave));
            }
        }
    }

    debug!(
        shifts = shifts.len(),
        leaves = leaves.len(),
        conflicted_shifts = conflicts.len(),
        "Conflicts recomputed"
    );

    conflicts
}

/// Number of conflict entries across all shifts
pub fn total_conflicts(conflicts: &ConflictMap) -> usize {
    conflicts.values().map(Vec::len).sum()
}

fn push(conflicts: &mut ConflictMap, conflict: Conflict) {
    conflicts.entry(conflict.shift_id).or_default().push(conflict);
}

fn shift_overlap(shift: &Shift, other: &Shift) -> Conflict {
    Conflict {
        shift_id: shift.id,
        conflict_type: ConflictType::ShiftOverlap,
        severity: Severity::Error,
        message: format!(
            "Overlaps another shift ({})",
            time_range(other.start_at, other.end_at)
        ),
        related_id: other.id,
    }
}

fn leave_overlap(shift: &Shift, leave: &Leave) -> Conflict {
    let kind = leave.leave_type.as_deref().unwrap_or("leave");
    Conflict {
        shift_id: shift.id,
        conflict_type: ConflictType::LeaveOverlap,
        severity: Severity::Error,
        message: format!(
            "Employee is on approved {} ({})",
            kind,
            time_range(leave.start_at, leave.end_at)
        ),
        related_id: leave.id,
    }
}

fn time_range(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("{} to {}", start.format("%a %H:%M"), end.format("%a %H:%M"))
}
