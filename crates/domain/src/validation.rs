//! Boundary checks applied to drafts before they are sent and to payloads
//! after they are received.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{entity} end time must be after its start time")]
    InvalidInterval { entity: &'static str },
    #[error("break minutes cannot be negative")]
    NegativeBreak,
    #[error("a {break_minutes} minute break does not fit in a {duration_minutes} minute shift")]
    BreakTooLong {
        break_minutes: i32,
        duration_minutes: i64,
    },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("duplicate shift id {0}")]
    DuplicateShift(Uuid),
    #[error("shift {shift_id} does not belong to rota {rota_id}")]
    ForeignShift { shift_id: Uuid, rota_id: Uuid },
    #[error("rota is locked and can no longer be edited")]
    RotaLocked,
    #[error("an assigned shift cannot be moved to the unassigned row")]
    CannotUnassign,
}
