use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Lifecycle of a weekly rota. Transitions only move forward:
/// `draft -> published -> locked`.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    TS,
    EnumString,
    Display,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RotaStatus {
    #[default]
    Draft,
    Published,
    Locked,
}

impl RotaStatus {
    pub fn next(self) -> Option<Self> {
        match self {
            RotaStatus::Draft => Some(RotaStatus::Published),
            RotaStatus::Published => Some(RotaStatus::Locked),
            RotaStatus::Locked => None,
        }
    }

    /// Only the single forward edge out of each state is allowed
    pub fn can_transition_to(self, target: RotaStatus) -> bool {
        self.next() == Some(target)
    }

    /// Shifts stay editable until the rota is locked
    pub fn allows_shift_edits(self) -> bool {
        self != RotaStatus::Locked
    }

    /// Permission that gates the transition into `self`
    pub fn required_permission(self) -> Option<Permission> {
        match self {
            RotaStatus::Draft => None,
            RotaStatus::Published => Some(Permission::RotaPublish),
            RotaStatus::Locked => Some(Permission::RotaLock),
        }
    }
}

/// Actions the remote service authorises per user
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display,
)]
pub enum Permission {
    #[serde(rename = "rota.publish")]
    #[strum(serialize = "rota.publish")]
    RotaPublish,
    #[serde(rename = "rota.lock")]
    #[strum(serialize = "rota.lock")]
    RotaLock,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct Rota {
    pub id: Uuid,
    pub location_id: Uuid,
    pub week_start: NaiveDate,
    pub status: RotaStatus,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,
}

/// Body of `PUT /rotas/{id}/status`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct UpdateRotaStatus {
    pub status: RotaStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_forward_only() {
        assert!(RotaStatus::Draft.can_transition_to(RotaStatus::Published));
        assert!(RotaStatus::Published.can_transition_to(RotaStatus::Locked));
        assert!(!RotaStatus::Published.can_transition_to(RotaStatus::Draft));
        assert!(!RotaStatus::Locked.can_transition_to(RotaStatus::Published));
        assert!(!RotaStatus::Draft.can_transition_to(RotaStatus::Locked));
        assert!(!RotaStatus::Draft.can_transition_to(RotaStatus::Draft));
    }

    #[test]
    fn test_each_edge_has_its_own_permission() {
        assert_eq!(
            RotaStatus::Published.required_permission(),
            Some(Permission::RotaPublish)
        );
        assert_eq!(
            RotaStatus::Locked.required_permission(),
            Some(Permission::RotaLock)
        );
    }

    #[test]
    fn test_permission_string_form() {
        assert_eq!(Permission::RotaPublish.to_string(), "rota.publish");
        assert_eq!("rota.lock".parse::<Permission>().unwrap(), Permission::RotaLock);
    }
}
