//! In-process bus for out-of-band planner signals.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 64;

/// Signals that make the fetcher refresh outside its polling schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PlannerSignal {
    /// Raised by the kiosk/clock-in source when a location's shifts change
    ShiftUpdated { location_id: Uuid },
    FocusRegained,
}

#[derive(Debug, Clone)]
pub struct PlannerEvents {
    tx: broadcast::Sender<PlannerSignal>,
}

impl Default for PlannerEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PlannerEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlannerSignal> {
        self.tx.subscribe()
    }

    /// Returns the number of listeners that received the signal
    pub fn emit(&self, signal: PlannerSignal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn shift_updated(&self, location_id: Uuid) -> usize {
        self.emit(PlannerSignal::ShiftUpdated { location_id })
    }

    pub fn focus_regained(&self) -> usize {
        self.emit(PlannerSignal::FocusRegained)
    }
}
