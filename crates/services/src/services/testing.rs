//! In-memory `RotaApi` used by unit tests.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use domain::models::{
    leave::{Leave, LeavePayload, LeaveStatus},
    rota::{Rota, RotaStatus},
    shift::{AssignShift, Shift, ShiftPayload, ShiftSource},
    week::{RotaWeek, WeekKey},
};
use uuid::Uuid;

use super::{
    config::PlannerConfig,
    context::{PermissionSet, PlannerContext},
    notification::RecordingNotifier,
    rota_api::{RotaApi, RotaApiError},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    FetchWeek(WeekKey),
    CreateShift,
    UpdateShift(Uuid),
    DeleteShift(Uuid),
    AssignShift { shift_id: Uuid, user_id: Uuid },
    UpdateRotaStatus { rota_id: Uuid, status: RotaStatus },
    CreateLeave { user_id: Uuid },
}

#[derive(Default)]
struct FakeState {
    week: RotaWeek,
    calls: Vec<ApiCall>,
    read_error: Option<RotaApiError>,
    write_error: Option<RotaApiError>,
}

#[derive(Default)]
pub struct FakeRotaApi {
    state: Mutex<FakeState>,
}

impl FakeRotaApi {
    pub fn with_week(week: RotaWeek) -> Self {
        Self {
            state: Mutex::new(FakeState {
                week,
                ..FakeState::default()
            }),
        }
    }

    /// Draft rota for the week of 2025-03-03 with two back-to-back shifts for one user
    pub fn sample_week(location_id: Uuid) -> RotaWeek {
        let rota = Rota {
            id: Uuid::new_v4(),
            location_id,
            week_start: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            status: RotaStatus::Draft,
            published_at: None,
            locked_at: None,
        };
        let user = Uuid::new_v4();
        let shift = |start: u32, end: u32| Shift {
            id: Uuid::new_v4(),
            rota_id: rota.id,
            location_id,
            start_at: Utc.with_ymd_and_hms(2025, 3, 3, start, 0, 0).unwrap(),
            end_at: Utc.with_ymd_and_hms(2025, 3, 3, end, 0, 0).unwrap(),
            break_minutes: 0,
            job_tag: Some("kitchen".to_string()),
            assigned_user_id: Some(user),
            source: ShiftSource::Planned,
            actual_start_at: None,
            actual_end_at: None,
            notes: None,
        };
        RotaWeek {
            shifts: vec![shift(9, 13), shift(13, 17)],
            rota: Some(rota),
            leaves: vec![],
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn fail_reads(&self, error: Option<RotaApiError>) {
        self.lock().read_error = error;
    }

    pub fn fail_writes(&self, error: Option<RotaApiError>) {
        self.lock().write_error = error;
    }

    pub fn week(&self) -> RotaWeek {
        self.lock().week.clone()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn write_calls(&self) -> Vec<ApiCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, ApiCall::FetchWeek(_)))
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls().len() - self.write_calls().len()
    }

    pub fn fetched_keys(&self) -> Vec<WeekKey> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::FetchWeek(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    fn record_write(&self, call: ApiCall) -> Result<MutexGuard<'_, FakeState>, RotaApiError> {
        let mut state = self.lock();
        state.calls.push(call);
        match state.write_error.clone() {
            Some(e) => Err(e),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl RotaApi for FakeRotaApi {
    async fn fetch_week(&self, key: WeekKey) -> Result<RotaWeek, RotaApiError> {
        let mut state = self.lock();
        state.calls.push(ApiCall::FetchWeek(key));
        match state.read_error.clone() {
            Some(e) => Err(e),
            None => Ok(state.week.clone()),
        }
    }

    async fn create_shift(&self, payload: &ShiftPayload) -> Result<Shift, RotaApiError> {
        payload.validate()?;
        let mut state = self.record_write(ApiCall::CreateShift)?;
        let shift = Shift {
            id: Uuid::new_v4(),
            rota_id: payload.rota_id,
            location_id: payload.location_id,
            start_at: payload.start_at,
            end_at: payload.end_at,
            break_minutes: payload.break_minutes,
            job_tag: payload.job_tag.clone(),
            assigned_user_id: None,
            source: payload.source,
            actual_start_at: None,
            actual_end_at: None,
            notes: payload.notes.clone(),
        };
        state.week.shifts.push(shift.clone());
        Ok(shift)
    }

    async fn update_shift(
        &self,
        shift_id: Uuid,
        payload: &ShiftPayload,
    ) -> Result<Shift, RotaApiError> {
        let mut state = self.record_write(ApiCall::UpdateShift(shift_id))?;
        let shift = state
            .week
            .shifts
            .iter_mut()
            .find(|s| s.id == shift_id)
            .ok_or_else(|| RotaApiError::NotFound(format!("shift {shift_id}")))?;
        shift.start_at = payload.start_at;
        shift.end_at = payload.end_at;
        shift.break_minutes = payload.break_minutes;
        shift.job_tag = payload.job_tag.clone();
        shift.notes = payload.notes.clone();
        Ok(shift.clone())
    }

    async fn delete_shift(&self, shift_id: Uuid) -> Result<(), RotaApiError> {
        let mut state = self.record_write(ApiCall::DeleteShift(shift_id))?;
        let before = state.week.shifts.len();
        state.week.shifts.retain(|s| s.id != shift_id);
        if state.week.shifts.len() == before {
            return Err(RotaApiError::NotFound(format!("shift {shift_id}")));
        }
        Ok(())
    }

    async fn assign_shift(&self, shift_id: Uuid, body: &AssignShift) -> Result<(), RotaApiError> {
        let mut state = self.record_write(ApiCall::AssignShift {
            shift_id,
            user_id: body.user_id,
        })?;
        let shift = state
            .week
            .shifts
            .iter_mut()
            .find(|s| s.id == shift_id)
            .ok_or_else(|| RotaApiError::NotFound(format!("shift {shift_id}")))?;
        shift.assigned_user_id = Some(body.user_id);
        Ok(())
    }

    async fn update_rota_status(
        &self,
        rota_id: Uuid,
        status: RotaStatus,
    ) -> Result<Rota, RotaApiError> {
        let mut state = self.record_write(ApiCall::UpdateRotaStatus { rota_id, status })?;
        let rota = state
            .week
            .rota
            .as_mut()
            .filter(|r| r.id == rota_id)
            .ok_or_else(|| RotaApiError::NotFound(format!("rota {rota_id}")))?;
        if !rota.status.can_transition_to(status) {
            return Err(RotaApiError::Validation(format!(
                "cannot move rota from {} to {}",
                rota.status, status
            )));
        }
        rota.status = status;
        Ok(rota.clone())
    }

    async fn create_leave(&self, payload: &LeavePayload) -> Result<Leave, RotaApiError> {
        let mut state = self.record_write(ApiCall::CreateLeave {
            user_id: payload.user_id,
        })?;
        let collides = state.week.leaves.iter().any(|l| {
            l.user_id == payload.user_id
                && matches!(l.status, LeaveStatus::Pending | LeaveStatus::Approved)
                && l.start_at < payload.end_at
                && l.end_at > payload.start_at
        });
        if collides {
            return Err(RotaApiError::LeaveCollision(format!(
                "user {} already has leave in that period",
                payload.user_id
            )));
        }
        let leave = Leave {
            id: Uuid::new_v4(),
            user_id: payload.user_id,
            start_at: payload.start_at,
            end_at: payload.end_at,
            status: payload.status,
            leave_type: payload.leave_type.clone(),
            reason: payload.reason.clone(),
        };
        state.week.leaves.push(leave.clone());
        Ok(leave)
    }
}

pub fn test_context(api: Arc<FakeRotaApi>) -> (PlannerContext, Arc<RecordingNotifier>) {
    test_context_with(api, PermissionSet::all())
}

pub fn test_context_with(
    api: Arc<FakeRotaApi>,
    permissions: PermissionSet,
) -> (PlannerContext, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = PlannerContext::new(
        api,
        notifier.clone(),
        permissions,
        Arc::new(PlannerConfig::default()),
    );
    (ctx, notifier)
}
