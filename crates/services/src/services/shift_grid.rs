//! Employee-by-day shift grid with optimistic drag-and-drop edits.
//!
//! Every edit mutates the local shift list first, then performs the remote
//! write. Success re-fetches the authoritative week through the revalidator.
//! Failure restores the exact pre-edit list and re-fetches anyway. The last
//! re-fetch always replaces local state wholesale.

use std::sync::Arc;

use chrono::{Duration, FixedOffset, NaiveDate};
use domain::{
    models::{
        conflict::{Conflict, ConflictMap},
        leave::Leave,
        rota::{Rota, RotaStatus},
        shift::{AssignShift, AssignmentStatus, Shift, ShiftSource},
        stats::EmployeeWeekStats,
        week::{RotaWeek, WeekKey},
    },
    validation::ValidationError,
};
use once_cell::unsync::OnceCell;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    conflict_detector::detect_conflicts,
    context::PlannerContext,
    notification::Notice,
    optimistic::{OptimisticError, optimistic, restore},
    rota_api::RotaApiError,
    rota_fetcher::{FetchError, Revalidate},
    rota_lifecycle::{self, LifecycleError},
    week_stats::aggregate_week_stats,
};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GridError {
    #[error("shift {0} is not on the loaded rota")]
    UnknownShift(Uuid),
    #[error("{0} is outside the loaded week")]
    OutsideWeek(NaiveDate),
    #[error("no rota exists for this week yet")]
    NoRota,
    #[error("invalid utc offset of {0} minutes")]
    InvalidOffset(i32),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] RotaApiError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("cancelled")]
    Cancelled,
}

impl From<OptimisticError<RotaApiError>> for GridError {
    fn from(e: OptimisticError<RotaApiError>) -> Self {
        match e {
            OptimisticError::Commit(e) => GridError::Api(e),
            OptimisticError::Cancelled => GridError::Cancelled,
        }
    }
}

/// Grid cell a shift was dropped on. `user_id: None` is the unassigned row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropTarget {
    pub user_id: Option<Uuid>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// Dropped on its own cell; nothing was sent
    Unchanged,
    Committed,
}

/// What observers of the grid see, including not-yet-confirmed edits
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridView {
    pub shifts: Arc<Vec<Shift>>,
    pub pending: bool,
}

#[derive(Debug, Clone, Copy)]
enum GridAction {
    Move,
    Duplicate,
    Delete,
}

impl GridAction {
    fn success_title(self) -> &'static str {
        match self {
            GridAction::Move => "Shift moved",
            GridAction::Duplicate => "Shift duplicated",
            GridAction::Delete => "Shift deleted",
        }
    }

    fn failure_title(self) -> &'static str {
        match self {
            GridAction::Move => "Could not move shift",
            GridAction::Duplicate => "Could not duplicate shift",
            GridAction::Delete => "Could not delete shift",
        }
    }
}

pub struct ShiftGrid<R> {
    ctx: PlannerContext,
    revalidator: R,
    key: WeekKey,
    offset: FixedOffset,
    rota: Option<Rota>,
    shifts: Vec<Shift>,
    leaves: Vec<Leave>,
    conflicts: OnceCell<ConflictMap>,
    stats: OnceCell<Vec<EmployeeWeekStats>>,
    view: watch::Sender<GridView>,
    cancel: CancellationToken,
}

impl<R: Revalidate> ShiftGrid<R> {
    pub fn new(
        ctx: PlannerContext,
        key: WeekKey,
        revalidator: R,
        cancel: CancellationToken,
    ) -> Result<Self, GridError> {
        let offset = ctx
            .config
            .utc_offset()
            .map_err(|_| GridError::InvalidOffset(ctx.config.utc_offset_minutes))?;
        let (view, _) = watch::channel(GridView::default());
        Ok(Self {
            ctx,
            revalidator,
            key,
            offset,
            rota: None,
            shifts: Vec::new(),
            leaves: Vec::new(),
            conflicts: OnceCell::new(),
            stats: OnceCell::new(),
            view,
            cancel,
        })
    }

    /// Replace local state with an authoritative snapshot
    pub fn load(&mut self, week: RotaWeek) {
        self.rota = week.rota;
        self.shifts = week.shifts;
        self.leaves = week.leaves;
        self.invalidate();
        publish(&self.view, &self.shifts, false);
    }

    pub fn key(&self) -> WeekKey {
        self.key
    }

    pub fn rota(&self) -> Option<&Rota> {
        self.rota.as_ref()
    }

    pub fn shifts(&self) -> &[Shift] {
        &self.shifts
    }

    pub fn leaves(&self) -> &[Leave] {
        &self.leaves
    }

    pub fn subscribe(&self) -> watch::Receiver<GridView> {
        self.view.subscribe()
    }

    /// Memoised until the shift or leave list changes
    pub fn conflicts(&self) -> &ConflictMap {
        self.conflicts
            .get_or_init(|| detect_conflicts(&self.shifts, &self.leaves))
    }

    pub fn conflicts_for(&self, shift_id: Uuid) -> &[Conflict] {
        self.conflicts()
            .get(&shift_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn stats(&self) -> &[EmployeeWeekStats] {
        self.stats.get_or_init(|| {
            aggregate_week_stats(&self.shifts, self.ctx.config.overtime_threshold_hours)
        })
    }

    /// Calendar day the shift starts on, in the location's offset
    pub fn local_date(&self, shift: &Shift) -> NaiveDate {
        shift.start_at.with_timezone(&self.offset).date_naive()
    }

    /// Pull the authoritative week and replace local state
    pub async fn refresh(&mut self) -> Result<(), GridError> {
        let week = self.revalidator.revalidate().await.map_err(|e| match e {
            FetchError::Api(e) => GridError::Api(e),
            FetchError::Stopped => GridError::Cancelled,
        })?;
        self.load(week);
        Ok(())
    }

    /// Move a shift to another employee and/or day, keeping its times of day
    pub async fn move_shift(
        &mut self,
        shift_id: Uuid,
        target: DropTarget,
    ) -> Result<DropOutcome, GridError> {
        let result = self.try_move(shift_id, target).await;
        self.settle(GridAction::Move, shift_id, result).await
    }

    /// Copy a shift onto another cell. The copy carries a temporary id until
    /// the server has created it.
    pub async fn duplicate_shift(
        &mut self,
        shift_id: Uuid,
        target: DropTarget,
    ) -> Result<DropOutcome, GridError> {
        let result = self.try_duplicate(shift_id, target).await;
        self.settle(GridAction::Duplicate, shift_id, result).await
    }

    pub async fn delete_shift(&mut self, shift_id: Uuid) -> Result<DropOutcome, GridError> {
        let result = self.try_delete(shift_id).await;
        self.settle(GridAction::Delete, shift_id, result).await
    }

    pub async fn publish(&mut self) -> Result<Rota, GridError> {
        self.transition_rota(RotaStatus::Published).await
    }

    pub async fn lock(&mut self) -> Result<Rota, GridError> {
        self.transition_rota(RotaStatus::Locked).await
    }

    pub async fn transition_rota(&mut self, target: RotaStatus) -> Result<Rota, GridError> {
        let Some(rota) = self.rota.clone() else {
            self.ctx
                .notifier
                .notify(Notice::error("Could not update rota", GridError::NoRota));
            return Err(GridError::NoRota);
        };

        let result = rota_lifecycle::transition(&self.ctx, &rota, target, &self.cancel).await;
        match &result {
            Ok(updated) => {
                self.rota = Some(updated.clone());
                self.reconcile().await;
            }
            Err(LifecycleError::Api(_)) => self.reconcile().await,
            Err(_) => {}
        }
        result.map_err(GridError::from)
    }

    async fn try_move(
        &mut self,
        shift_id: Uuid,
        target: DropTarget,
    ) -> Result<DropOutcome, GridError> {
        let original = self.editable_shift(shift_id, &target)?;
        if self.is_same_cell(&original, &target) {
            debug!(%shift_id, "Shift dropped on its own cell");
            return Ok(DropOutcome::Unchanged);
        }
        // The shift endpoints can assign but never clear an assignee
        if original.assigned_user_id.is_some() && target.user_id.is_none() {
            return Err(ValidationError::CannotUnassign.into());
        }

        let moved = self.rebase(&original, &target);
        let payload = moved.to_payload();
        payload.validate()?;

        let api = self.ctx.api.clone();
        let view = &self.view;
        let result = optimistic(
            &mut self.shifts,
            &self.cancel,
            move |shifts| {
                if let Some(slot) = shifts.iter_mut().find(|s| s.id == shift_id) {
                    *slot = moved;
                }
                publish(view, shifts, true);
            },
            move || async move {
                api.update_shift(shift_id, &payload).await?;
                if let Some(user_id) = target.user_id {
                    api.assign_shift(shift_id, &assignment(user_id)).await?;
                }
                Ok::<_, RotaApiError>(())
            },
            |shifts, snapshot| {
                restore(shifts, snapshot);
                publish(view, shifts, false);
            },
        )
        .await;

        self.invalidate();
        result?;
        publish(&self.view, &self.shifts, false);
        Ok(DropOutcome::Committed)
    }

    async fn try_duplicate(
        &mut self,
        shift_id: Uuid,
        target: DropTarget,
    ) -> Result<DropOutcome, GridError> {
        let original = self.editable_shift(shift_id, &target)?;
        if self.is_same_cell(&original, &target) {
            debug!(%shift_id, "Shift duplicated onto its own cell");
            return Ok(DropOutcome::Unchanged);
        }

        let mut copy = self.rebase(&original, &target);
        copy.id = Uuid::new_v4();
        copy.source = ShiftSource::Planned;
        copy.actual_start_at = None;
        copy.actual_end_at = None;
        let temp_id = copy.id;
        let payload = copy.to_payload();
        payload.validate()?;

        let api = self.ctx.api.clone();
        let view = &self.view;
        let result = optimistic(
            &mut self.shifts,
            &self.cancel,
            move |shifts| {
                shifts.push(copy);
                publish(view, shifts, true);
            },
            move || async move {
                let created = api.create_shift(&payload).await?;
                if let Some(user_id) = target.user_id {
                    api.assign_shift(created.id, &assignment(user_id)).await?;
                }
                Ok::<_, RotaApiError>(created)
            },
            |shifts, snapshot| {
                restore(shifts, snapshot);
                publish(view, shifts, false);
            },
        )
        .await;

        self.invalidate();
        let mut created = result?;
        created.assigned_user_id = target.user_id;
        if let Some(slot) = self.shifts.iter_mut().find(|s| s.id == temp_id) {
            *slot = created;
        }
        publish(&self.view, &self.shifts, false);
        Ok(DropOutcome::Committed)
    }

    async fn try_delete(&mut self, shift_id: Uuid) -> Result<DropOutcome, GridError> {
        self.ensure_editable()?;
        if !self.shifts.iter().any(|s| s.id == shift_id) {
            return Err(GridError::UnknownShift(shift_id));
        }

        let api = self.ctx.api.clone();
        let view = &self.view;
        let result = optimistic(
            &mut self.shifts,
            &self.cancel,
            |shifts| {
                shifts.retain(|s| s.id != shift_id);
                publish(view, shifts, true);
            },
            move || async move { api.delete_shift(shift_id).await },
            |shifts, snapshot| {
                restore(shifts, snapshot);
                publish(view, shifts, false);
            },
        )
        .await;

        self.invalidate();
        result?;
        publish(&self.view, &self.shifts, false);
        Ok(DropOutcome::Committed)
    }

    /// Notify, then reconcile with the server when a request was attempted
    async fn settle(
        &mut self,
        action: GridAction,
        shift_id: Uuid,
        result: Result<DropOutcome, GridError>,
    ) -> Result<DropOutcome, GridError> {
        match &result {
            Ok(DropOutcome::Unchanged) => {}
            Ok(DropOutcome::Committed) => {
                info!(%shift_id, ?action, "Shift edit committed");
                self.ctx
                    .notifier
                    .notify(Notice::success(action.success_title()));
                self.reconcile().await;
            }
            Err(GridError::Cancelled) => {
                debug!(%shift_id, ?action, "Shift edit cancelled");
            }
            Err(e @ GridError::Api(_)) => {
                warn!(%shift_id, ?action, error = %e, "Shift edit failed, reverted");
                self.ctx
                    .notifier
                    .notify(Notice::error(action.failure_title(), e));
                self.reconcile().await;
            }
            Err(e) => {
                self.ctx
                    .notifier
                    .notify(Notice::error(action.failure_title(), e));
            }
        }
        result
    }

    /// Re-fetch regardless of the edit's outcome; the fresh data wins
    async fn reconcile(&mut self) {
        let cancel = self.cancel.clone();
        let fetched = tokio::select! {
            _ = cancel.cancelled() => return,
            fetched = self.revalidator.revalidate() => fetched,
        };
        match fetched {
            Ok(week) => self.load(week),
            Err(e) => {
                warn!(
                    location_id = %self.key.location_id,
                    error = %e,
                    "Could not re-fetch rota after edit"
                );
                self.ctx
                    .notifier
                    .notify(Notice::error("Could not refresh rota", e));
            }
        }
    }

    fn ensure_editable(&self) -> Result<(), GridError> {
        match &self.rota {
            Some(rota) if !rota.status.allows_shift_edits() => {
                Err(ValidationError::RotaLocked.into())
            }
            _ => Ok(()),
        }
    }

    fn editable_shift(&self, shift_id: Uuid, target: &DropTarget) -> Result<Shift, GridError> {
        self.ensure_editable()?;
        if !self.key.contains(target.date) {
            return Err(GridError::OutsideWeek(target.date));
        }
        self.shifts
            .iter()
            .find(|s| s.id == shift_id)
            .cloned()
            .ok_or(GridError::UnknownShift(shift_id))
    }

    fn is_same_cell(&self, shift: &Shift, target: &DropTarget) -> bool {
        shift.assigned_user_id == target.user_id && self.local_date(shift) == target.date
    }

    /// Same times of day and duration, on the target day and assignee
    fn rebase(&self, shift: &Shift, target: &DropTarget) -> Shift {
        let days = (target.date - self.local_date(shift)).num_days();
        let mut moved = shift.clone();
        moved.start_at += Duration::days(days);
        moved.end_at += Duration::days(days);
        if let Some(start) = moved.actual_start_at.as_mut() {
            *start += Duration::days(days);
        }
        if let Some(end) = moved.actual_end_at.as_mut() {
            *end += Duration::days(days);
        }
        moved.assigned_user_id = target.user_id;
        moved
    }

    fn invalidate(&mut self) {
        self.conflicts = OnceCell::new();
        self.stats = OnceCell::new();
    }
}

fn assignment(user_id: Uuid) -> AssignShift {
    AssignShift {
        user_id,
        status: AssignmentStatus::Assigned,
    }
}

fn publish(view: &watch::Sender<GridView>, shifts: &[Shift], pending: bool) {
    view.send_replace(GridView {
        shifts: Arc::new(shifts.to_vec()),
        pending,
    });
}
