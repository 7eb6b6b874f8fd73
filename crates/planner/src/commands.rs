use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use domain::models::{
    leave::{AbsenceDraft, LeaveStatus},
    rota::RotaStatus,
    week::WeekKey,
};
use services::services::{
    absences::create_absences,
    conflict_detector::{detect_conflicts, total_conflicts},
    context::PlannerContext,
    events::{PlannerEvents, PlannerSignal},
    notification::Notice,
    rota_fetcher::{FetchState, FetcherHandle, RotaFetcher},
    shift_grid::{DropOutcome, DropTarget, ShiftGrid},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{DropArgs, WeekArgs};

pub enum Edit {
    Move(DropArgs),
    Duplicate(DropArgs),
    Delete(Uuid),
}

/// One CLI invocation: context, signal bus and the token ctrl-c cancels
pub struct Session {
    ctx: PlannerContext,
    events: PlannerEvents,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(ctx: PlannerContext, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            events: PlannerEvents::default(),
            cancel,
        }
    }

    fn key(week: &WeekArgs) -> WeekKey {
        WeekKey::new(week.location, week.week)
    }

    async fn open_grid(&self, week: &WeekArgs) -> Result<ShiftGrid<FetcherHandle>> {
        let key = Self::key(week);
        let fetcher = RotaFetcher::spawn(&self.ctx, &self.events, key, &self.cancel);
        let state = fetcher.settled().await?;
        let loaded = match (state.data, state.error) {
            (Some(data), _) => data.as_ref().clone(),
            (None, Some(e)) => {
                self.ctx
                    .notifier
                    .notify(Notice::error("Could not load rota", &e));
                return Err(e.into());
            }
            (None, None) => bail!("rota fetch finished without data"),
        };
        let mut grid = ShiftGrid::new(self.ctx.clone(), key, fetcher, self.cancel.clone())?;
        grid.load(loaded);
        Ok(grid)
    }

    pub async fn conflicts(&self, week: &WeekArgs, json: bool) -> Result<()> {
        let grid = self.open_grid(week).await?;
        let conflicts = grid.conflicts();
        if json {
            println!("{}", serde_json::to_string_pretty(conflicts)?);
            return Ok(());
        }
        if conflicts.is_empty() {
            println!("No conflicts");
            return Ok(());
        }
        for (shift_id, list) in conflicts {
            for conflict in list {
                println!(
                    "{shift_id}  {:<13}  {:<7}  {}",
                    conflict.conflict_type.to_string(),
                    conflict.severity.to_string(),
                    conflict.message
                );
            }
        }
        println!("{} conflicts", total_conflicts(conflicts));
        Ok(())
    }

    pub async fn stats(&self, week: &WeekArgs, json: bool) -> Result<()> {
        let grid = self.open_grid(week).await?;
        let stats = grid.stats();
        if json {
            println!("{}", serde_json::to_string_pretty(stats)?);
            return Ok(());
        }
        println!(
            "{:<36}  {:>6}  {:>8}  {:>8}  {:>8}  {:>8}",
            "user", "shifts", "planned", "actual", "overtime", "variance"
        );
        for row in stats {
            println!(
                "{:<36}  {:>6}  {:>8.2}  {:>8.2}  {:>8.2}  {:>+8.2}",
                row.user_id.to_string(),
                row.shift_count,
                row.planned_hours,
                row.actual_hours,
                row.overtime_hours,
                row.variance
            );
        }
        Ok(())
    }

    pub async fn edit(&self, week: &WeekArgs, edit: Edit) -> Result<()> {
        let mut grid = self.open_grid(week).await?;
        let outcome = match edit {
            Edit::Move(target) => {
                grid.move_shift(target.shift, drop_target(&target)).await?
            }
            Edit::Duplicate(target) => {
                grid.duplicate_shift(target.shift, drop_target(&target))
                    .await?
            }
            Edit::Delete(shift_id) => grid.delete_shift(shift_id).await?,
        };
        match outcome {
            DropOutcome::Unchanged => println!("Shift is already in that cell; nothing sent"),
            DropOutcome::Committed => println!(
                "Saved. {} shifts, {} conflicts",
                grid.shifts().len(),
                total_conflicts(grid.conflicts())
            ),
        }
        Ok(())
    }

    pub async fn transition(&self, week: &WeekArgs, target: RotaStatus) -> Result<()> {
        let mut grid = self.open_grid(week).await?;
        let rota = grid.transition_rota(target).await?;
        println!("Rota {} is now {}", rota.id, rota.status);
        Ok(())
    }

    pub async fn absences(
        &self,
        users: &[Uuid],
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        status: LeaveStatus,
        leave_type: Option<String>,
        reason: Option<String>,
    ) -> Result<()> {
        let draft = AbsenceDraft {
            start_at,
            end_at,
            status,
            leave_type,
            reason,
        };
        let outcome = create_absences(&self.ctx, users, &draft, &self.cancel).await?;
        for leave in &outcome.created {
            println!("created {} for {}", leave.id, leave.user_id);
        }
        for (user_id, e) in &outcome.failed {
            println!("failed for {user_id}: {e}");
        }
        if !outcome.is_success() {
            bail!(
                "{} of {} absences were not created",
                outcome.requested - outcome.created.len(),
                outcome.requested
            );
        }
        Ok(())
    }

    /// Runs until ctrl-c or until stdin and the fetcher are both gone
    pub async fn watch(&self, week: &WeekArgs) -> Result<()> {
        let fetcher = RotaFetcher::spawn(&self.ctx, &self.events, Self::key(week), &self.cancel);
        let mut state = fetcher.subscribe();
        let signals = tokio::spawn(forward_signals(self.events.clone(), self.cancel.clone()));

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = state.borrow_and_update().clone();
                    report(&snapshot);
                }
            }
        }

        signals.abort();
        fetcher.shutdown().await;
        Ok(())
    }
}

fn drop_target(args: &DropArgs) -> DropTarget {
    DropTarget {
        user_id: args.user,
        date: args.date,
    }
}

fn report(state: &FetchState) {
    if state.is_loading {
        return;
    }
    if let Some(e) = &state.error {
        warn!(revision = state.revision, error = %e, "Refresh failed");
    }
    if let Some(week) = &state.data {
        let conflicts = detect_conflicts(&week.shifts, &week.leaves);
        let status = week
            .rota
            .as_ref()
            .map(|r| r.status.to_string())
            .unwrap_or_else(|| "no rota".to_string());
        println!(
            "#{:<4} {}  {status:<9}  {} shifts  {} leaves  {} conflicts",
            state.revision,
            state.key.week_start,
            week.shifts.len(),
            week.leaves.len(),
            total_conflicts(&conflicts)
        );
    }
}

/// One JSON `PlannerSignal` per stdin line
async fn forward_signals(events: PlannerEvents, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match serde_json::from_str::<PlannerSignal>(&line) {
                Ok(signal) => {
                    let receivers = events.emit(signal.clone());
                    debug!(?signal, receivers, "Signal forwarded");
                }
                Err(e) => warn!(error = %e, "Ignoring unreadable signal"),
            },
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Could not read signals from stdin");
                return;
            }
        }
    }
}
