//! Background task that keeps one location-week of rota data fresh.
//!
//! Refreshes on spawn, on a fixed poll interval, on focus regain, on a
//! `shift-updated` signal for the same location, and on demand through
//! [`FetcherHandle::revalidate`]. Each refresh fully replaces the published
//! data; nothing is cached beyond the current key.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::week::{RotaWeek, WeekKey};
use strum_macros::Display;
use thiserror::Error;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc, oneshot, watch,
    },
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    context::PlannerContext,
    events::{PlannerEvents, PlannerSignal},
    rota_api::{RotaApi, RotaApiError},
};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error(transparent)]
    Api(#[from] RotaApiError),
    #[error("rota fetcher has stopped")]
    Stopped,
}

/// Something that can force a fresh read of the authoritative data
#[async_trait]
pub trait Revalidate: Send + Sync {
    async fn revalidate(&self) -> Result<RotaWeek, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
enum Trigger {
    Mount,
    Poll,
    Focus,
    ShiftUpdated,
    Manual,
    KeyChange,
}

/// Snapshot published after every fetch attempt
#[derive(Debug, Clone)]
pub struct FetchState {
    pub key: WeekKey,
    pub data: Option<Arc<RotaWeek>>,
    pub error: Option<RotaApiError>,
    pub is_loading: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Incremented once per settled fetch
    pub revision: u64,
}

impl FetchState {
    fn loading(key: WeekKey) -> Self {
        Self {
            key,
            data: None,
            error: None,
            is_loading: true,
            fetched_at: None,
            revision: 0,
        }
    }
}

enum FetchCommand {
    Revalidate(oneshot::Sender<Result<RotaWeek, RotaApiError>>),
    SetKey(WeekKey),
}

pub struct RotaFetcher {
    api: Arc<dyn RotaApi>,
    key: WeekKey,
    poll_interval: Duration,
    dedup_window: Duration,
    state: watch::Sender<FetchState>,
    last_success: Option<Instant>,
    revision: u64,
}

impl RotaFetcher {
    /// Spawn the fetcher for `key`. It stops when `cancel` fires or the
    /// handle is shut down.
    pub fn spawn(
        ctx: &PlannerContext,
        events: &PlannerEvents,
        key: WeekKey,
        cancel: &CancellationToken,
    ) -> FetcherHandle {
        let (state_tx, state_rx) = watch::channel(FetchState::loading(key));
        let (command_tx, command_rx) = mpsc::channel(16);
        let cancel = cancel.child_token();

        let fetcher = Self {
            api: ctx.api.clone(),
            key,
            poll_interval: ctx.config.poll_interval(),
            dedup_window: ctx.config.dedup_window(),
            state: state_tx,
            last_success: None,
            revision: 0,
        };
        let signals = events.subscribe();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = fetcher.run(command_rx, signals) => {}
            }
            info!(
                location_id = %key.location_id,
                "Rota fetcher stopped"
            );
        });

        FetcherHandle {
            commands: command_tx,
            state: state_rx,
            cancel,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<FetchCommand>,
        mut signals: broadcast::Receiver<PlannerSignal>,
    ) {
        info!(
            location_id = %self.key.location_id,
            week_start = %self.key.week_start,
            "Starting rota fetcher with interval {:?}",
            self.poll_interval
        );

        let _ = self.fetch(Trigger::Mount).await;

        let mut poll = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut signals_open = true;

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.fetch_if_stale(Trigger::Poll).await;
                }
                command = commands.recv() => match command {
                    Some(FetchCommand::Revalidate(reply)) => {
                        let result = self.fetch(Trigger::Manual).await;
                        let _ = reply.send(result);
                    }
                    Some(FetchCommand::SetKey(key)) => {
                        if key != self.key {
                            self.switch_key(key);
                            let _ = self.fetch(Trigger::KeyChange).await;
                        }
                    }
                    None => break,
                },
                signal = signals.recv(), if signals_open => match signal {
                    Ok(PlannerSignal::ShiftUpdated { location_id }) if location_id == self.key.location_id => {
                        let _ = self.fetch(Trigger::ShiftUpdated).await;
                    }
                    Ok(PlannerSignal::ShiftUpdated { location_id }) => {
                        debug!(%location_id, "Ignoring shift update for another location");
                    }
                    Ok(PlannerSignal::FocusRegained) => {
                        self.fetch_if_stale(Trigger::Focus).await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Rota fetcher lagged behind planner signals");
                        let _ = self.fetch(Trigger::ShiftUpdated).await;
                    }
                    Err(RecvError::Closed) => {
                        signals_open = false;
                    }
                },
            }
        }
    }

    /// Automatic triggers skip the fetch inside the dedup window
    async fn fetch_if_stale(&mut self, trigger: Trigger) {
        if let Some(last) = self.last_success {
            if last.elapsed() < self.dedup_window {
                debug!(%trigger, "Skipping rota fetch inside dedup window");
                return;
            }
        }
        let _ = self.fetch(trigger).await;
    }

    async fn fetch(&mut self, trigger: Trigger) -> Result<RotaWeek, RotaApiError> {
        let key = self.key;
        self.state.send_modify(|s| s.is_loading = true);
        debug!(%trigger, location_id = %key.location_id, "Fetching rota week");

        let result = self.api.fetch_week(key).await;
        self.revision += 1;
        let revision = self.revision;

        match &result {
            Ok(week) => {
                self.last_success = Some(Instant::now());
                let data = Arc::new(week.clone());
                self.state.send_modify(|s| {
                    s.data = Some(data);
                    s.error = None;
                    s.is_loading = false;
                    s.fetched_at = Some(Utc::now());
                    s.revision = revision;
                });
            }
            Err(e) => {
                warn!(
                    %trigger,
                    location_id = %key.location_id,
                    error = %e,
                    "Rota fetch failed"
                );
                let error = e.clone();
                self.state.send_modify(|s| {
                    s.error = Some(error);
                    s.is_loading = false;
                    s.revision = revision;
                });
            }
        }

        result
    }

    fn switch_key(&mut self, key: WeekKey) {
        info!(
            location_id = %key.location_id,
            week_start = %key.week_start,
            "Switching rota week"
        );
        self.key = key;
        self.last_success = None;
        let mut state = FetchState::loading(key);
        state.revision = self.revision;
        self.state.send_replace(state);
    }
}

/// Control surface of a running [`RotaFetcher`]
pub struct FetcherHandle {
    commands: mpsc::Sender<FetchCommand>,
    state: watch::Receiver<FetchState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl FetcherHandle {
    /// Fetch now, bypassing the dedup window, and return the fresh data
    pub async fn revalidate(&self) -> Result<RotaWeek, FetchError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(FetchCommand::Revalidate(tx))
            .await
            .map_err(|_| FetchError::Stopped)?;
        Ok(rx.await.map_err(|_| FetchError::Stopped)??)
    }

    /// Discard current data and start fetching `key`
    pub async fn set_key(&self, key: WeekKey) -> Result<(), FetchError> {
        self.commands
            .send(FetchCommand::SetKey(key))
            .await
            .map_err(|_| FetchError::Stopped)
    }

    pub fn state(&self) -> FetchState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.state.clone()
    }

    /// Wait until a fetch for the current key has settled
    pub async fn settled(&self) -> Result<FetchState, FetchError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|s| !s.is_loading && (s.data.is_some() || s.error.is_some()))
            .await
            .map_err(|_| FetchError::Stopped)?;
        Ok(state.clone())
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

#[async_trait]
impl Revalidate for FetcherHandle {
    async fn revalidate(&self) -> Result<RotaWeek, FetchError> {
        FetcherHandle::revalidate(self).await
    }
}
